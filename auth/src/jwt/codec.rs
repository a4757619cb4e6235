use std::time::Duration;

use email_address::EmailAddress;

use super::claims;
use super::claims::Claims;
use super::claims::RawClaims;
use super::claims::TokenType;
use super::claims::UserInfo;
use super::errors::JwtError;
use super::handler::JwtHandler;

/// Session token codec.
///
/// Mints and reads the access/refresh tokens of a session. Holds nothing but the
/// signing secret and the two lifetimes, so one instance can be shared freely.
pub struct TokenCodec {
    handler: JwtHandler,
    access_ttl: Duration,
    refresh_ttl: Duration,
    access_lifetime: chrono::Duration,
    refresh_lifetime: chrono::Duration,
}

impl TokenCodec {
    /// Smallest accepted secret (256 bits, RFC 7518 for HS256).
    pub const MIN_SECRET_LEN: usize = 32;

    /// Largest accepted secret.
    pub const MAX_SECRET_LEN: usize = 1024;

    /// Create a codec.
    ///
    /// # Arguments
    /// * `secret` - HMAC key, 32 to 1024 bytes
    /// * `access_ttl` - Lifetime of access tokens
    /// * `refresh_ttl` - Lifetime of refresh tokens, strictly longer than `access_ttl`
    ///
    /// # Errors
    /// * `InvalidConfiguration` - Secret length out of bounds or TTLs inconsistent
    pub fn new(secret: &[u8], access_ttl: Duration, refresh_ttl: Duration) -> Result<Self, JwtError> {
        if secret.len() < Self::MIN_SECRET_LEN {
            return Err(JwtError::InvalidConfiguration(format!(
                "secret must be at least {} bytes for HS256, got {}",
                Self::MIN_SECRET_LEN,
                secret.len()
            )));
        }
        if secret.len() > Self::MAX_SECRET_LEN {
            return Err(JwtError::InvalidConfiguration(format!(
                "secret must be at most {} bytes, got {}",
                Self::MAX_SECRET_LEN,
                secret.len()
            )));
        }
        if access_ttl.is_zero() {
            return Err(JwtError::InvalidConfiguration(
                "access token lifetime must be positive".to_string(),
            ));
        }
        if access_ttl >= refresh_ttl {
            return Err(JwtError::InvalidConfiguration(format!(
                "access token lifetime ({}s) must be shorter than refresh token lifetime ({}s)",
                access_ttl.as_secs(),
                refresh_ttl.as_secs()
            )));
        }

        let access_lifetime = to_lifetime(access_ttl)?;
        let refresh_lifetime = to_lifetime(refresh_ttl)?;

        Ok(Self {
            handler: JwtHandler::new(secret),
            access_ttl,
            refresh_ttl,
            access_lifetime,
            refresh_lifetime,
        })
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    /// Mint an access token for `user`, expiring after the access lifetime.
    pub fn create_access_token(&self, user: &UserInfo) -> Result<String, JwtError> {
        let claims = Claims::for_user(user, TokenType::Access, self.access_lifetime);
        self.handler.encode(&claims)
    }

    /// Mint a refresh token for `user`, expiring after the refresh lifetime.
    pub fn create_refresh_token(&self, user: &UserInfo) -> Result<String, JwtError> {
        let claims = Claims::for_user(user, TokenType::Refresh, self.refresh_lifetime);
        self.handler.encode(&claims)
    }

    /// Verify a token and read its full claim set.
    ///
    /// # Errors
    /// * `TokenExpired` - Token is past its `exp`
    /// * `InvalidClaims` - Bad signature, malformed token, or a missing/mistyped claim
    pub fn decode(&self, token: &str) -> Result<Claims, JwtError> {
        let raw = self.decode_raw(token)?;
        Claims::from_raw(&raw)
    }

    /// Stricter than a signature check: a well-signed token is rejected when its
    /// email is not an address, its role or type is empty, or its version is not a
    /// non-negative integer.
    pub fn is_structurally_valid(&self, token: &str) -> bool {
        let Ok(raw) = self.decode_raw(token) else {
            return false;
        };
        let Ok(claims) = Claims::from_raw(&raw) else {
            return false;
        };

        EmailAddress::is_valid(&claims.email) && !claims.role.trim().is_empty()
    }

    pub fn get_version(&self, token: &str) -> Result<u64, JwtError> {
        claims::parse_version(&self.decode_raw(token)?)
    }

    pub fn get_email(&self, token: &str) -> Result<String, JwtError> {
        claims::parse_email(&self.decode_raw(token)?)
    }

    pub fn get_role(&self, token: &str) -> Result<String, JwtError> {
        claims::parse_role(&self.decode_raw(token)?)
    }

    pub fn get_type(&self, token: &str) -> Result<TokenType, JwtError> {
        claims::parse_token_type(&self.decode_raw(token)?)
    }

    /// Read the `exp` claim (seconds since the epoch) of a still-valid token.
    ///
    /// Revocation stores use it to keep a marker exactly as long as the token
    /// itself would be accepted.
    pub fn get_expiration(&self, token: &str) -> Result<i64, JwtError> {
        claims::parse_expiration(&self.decode_raw(token)?)
    }

    /// Read `(email, role, version)` from a token.
    pub fn get_user_info(&self, token: &str) -> Result<UserInfo, JwtError> {
        let raw = self.decode_raw(token)?;

        Ok(UserInfo {
            email: claims::parse_email(&raw)?,
            role: claims::parse_role(&raw)?,
            version: claims::parse_version(&raw)?,
        })
    }

    fn decode_raw(&self, token: &str) -> Result<RawClaims, JwtError> {
        self.handler
            .decode::<RawClaims>(token)
            .map_err(|e| match e {
                JwtError::DecodingFailed(reason) => JwtError::InvalidClaims(reason),
                other => other,
            })
    }
}

fn to_lifetime(ttl: Duration) -> Result<chrono::Duration, JwtError> {
    chrono::Duration::from_std(ttl).map_err(|e| {
        JwtError::InvalidConfiguration(format!("token lifetime out of range: {}", e))
    })
}
