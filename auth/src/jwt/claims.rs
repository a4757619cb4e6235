use std::fmt;
use std::str::FromStr;

use chrono::Duration;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use uuid::Uuid;

use super::errors::JwtError;

/// Claim object as it comes out of a verified token, before typing.
pub type RawClaims = Map<String, Value>;

/// Largest integer a JSON number can carry without losing precision.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Purpose a token was minted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    /// Short-lived credential authorizing individual requests
    Access,
    /// Longer-lived credential used only to mint a new pair
    Refresh,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Access => "access",
            TokenType::Refresh => "refresh",
        }
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TokenType {
    type Err = JwtError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "access" => Ok(TokenType::Access),
            "refresh" => Ok(TokenType::Refresh),
            other => Err(JwtError::InvalidClaims(format!(
                "unknown token type '{}'",
                other
            ))),
        }
    }
}

/// Identity carried by every token: who, with which role, under which account epoch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserInfo {
    pub email: String,
    pub role: String,
    pub version: u64,
}

impl UserInfo {
    pub fn new(email: impl Into<String>, role: impl Into<String>, version: u64) -> Self {
        Self {
            email: email.into(),
            role: role.into(),
            version,
        }
    }
}

/// Session token claim set.
///
/// `{email, role, version, type, exp}` carry the session; `jti` only makes every
/// minted token distinct, so two pairs issued within one second never collide.
/// Tokens without a `jti` are still accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Account email (unique account key)
    pub email: String,

    /// Free-form role tag
    pub role: String,

    /// Account version (epoch) the token was minted under
    pub version: u64,

    /// Access or refresh
    #[serde(rename = "type")]
    pub token_type: TokenType,

    /// Expiration time (Unix timestamp, seconds)
    pub exp: i64,

    /// Unique token id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
}

impl Claims {
    /// Create claims for a user expiring `ttl` from now.
    ///
    /// # Arguments
    /// * `user` - Identity to embed
    /// * `token_type` - Access or refresh
    /// * `ttl` - Lifetime of the token
    ///
    /// # Returns
    /// Claims with `exp = now + ttl`
    pub fn for_user(user: &UserInfo, token_type: TokenType, ttl: Duration) -> Self {
        let expiration = Utc::now() + ttl;

        Self {
            email: user.email.clone(),
            role: user.role.clone(),
            version: user.version,
            token_type,
            exp: expiration.timestamp(),
            jti: Some(Uuid::new_v4().to_string()),
        }
    }

    /// Build typed claims from a verified raw claim object.
    ///
    /// # Errors
    /// * `InvalidClaims` - A claim is missing or has the wrong type
    pub fn from_raw(raw: &RawClaims) -> Result<Self, JwtError> {
        Ok(Self {
            email: parse_email(raw)?,
            role: parse_role(raw)?,
            version: parse_version(raw)?,
            token_type: parse_token_type(raw)?,
            exp: parse_expiration(raw)?,
            jti: raw.get("jti").and_then(Value::as_str).map(str::to_string),
        })
    }

    /// Identity part of the claim set.
    pub fn user_info(&self) -> UserInfo {
        UserInfo::new(self.email.clone(), self.role.clone(), self.version)
    }
}

fn string_claim<'a>(raw: &'a RawClaims, name: &str) -> Result<&'a str, JwtError> {
    match raw.get(name) {
        Some(Value::String(value)) => Ok(value),
        Some(_) => Err(JwtError::InvalidClaims(format!("'{}' is not a string", name))),
        None => Err(JwtError::InvalidClaims(format!("'{}' is missing", name))),
    }
}

fn integer_claim(raw: &RawClaims, name: &str) -> Result<Value, JwtError> {
    raw.get(name)
        .cloned()
        .ok_or_else(|| JwtError::InvalidClaims(format!("'{}' is missing", name)))
}

/// Parse the `email` claim.
pub fn parse_email(raw: &RawClaims) -> Result<String, JwtError> {
    string_claim(raw, "email").map(str::to_string)
}

/// Parse the `role` claim.
pub fn parse_role(raw: &RawClaims) -> Result<String, JwtError> {
    string_claim(raw, "role").map(str::to_string)
}

/// Parse the `type` claim.
pub fn parse_token_type(raw: &RawClaims) -> Result<TokenType, JwtError> {
    string_claim(raw, "type")?.parse()
}

/// Parse the `version` claim.
///
/// Accepts any non-negative integral JSON number, including `1.0` as written by
/// issuers that only have floating point numbers.
pub fn parse_version(raw: &RawClaims) -> Result<u64, JwtError> {
    let value = integer_claim(raw, "version")?;

    if let Some(version) = value.as_u64() {
        return Ok(version);
    }

    match value.as_f64() {
        Some(v) if v >= 0.0 && v.fract() == 0.0 && v <= MAX_SAFE_INTEGER => Ok(v as u64),
        Some(_) => Err(JwtError::InvalidClaims(
            "'version' is not a non-negative integer".to_string(),
        )),
        None => Err(JwtError::InvalidClaims("'version' is not a number".to_string())),
    }
}

/// Parse the `exp` claim.
pub fn parse_expiration(raw: &RawClaims) -> Result<i64, JwtError> {
    let value = integer_claim(raw, "exp")?;

    if let Some(exp) = value.as_i64() {
        return Ok(exp);
    }

    match value.as_f64() {
        Some(v) if v.is_finite() && v.abs() <= MAX_SAFE_INTEGER => Ok(v.trunc() as i64),
        _ => Err(JwtError::InvalidClaims("'exp' is not a number".to_string())),
    }
}
