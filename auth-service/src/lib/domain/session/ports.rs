use std::time::Duration;

use async_trait::async_trait;
use auth::UserInfo;

use crate::lifecycle::ShutdownError;
use crate::session::errors::SessionError;
use crate::session::errors::StorageError;
use crate::session::models::TokenPair;

/// Port for session lifecycle operations.
///
/// Implementations hold no per-request state and are shared by every caller.
#[async_trait]
pub trait SessionServicePort: Send + Sync + 'static {
    /// Verify credentials and open a session.
    ///
    /// # Returns
    /// Fresh access/refresh pair bound to the account's current version and role
    ///
    /// # Errors
    /// * `InvalidCredentials` - Unknown account or wrong password (never distinguished)
    /// * `BackendUnavailable` - A collaborator failed
    async fn login(&self, email: &str, password: &str) -> Result<TokenPair, SessionError>;

    /// Rotate a refresh token into a new pair.
    ///
    /// The presented refresh token, and the access token issued with it, are
    /// revoked. A refresh token rotates at most once.
    ///
    /// # Errors
    /// * `Revoked` - Token is blacklisted or was already rotated
    /// * `InvalidClaims` - Token is malformed, badly signed, expired or not a refresh token
    /// * `StaleVersion` - Account version moved past the token's version
    /// * `BackendUnavailable` - A collaborator failed
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, SessionError>;

    /// Whether a token is currently usable: not revoked and structurally valid.
    ///
    /// Does not consult the account version.
    ///
    /// # Errors
    /// * `BackendUnavailable` - Revocation lookup failed
    async fn validate_token(&self, token: &str) -> Result<bool, SessionError>;

    /// Revoke every given token until its natural expiry.
    ///
    /// Not transactional: tokens revoked before a failure stay revoked.
    ///
    /// # Errors
    /// * `BackendUnavailable` - Revocation write failed
    async fn logout(&self, tokens: &[String]) -> Result<(), SessionError>;

    /// Shut down every collaborator concurrently within `grace`, reporting all failures.
    async fn shut_down(&self, grace: Duration) -> Result<(), ShutdownError>;
}

/// Account directory: credential verification and version lookup.
#[async_trait]
pub trait CredentialDirectory: Send + Sync + 'static {
    /// Verify an account's password.
    ///
    /// # Returns
    /// The account's identity on success, `None` for an unknown account or a wrong
    /// password alike. Comparison must not leak which of the two happened through
    /// timing.
    ///
    /// # Errors
    /// * `Backend` - Storage operation failed
    async fn verify(&self, email: &str, password: &str) -> Result<Option<UserInfo>, StorageError>;

    /// Whether `version` is the account's current version.
    ///
    /// Unknown accounts report `false`.
    ///
    /// # Errors
    /// * `Backend` - Storage operation failed
    async fn is_version_valid(&self, email: &str, version: u64) -> Result<bool, StorageError>;

    /// Stop background work and release connections.
    async fn shut_down(&self, grace: Duration) -> Result<(), ShutdownError>;
}

/// Registry remembering which access token was issued with which refresh token.
#[async_trait]
pub trait PairRegistry: Send + Sync + 'static {
    /// Store `refresh -> access` for the refresh token lifetime.
    ///
    /// # Errors
    /// * `Backend` - Storage operation failed
    async fn add_pair(&self, access_token: &str, refresh_token: &str) -> Result<(), StorageError>;

    /// Read and delete the access token paired with `refresh_token`.
    ///
    /// A second call for the same key never returns the value again.
    ///
    /// # Errors
    /// * `NotFound` - Never paired, already consumed or expired
    /// * `Backend` - Storage operation failed
    async fn get_access_by_refresh(&self, refresh_token: &str) -> Result<String, StorageError>;

    /// Stop background work and release connections.
    async fn shut_down(&self, grace: Duration) -> Result<(), ShutdownError>;
}

/// Registry of tokens that must be rejected until their natural expiry.
#[async_trait]
pub trait RevocationRegistry: Send + Sync + 'static {
    /// Revoke every token, each until its own `exp`.
    ///
    /// Tokens whose expiry cannot be read (bad signature, already expired,
    /// missing `exp`) are skipped and logged; the rest of the batch still goes
    /// through. Revoking a revoked token is a no-op.
    ///
    /// # Errors
    /// * `Backend` - Storage operation failed; earlier tokens stay revoked
    async fn add_tokens(&self, tokens: &[String]) -> Result<(), StorageError>;

    /// `true` when the token is **not** revoked.
    ///
    /// # Errors
    /// * `Backend` - Storage operation failed
    async fn is_allowed(&self, token: &str) -> Result<bool, StorageError>;

    /// Atomically revoke `token` until `expires_at` unless it is already revoked.
    ///
    /// # Returns
    /// `true` for the single caller that revoked it, `false` for everyone else and
    /// for tokens already past `expires_at`
    ///
    /// # Errors
    /// * `Backend` - Storage operation failed
    async fn claim(&self, token: &str, expires_at: i64) -> Result<bool, StorageError>;

    /// Stop background work and release connections.
    async fn shut_down(&self, grace: Duration) -> Result<(), ShutdownError>;
}
