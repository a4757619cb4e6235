use auth::JwtError;
use thiserror::Error;

/// Error for EmailAddress validation failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EmailError {
    #[error("Invalid email format: {0}")]
    InvalidFormat(String),
}

/// Error returned by credential directories and token registries.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid account data: {0}")]
    InvalidAccount(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

impl From<EmailError> for StorageError {
    fn from(err: EmailError) -> Self {
        StorageError::InvalidAccount(err.to_string())
    }
}

/// Error returned by session operations.
///
/// Login failures are always `InvalidCredentials`, whatever the cause. The other
/// variants are specific enough for operators and should be made generic at the
/// transport boundary.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Token has been revoked")]
    Revoked,

    #[error("Invalid token claims: {0}")]
    InvalidClaims(String),

    #[error("Token was issued for an outdated account version")]
    StaleVersion,

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(#[from] StorageError),
}

impl From<JwtError> for SessionError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::InvalidConfiguration(msg) | JwtError::EncodingFailed(msg) => {
                SessionError::Configuration(msg)
            }
            JwtError::TokenExpired => SessionError::InvalidClaims(err.to_string()),
            JwtError::DecodingFailed(msg) | JwtError::InvalidClaims(msg) => {
                SessionError::InvalidClaims(msg)
            }
        }
    }
}
