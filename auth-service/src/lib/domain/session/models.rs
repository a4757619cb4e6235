use std::fmt;
use std::str::FromStr;

use auth::UserInfo;

use crate::session::errors::EmailError;

/// Account record owned by a credential directory.
///
/// The session core only ever reads `(email, role, version)` from it; the hash is
/// opaque to everything but the directory that stores it.
#[derive(Debug, Clone)]
pub struct Account {
    pub email: EmailAddress,
    pub password_hash: String,
    pub role: String,
    pub version: u64,
}

impl Account {
    /// Version assigned to freshly created accounts.
    pub const INITIAL_VERSION: u64 = 1;

    pub fn user_info(&self) -> UserInfo {
        UserInfo::new(self.email.as_str(), self.role.clone(), self.version)
    }
}

/// Email address type
///
/// Validates email format using RFC 5322 compliant parser.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EmailAddress(String);

impl EmailAddress {
    /// Create a new validated email address.
    ///
    /// # Errors
    /// * `InvalidFormat` - Email does not conform to RFC 5322
    pub fn new(email: impl Into<String>) -> Result<Self, EmailError> {
        let email = email.into();
        email_address::EmailAddress::from_str(&email)
            .map(|_| EmailAddress(email))
            .map_err(|e| EmailError::InvalidFormat(e.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Command to register an account in a credential directory.
#[derive(Debug)]
pub struct NewAccount {
    pub email: EmailAddress,
    pub password: String,
    pub role: String,
}

impl NewAccount {
    pub fn new(email: EmailAddress, password: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            email,
            password: password.into(),
            role: role.into(),
        }
    }
}

/// Access/refresh tokens issued together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}
