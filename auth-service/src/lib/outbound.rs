use auth::PasswordHasher;
use auth::UserInfo;

use crate::session::errors::StorageError;
use crate::session::models::Account;

pub mod memory;
pub mod repositories;

/// Current time as Unix seconds, the unit of every `exp` and `expires_at`.
pub(crate) fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Check `password` against a stored account off the async executor.
///
/// A missing account still costs one Argon2 run, so callers cannot tell an unknown
/// email from a wrong password by latency. An unreadable stored hash is logged and
/// treated as a mismatch.
pub(crate) async fn check_password(
    hasher: PasswordHasher,
    password: &str,
    account: Option<Account>,
) -> Result<Option<UserInfo>, StorageError> {
    let password = password.to_string();

    tokio::task::spawn_blocking(move || match account {
        None => {
            hasher.burn_verification(&password);
            None
        }
        Some(account) => match hasher.verify(&password, &account.password_hash) {
            Ok(true) => Some(account.user_info()),
            Ok(false) => None,
            Err(e) => {
                tracing::error!(
                    email = %account.email,
                    error = %e,
                    "Stored password hash is unreadable"
                );
                None
            }
        },
    })
    .await
    .map_err(|e| StorageError::Backend(format!("Password verification task failed: {}", e)))
}

/// Hash a new password off the async executor.
pub(crate) async fn hash_password(
    hasher: PasswordHasher,
    password: &str,
) -> Result<String, StorageError> {
    let password = password.to_string();

    tokio::task::spawn_blocking(move || hasher.hash(&password))
        .await
        .map_err(|e| StorageError::Backend(format!("Password hashing task failed: {}", e)))?
        .map_err(|e| StorageError::Backend(format!("Password hashing failed: {}", e)))
}
