use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use auth::PasswordHasher;
use auth::UserInfo;
use sqlx::PgPool;

use super::database_error;
use super::PostgresStore;
use crate::lifecycle::ShutdownError;
use crate::outbound::check_password;
use crate::outbound::hash_password;
use crate::session::errors::StorageError;
use crate::session::models::Account;
use crate::session::models::EmailAddress;
use crate::session::models::NewAccount;
use crate::session::ports::CredentialDirectory;

type AccountRow = (String, String, String, i64);

pub struct PostgresCredentialDirectory {
    store: Arc<PostgresStore>,
    hasher: PasswordHasher,
}

impl PostgresCredentialDirectory {
    pub fn new(store: Arc<PostgresStore>) -> Self {
        Self {
            store,
            hasher: PasswordHasher::new(),
        }
    }

    fn pool(&self) -> &PgPool {
        self.store.pool()
    }

    /// Register an account at `Account::INITIAL_VERSION`.
    ///
    /// # Errors
    /// * `AlreadyExists` - An account with this email is registered
    /// * `Backend` - Database operation failed
    pub async fn add_account(&self, account: NewAccount) -> Result<Account, StorageError> {
        let password_hash = hash_password(self.hasher, &account.password).await?;
        let version = to_column(Account::INITIAL_VERSION)?;

        sqlx::query(
            r#"
            INSERT INTO accounts (email, password_hash, role, version)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(account.email.as_str())
        .bind(&password_hash)
        .bind(&account.role)
        .bind(version)
        .execute(self.pool())
        .await
        .map_err(|e| {
            if let Some(db_err) = e.as_database_error() {
                if db_err.is_unique_violation() {
                    return StorageError::AlreadyExists(account.email.to_string());
                }
            }
            database_error(e)
        })?;

        tracing::info!(email = %account.email, role = %account.role, "Account registered");

        Ok(Account {
            email: account.email,
            password_hash,
            role: account.role,
            version: Account::INITIAL_VERSION,
        })
    }

    /// Advance the account's version, invalidating every token issued before.
    ///
    /// # Errors
    /// * `NotFound` - No account with this email
    /// * `Backend` - Database operation failed
    pub async fn bump_version(&self, email: &str) -> Result<u64, StorageError> {
        let version: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE accounts
            SET version = version + 1, updated_at = NOW()
            WHERE email = $1
            RETURNING version
            "#,
        )
        .bind(email)
        .fetch_optional(self.pool())
        .await
        .map_err(database_error)?;

        let version = from_column(version.ok_or_else(|| StorageError::NotFound(email.to_string()))?)?;

        tracing::info!(email, version, "Account version advanced");

        Ok(version)
    }

    /// Replace the account's password and advance its version in one statement.
    ///
    /// # Errors
    /// * `NotFound` - No account with this email
    /// * `Backend` - Database operation failed
    pub async fn change_password(&self, email: &str, new_password: &str) -> Result<u64, StorageError> {
        let password_hash = hash_password(self.hasher, new_password).await?;

        let version: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE accounts
            SET password_hash = $2, version = version + 1, updated_at = NOW()
            WHERE email = $1
            RETURNING version
            "#,
        )
        .bind(email)
        .bind(&password_hash)
        .fetch_optional(self.pool())
        .await
        .map_err(database_error)?;

        let version = from_column(version.ok_or_else(|| StorageError::NotFound(email.to_string()))?)?;

        tracing::info!(email, version, "Password changed");

        Ok(version)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StorageError> {
        let row: Option<AccountRow> = sqlx::query_as(
            r#"
            SELECT email, password_hash, role, version
            FROM accounts
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(self.pool())
        .await
        .map_err(database_error)?;

        match row {
            Some((email, password_hash, role, version)) => Ok(Some(Account {
                email: EmailAddress::new(email)?,
                password_hash,
                role,
                version: from_column(version)?,
            })),
            None => Ok(None),
        }
    }
}

fn to_column(version: u64) -> Result<i64, StorageError> {
    i64::try_from(version)
        .map_err(|_| StorageError::InvalidAccount(format!("version {} out of range", version)))
}

fn from_column(version: i64) -> Result<u64, StorageError> {
    u64::try_from(version)
        .map_err(|_| StorageError::InvalidAccount(format!("negative version {}", version)))
}

#[async_trait]
impl CredentialDirectory for PostgresCredentialDirectory {
    async fn verify(&self, email: &str, password: &str) -> Result<Option<UserInfo>, StorageError> {
        if email.is_empty() || password.is_empty() {
            return Ok(None);
        }

        let account = self.find_by_email(email).await?;

        check_password(self.hasher, password, account).await
    }

    async fn is_version_valid(&self, email: &str, version: u64) -> Result<bool, StorageError> {
        let Ok(version) = i64::try_from(version) else {
            return Ok(false);
        };

        let current: Option<i64> = sqlx::query_scalar("SELECT version FROM accounts WHERE email = $1")
            .bind(email)
            .fetch_optional(self.pool())
            .await
            .map_err(database_error)?;

        Ok(current == Some(version))
    }

    async fn shut_down(&self, grace: Duration) -> Result<(), ShutdownError> {
        self.store.shut_down(grace).await
    }
}
