use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use auth::PasswordHasher;
use auth::UserInfo;
use tokio::sync::RwLock;

use crate::lifecycle::ShutdownError;
use crate::outbound::check_password;
use crate::outbound::hash_password;
use crate::session::errors::StorageError;
use crate::session::models::Account;
use crate::session::models::NewAccount;
use crate::session::ports::CredentialDirectory;

/// Account directory held in a map keyed by email.
#[derive(Default)]
pub struct InMemoryCredentialDirectory {
    accounts: RwLock<HashMap<String, Account>>,
    hasher: PasswordHasher,
}

impl InMemoryCredentialDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an account at `Account::INITIAL_VERSION`.
    ///
    /// # Errors
    /// * `AlreadyExists` - An account with this email is registered
    pub async fn add_account(&self, account: NewAccount) -> Result<Account, StorageError> {
        let password_hash = hash_password(self.hasher, &account.password).await?;

        let mut accounts = self.accounts.write().await;
        if accounts.contains_key(account.email.as_str()) {
            return Err(StorageError::AlreadyExists(account.email.to_string()));
        }

        let created = Account {
            email: account.email,
            password_hash,
            role: account.role,
            version: Account::INITIAL_VERSION,
        };
        accounts.insert(created.email.as_str().to_string(), created.clone());

        tracing::info!(email = %created.email, role = %created.role, "Account registered");

        Ok(created)
    }

    /// Advance the account's version, invalidating every token issued before.
    ///
    /// # Returns
    /// The new version
    ///
    /// # Errors
    /// * `NotFound` - No account with this email
    pub async fn bump_version(&self, email: &str) -> Result<u64, StorageError> {
        let mut accounts = self.accounts.write().await;
        let account = accounts
            .get_mut(email)
            .ok_or_else(|| StorageError::NotFound(email.to_string()))?;

        account.version = next_version(account.version)?;

        tracing::info!(email, version = account.version, "Account version advanced");

        Ok(account.version)
    }

    /// Replace the account's password and advance its version.
    ///
    /// # Errors
    /// * `NotFound` - No account with this email
    pub async fn change_password(&self, email: &str, new_password: &str) -> Result<u64, StorageError> {
        let password_hash = hash_password(self.hasher, new_password).await?;

        let mut accounts = self.accounts.write().await;
        let account = accounts
            .get_mut(email)
            .ok_or_else(|| StorageError::NotFound(email.to_string()))?;

        account.version = next_version(account.version)?;
        account.password_hash = password_hash;

        tracing::info!(email, version = account.version, "Password changed");

        Ok(account.version)
    }
}

fn next_version(version: u64) -> Result<u64, StorageError> {
    version
        .checked_add(1)
        .ok_or_else(|| StorageError::InvalidAccount("account version overflow".to_string()))
}

#[async_trait]
impl CredentialDirectory for InMemoryCredentialDirectory {
    async fn verify(&self, email: &str, password: &str) -> Result<Option<UserInfo>, StorageError> {
        if email.is_empty() || password.is_empty() {
            return Ok(None);
        }

        let account = self.accounts.read().await.get(email).cloned();

        check_password(self.hasher, password, account).await
    }

    async fn is_version_valid(&self, email: &str, version: u64) -> Result<bool, StorageError> {
        Ok(self
            .accounts
            .read()
            .await
            .get(email)
            .is_some_and(|account| account.version == version))
    }

    async fn shut_down(&self, _grace: Duration) -> Result<(), ShutdownError> {
        tracing::debug!("In-memory credential directory closed");
        Ok(())
    }
}
