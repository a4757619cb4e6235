use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use auth::TokenCodec;
use tokio::sync::Mutex;

use crate::lifecycle::ShutdownError;
use crate::lifecycle::Supervisor;
use crate::outbound::unix_now;
use crate::session::errors::StorageError;
use crate::session::ports::RevocationRegistry;

/// Revoked tokens held in a map of token to its `exp`.
///
/// A marker is live while `now <= exp`, the same window in which the token
/// itself would be accepted, and never longer.
pub struct InMemoryRevocationRegistry {
    codec: Arc<TokenCodec>,
    revoked: Arc<Mutex<HashMap<String, i64>>>,
    supervisor: Arc<Supervisor>,
}

impl InMemoryRevocationRegistry {
    pub fn new(codec: Arc<TokenCodec>, supervisor: Arc<Supervisor>) -> Self {
        Self {
            codec,
            revoked: Arc::new(Mutex::new(HashMap::new())),
            supervisor,
        }
    }

    /// Drop markers of tokens past their expiry every `every` until shutdown.
    pub fn spawn_purge(&self, every: Duration) {
        let revoked = Arc::clone(&self.revoked);

        self.supervisor.spawn_periodic("revocation-purge", every, move || {
            let revoked = Arc::clone(&revoked);
            async move {
                let now = unix_now();
                let mut revoked = revoked.lock().await;
                let before = revoked.len();
                revoked.retain(|_, expires_at| *expires_at >= now);

                let purged = before - revoked.len();
                if purged > 0 {
                    tracing::debug!(purged, "Expired revocations purged");
                }
            }
        });
    }

    /// Number of markers currently stored, expired ones included.
    pub async fn len(&self) -> usize {
        self.revoked.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.revoked.lock().await.is_empty()
    }
}

#[async_trait]
impl RevocationRegistry for InMemoryRevocationRegistry {
    async fn add_tokens(&self, tokens: &[String]) -> Result<(), StorageError> {
        let expiries: Vec<(&String, i64)> = tokens
            .iter()
            .filter_map(|token| match self.codec.get_expiration(token) {
                Ok(expires_at) => Some((token, expires_at)),
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping revocation of unreadable token");
                    None
                }
            })
            .collect();
        if expiries.is_empty() {
            return Ok(());
        }

        let mut revoked = self.revoked.lock().await;
        for (token, expires_at) in expiries {
            revoked
                .entry(token.clone())
                .and_modify(|current| *current = (*current).max(expires_at))
                .or_insert(expires_at);
        }

        Ok(())
    }

    async fn is_allowed(&self, token: &str) -> Result<bool, StorageError> {
        let now = unix_now();
        let mut revoked = self.revoked.lock().await;

        match revoked.get(token) {
            Some(&expires_at) if expires_at >= now => Ok(false),
            Some(_) => {
                revoked.remove(token);
                Ok(true)
            }
            None => Ok(true),
        }
    }

    async fn claim(&self, token: &str, expires_at: i64) -> Result<bool, StorageError> {
        let now = unix_now();
        if expires_at < now {
            return Ok(false);
        }

        let mut revoked = self.revoked.lock().await;
        match revoked.get(token) {
            Some(&current) if current >= now => Ok(false),
            _ => {
                revoked.insert(token.to_string(), expires_at);
                Ok(true)
            }
        }
    }

    async fn shut_down(&self, grace: Duration) -> Result<(), ShutdownError> {
        self.supervisor.shut_down(grace).await
    }
}
