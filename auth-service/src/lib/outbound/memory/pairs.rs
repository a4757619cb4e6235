use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::lifecycle::ShutdownError;
use crate::lifecycle::Supervisor;
use crate::outbound::unix_now;
use crate::session::errors::StorageError;
use crate::session::ports::PairRegistry;

struct PairEntry {
    access_token: String,
    expires_at: i64,
}

/// Refresh-to-access pairs held in a map keyed by refresh token.
///
/// Entries live for the refresh token lifetime. Expired entries are dropped when
/// read and by the purge task.
pub struct InMemoryPairRegistry {
    pairs: Arc<Mutex<HashMap<String, PairEntry>>>,
    ttl: Duration,
    supervisor: Arc<Supervisor>,
}

impl InMemoryPairRegistry {
    pub fn new(ttl: Duration, supervisor: Arc<Supervisor>) -> Self {
        Self {
            pairs: Arc::new(Mutex::new(HashMap::new())),
            ttl,
            supervisor,
        }
    }

    /// Drop expired pairs every `every` until shutdown.
    pub fn spawn_purge(&self, every: Duration) {
        let pairs = Arc::clone(&self.pairs);

        self.supervisor.spawn_periodic("pair-purge", every, move || {
            let pairs = Arc::clone(&pairs);
            async move {
                let now = unix_now();
                let mut pairs = pairs.lock().await;
                let before = pairs.len();
                pairs.retain(|_, entry| entry.expires_at >= now);

                let purged = before - pairs.len();
                if purged > 0 {
                    tracing::debug!(purged, "Expired token pairs purged");
                }
            }
        });
    }

    pub async fn len(&self) -> usize {
        self.pairs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.pairs.lock().await.is_empty()
    }
}

#[async_trait]
impl PairRegistry for InMemoryPairRegistry {
    async fn add_pair(&self, access_token: &str, refresh_token: &str) -> Result<(), StorageError> {
        let expires_at = unix_now().saturating_add(self.ttl.as_secs() as i64);

        self.pairs.lock().await.insert(
            refresh_token.to_string(),
            PairEntry {
                access_token: access_token.to_string(),
                expires_at,
            },
        );

        Ok(())
    }

    async fn get_access_by_refresh(&self, refresh_token: &str) -> Result<String, StorageError> {
        let entry = self.pairs.lock().await.remove(refresh_token);

        match entry {
            Some(entry) if entry.expires_at >= unix_now() => Ok(entry.access_token),
            _ => Err(StorageError::NotFound("token pair".to_string())),
        }
    }

    async fn shut_down(&self, grace: Duration) -> Result<(), ShutdownError> {
        self.supervisor.shut_down(grace).await
    }
}
