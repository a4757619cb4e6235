pub mod account;
pub mod pair;
pub mod revocation;

pub use account::PostgresCredentialDirectory;
pub use pair::PostgresPairRegistry;
pub use revocation::PostgresRevocationRegistry;

use std::time::Duration;

use sqlx::PgPool;
use tokio::time::Instant;

use crate::lifecycle::ComponentFailure;
use crate::lifecycle::ShutdownError;
use crate::lifecycle::Supervisor;
use crate::session::errors::StorageError;

const COMPONENT: &str = "postgres";

pub(crate) fn database_error(e: sqlx::Error) -> StorageError {
    StorageError::Backend(e.to_string())
}

/// Connection pool and background tasks shared by every PostgreSQL backend.
///
/// The backends hold an `Arc` of one store. Whichever of them is shut down first
/// stops every task of every backend, then closes the pool. Later calls find
/// nothing left to do.
pub struct PostgresStore {
    pool: PgPool,
    supervisor: Supervisor,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            supervisor: Supervisor::new(COMPONENT),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    /// Ping the database every `every` until shutdown, logging failures.
    pub fn spawn_health_check(&self, every: Duration) {
        let pool = self.pool.clone();

        self.supervisor
            .spawn_health_check(COMPONENT, every, move || {
                let pool = pool.clone();
                async move {
                    sqlx::query("SELECT 1")
                        .execute(&pool)
                        .await
                        .map(|_| ())
                        .map_err(|e| e.to_string())
                }
            });
    }

    /// Stop every background task, then close the pool, all within `grace`.
    ///
    /// # Errors
    /// * `ShutdownError` - Tasks were aborted or panicked, or the pool did not
    ///   close before the deadline
    pub async fn shut_down(&self, grace: Duration) -> Result<(), ShutdownError> {
        let deadline = Instant::now() + grace;
        let tasks = self.supervisor.shut_down_until(deadline).await;

        if self.pool.is_closed() {
            return tasks;
        }

        let pool = match tokio::time::timeout_at(deadline, self.pool.close()).await {
            Ok(()) => {
                tracing::info!(component = COMPONENT, "Connection pool closed");
                Ok(())
            }
            Err(_) => {
                tracing::error!(component = COMPONENT, "Connection pool did not close in time");
                Err(ShutdownError {
                    failures: vec![ComponentFailure::new(COMPONENT, "pool close exceeded grace")],
                })
            }
        };

        ShutdownError::collect([tasks, pool])
    }
}
