use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;

use super::database_error;
use super::PostgresStore;
use crate::lifecycle::ShutdownError;
use crate::outbound::unix_now;
use crate::session::errors::StorageError;
use crate::session::ports::PairRegistry;

pub struct PostgresPairRegistry {
    store: Arc<PostgresStore>,
    ttl: Duration,
}

impl PostgresPairRegistry {
    pub fn new(store: Arc<PostgresStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    fn pool(&self) -> &PgPool {
        self.store.pool()
    }

    /// Delete expired pairs every `every` until shutdown.
    pub fn spawn_purge(&self, every: Duration) {
        let pool = self.pool().clone();

        self.store.supervisor().spawn_periodic("pair-purge", every, move || {
            let pool = pool.clone();
            async move {
                match sqlx::query("DELETE FROM token_pairs WHERE expires_at < $1")
                    .bind(unix_now())
                    .execute(&pool)
                    .await
                {
                    Ok(result) if result.rows_affected() > 0 => {
                        tracing::debug!(purged = result.rows_affected(), "Expired token pairs purged");
                    }
                    Ok(_) => {}
                    Err(e) => tracing::error!(error = %e, "Failed to purge token pairs"),
                }
            }
        });
    }
}

#[async_trait]
impl PairRegistry for PostgresPairRegistry {
    async fn add_pair(&self, access_token: &str, refresh_token: &str) -> Result<(), StorageError> {
        let expires_at = unix_now().saturating_add(self.ttl.as_secs() as i64);

        sqlx::query(
            r#"
            INSERT INTO token_pairs (refresh_token, access_token, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (refresh_token)
            DO UPDATE SET access_token = EXCLUDED.access_token, expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(refresh_token)
        .bind(access_token)
        .bind(expires_at)
        .execute(self.pool())
        .await
        .map_err(database_error)?;

        Ok(())
    }

    async fn get_access_by_refresh(&self, refresh_token: &str) -> Result<String, StorageError> {
        let row: Option<(String, i64)> = sqlx::query_as(
            r#"
            DELETE FROM token_pairs
            WHERE refresh_token = $1
            RETURNING access_token, expires_at
            "#,
        )
        .bind(refresh_token)
        .fetch_optional(self.pool())
        .await
        .map_err(database_error)?;

        match row {
            Some((access_token, expires_at)) if expires_at >= unix_now() => Ok(access_token),
            _ => Err(StorageError::NotFound("token pair".to_string())),
        }
    }

    async fn shut_down(&self, grace: Duration) -> Result<(), ShutdownError> {
        self.store.shut_down(grace).await
    }
}
