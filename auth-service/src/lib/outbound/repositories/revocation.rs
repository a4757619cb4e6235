use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use auth::TokenCodec;
use sqlx::PgPool;

use super::database_error;
use super::PostgresStore;
use crate::lifecycle::ShutdownError;
use crate::outbound::unix_now;
use crate::session::errors::StorageError;
use crate::session::ports::RevocationRegistry;

/// Revoked tokens stored with their own `exp`; a row is live while `now <= exp`.
pub struct PostgresRevocationRegistry {
    store: Arc<PostgresStore>,
    codec: Arc<TokenCodec>,
}

impl PostgresRevocationRegistry {
    pub fn new(store: Arc<PostgresStore>, codec: Arc<TokenCodec>) -> Self {
        Self { store, codec }
    }

    fn pool(&self) -> &PgPool {
        self.store.pool()
    }

    /// Delete rows of tokens past their expiry every `every` until shutdown.
    pub fn spawn_purge(&self, every: Duration) {
        let pool = self.pool().clone();

        self.store.supervisor().spawn_periodic("revocation-purge", every, move || {
            let pool = pool.clone();
            async move {
                match sqlx::query("DELETE FROM revoked_tokens WHERE expires_at < $1")
                    .bind(unix_now())
                    .execute(&pool)
                    .await
                {
                    Ok(result) if result.rows_affected() > 0 => {
                        tracing::debug!(purged = result.rows_affected(), "Expired revocations purged");
                    }
                    Ok(_) => {}
                    Err(e) => tracing::error!(error = %e, "Failed to purge revocations"),
                }
            }
        });
    }
}

#[async_trait]
impl RevocationRegistry for PostgresRevocationRegistry {
    async fn add_tokens(&self, tokens: &[String]) -> Result<(), StorageError> {
        for token in tokens {
            let expires_at = match self.codec.get_expiration(token) {
                Ok(expires_at) => expires_at,
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping revocation of unreadable token");
                    continue;
                }
            };

            sqlx::query(
                r#"
                INSERT INTO revoked_tokens (token, expires_at)
                VALUES ($1, $2)
                ON CONFLICT (token)
                DO UPDATE SET expires_at = GREATEST(revoked_tokens.expires_at, EXCLUDED.expires_at)
                "#,
            )
            .bind(token)
            .bind(expires_at)
            .execute(self.pool())
            .await
            .map_err(database_error)?;
        }

        Ok(())
    }

    async fn is_allowed(&self, token: &str) -> Result<bool, StorageError> {
        let revoked: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM revoked_tokens WHERE token = $1 AND expires_at >= $2)",
        )
        .bind(token)
        .bind(unix_now())
        .fetch_one(self.pool())
        .await
        .map_err(database_error)?;

        Ok(!revoked)
    }

    async fn claim(&self, token: &str, expires_at: i64) -> Result<bool, StorageError> {
        let now = unix_now();
        if expires_at < now {
            return Ok(false);
        }

        // A leftover row of an expired marker may be taken over; a live one may not.
        let result = sqlx::query(
            r#"
            INSERT INTO revoked_tokens (token, expires_at)
            VALUES ($1, $2)
            ON CONFLICT (token)
            DO UPDATE SET expires_at = EXCLUDED.expires_at
            WHERE revoked_tokens.expires_at < $3
            "#,
        )
        .bind(token)
        .bind(expires_at)
        .bind(now)
        .execute(self.pool())
        .await
        .map_err(database_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn shut_down(&self, grace: Duration) -> Result<(), ShutdownError> {
        self.store.shut_down(grace).await
    }
}
