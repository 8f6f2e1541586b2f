use super::Database;
use crate::monitor::Result;
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{debug, warn};

/// `Database` collaborator backed by a native PostgreSQL connection pool.
pub struct PostgresDatabase {
    pool: PgPool,
}

impl PostgresDatabase {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Retry database operations with exponential backoff.
    async fn retry_operation<T, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut retries = 0;
        let max_retries = 3;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    if retries >= max_retries {
                        return Err(e);
                    }

                    retries += 1;
                    let delay = std::time::Duration::from_millis(100 * (1 << retries));
                    warn!(
                        "Database operation failed (attempt {}), retrying in {:?}: {}",
                        retries, delay, e
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[async_trait]
impl Database for PostgresDatabase {
    async fn is_ready(&self) -> bool {
        match sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await
        {
            Ok(_) => true,
            Err(e) => {
                debug!("Database readiness check failed: {}", e);
                false
            }
        }
    }

    async fn current_log_position(&self) -> Result<Option<String>> {
        let lsn: String = self
            .retry_operation(|| async {
                let lsn: String = sqlx::query_scalar("SELECT pg_current_wal_lsn()::text")
                    .fetch_one(&self.pool)
                    .await?;
                Ok(lsn)
            })
            .await?;

        Ok(if lsn.is_empty() { None } else { Some(lsn) })
    }
}
