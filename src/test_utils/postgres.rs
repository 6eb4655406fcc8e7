use postgresql_embedded::PostgreSQL;
use tracing::info;

use crate::pool::{ConnectionPool, PoolConfig};
use crate::postgres::PgManager;

/// A throwaway Postgres server with one database created for the test.
pub struct EmbeddedPostgres {
    pub postgresql: PostgreSQL,
    pub port: u16,
    pub database_url: String,
}

impl EmbeddedPostgres {
    /// Install (bundled binaries), start, and create `db_name`.
    ///
    /// # Errors
    /// Returns an error if the server cannot be set up or started, or the database
    /// cannot be created or reached.
    pub async fn start(db_name: &str) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let mut postgresql = PostgreSQL::default();
        postgresql.setup().await?;
        postgresql.start().await?;
        postgresql.create_database(db_name).await?;

        let settings = postgresql.settings();
        let port = settings.port;
        let database_url = format!(
            "postgres://{}:{}@{}:{}/{}",
            settings.username, settings.password, settings.host, port, db_name
        );
        info!(port, "embedded postgres started");

        let embedded = Self {
            postgresql,
            port,
            database_url,
        };
        embedded.pool(2).await?.batch_execute("SELECT 1").await?;
        Ok(embedded)
    }

    /// A pool with short timeouts suited to tests.
    ///
    /// # Errors
    /// Returns `PgSteadyError::ConfigError` if the generated URL is rejected.
    pub async fn pool(
        &self,
        pool_size: u32,
    ) -> Result<ConnectionPool<PgManager>, crate::error::PgSteadyError> {
        let config = PoolConfig {
            pool_size,
            checkout_timeout_ms: 2_000,
            heal_backoff_ms: 100,
            max_heal_attempts: 3,
            ..PoolConfig::new(self.database_url.clone())
        };
        ConnectionPool::configure(config).await
    }

    /// Stop the server and remove its data directory.
    pub async fn stop(self) {
        let _ = self.postgresql.stop().await;
    }
}
