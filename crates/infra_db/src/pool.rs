//! Connection pool and migrations
//!
//! One pool is shared by the HTTP handlers and the automation runner, so its
//! size is derived from the runner's concurrency.

use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::error::DatabaseError;

pub type DatabasePool = PgPool;

/// Connections kept for HTTP traffic on top of one per runner worker
const HTTP_HEADROOM: u32 = 4;

/// Pool settings for the billing database
///
/// ```rust
/// use infra_db::DatabaseConfig;
/// use std::time::Duration;
///
/// let config = DatabaseConfig::new("postgres://localhost/billing")
///     .sized_for_workers(8)
///     .statement_timeout(Duration::from_secs(5));
/// assert_eq!(config.max_connections, 12);
/// ```
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    /// Server-side cap on a single statement; `None` keeps the server default
    pub statement_timeout: Option<Duration>,
    /// Reported in `pg_stat_activity`
    pub application_name: String,
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 1 + HTTP_HEADROOM,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(5 * 60),
            statement_timeout: Some(Duration::from_secs(15)),
            application_name: "billing-api".to_string(),
        }
    }

    /// Grows the pool so every runner worker can hold a connection while
    /// handlers keep serving
    pub fn sized_for_workers(mut self, workers: u32) -> Self {
        self.max_connections = workers.max(1) + HTTP_HEADROOM;
        self.min_connections = self.min_connections.min(self.max_connections);
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = Some(timeout);
        self
    }

    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = name.into();
        self
    }

    fn connect_options(&self) -> Result<PgConnectOptions, DatabaseError> {
        let options = PgConnectOptions::from_str(&self.url)
            .map_err(|e| DatabaseError::ConnectionFailed(format!("invalid database url: {}", e)))?
            .application_name(&self.application_name);
        Ok(match self.statement_timeout {
            Some(timeout) => {
                options.options([("statement_timeout", timeout.as_millis().to_string())])
            }
            None => options,
        })
    }
}

/// Opens the pool and verifies one connection
///
/// # Errors
///
/// Returns `DatabaseError::ConnectionFailed` when the URL does not parse or the
/// server cannot be reached within the acquire timeout.
pub async fn create_pool(config: DatabaseConfig) -> Result<DatabasePool, DatabaseError> {
    info!(
        max_connections = config.max_connections,
        application_name = %config.application_name,
        "Opening billing database pool"
    );

    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .connect_with(config.connect_options()?)
        .await
        .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))
}

/// Applies the workspace `migrations/` directory
pub async fn run_migrations(pool: &DatabasePool) -> Result<(), DatabaseError> {
    sqlx::migrate!("../../migrations")
        .run(pool)
        .await
        .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
    info!("Billing schema is up to date");
    Ok(())
}
