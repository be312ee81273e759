use deadpool_postgres::{
    Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime, Timeouts,
};
use std::time::Duration;
use tokio_postgres::NoTls;

use crate::error::{AppError, Result};

/// Upper bound on pooled connections.
const MAX_POOL_SIZE: usize = 32;

/// Creates a new database connection pool.
///
/// The URL is parsed up front so a typo fails at startup rather than on the
/// first request. Connections themselves are opened lazily.
///
/// # Arguments
///
/// * `database_url` - The URL of the PostgreSQL database.
/// * `wait_timeout` - How long a caller may wait for a free connection.
pub fn create_pool(database_url: &str, wait_timeout: Duration) -> Result<Pool> {
    database_url.parse::<tokio_postgres::Config>()?;

    let mut cfg = Config::new();
    cfg.url = Some(database_url.to_string());
    cfg.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    });
    cfg.pool = Some(PoolConfig {
        max_size: MAX_POOL_SIZE,
        timeouts: Timeouts {
            wait: Some(wait_timeout),
            create: Some(wait_timeout),
            recycle: Some(Duration::from_secs(1)),
        },
        ..PoolConfig::default()
    });

    cfg.create_pool(Some(Runtime::Tokio1), NoTls)
        .map_err(AppError::from)
}

/// Opens one connection and runs a trivial query.
pub async fn check_connection(pool: &Pool) -> Result<()> {
    let client = pool.get().await?;
    client.simple_query("SELECT 1").await?;
    tracing::info!("✅ PostgreSQL reachable");
    Ok(())
}
