use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::config::AppConfig;

/// Build a lazy Postgres pool for the analytics warehouse.
///
/// Connections are established on first use, so startup never blocks on
/// the warehouse being reachable. Returns `None` when no URL is
/// configured; callers surface that as a dependency error per request.
pub fn build_pool(config: &AppConfig) -> Option<PgPool> {
    let url = config.warehouse_db_url.as_deref()?;

    match PgPoolOptions::new()
        .max_connections(config.db_pool_max_connections)
        .min_connections(config.db_pool_min_connections)
        .acquire_timeout(Duration::from_secs(config.db_pool_acquire_timeout_seconds))
        .idle_timeout(Duration::from_secs(config.db_pool_idle_timeout_seconds))
        .connect_lazy(url)
    {
        Ok(pool) => Some(pool),
        Err(error) => {
            tracing::warn!(error = %error, "Invalid warehouse database URL, continuing without a pool");
            None
        }
    }
}
