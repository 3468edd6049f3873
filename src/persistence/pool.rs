//! Database pool and migrations.

use std::str::FromStr;

use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use tracing::info;

use crate::config::StoreConfig;

/// Create a pool from the store config. Connects eagerly so a bad URL fails here.
pub async fn create_pool(config: &StoreConfig) -> Result<PgPool, sqlx::Error> {
    let mut options = PgConnectOptions::from_str(&config.database.connection_url())?;
    if let Some(timeout) = config.pool.statement_timeout {
        options = options.options([("statement_timeout", timeout.as_millis().to_string())]);
    }

    let pool_cfg = &config.pool;
    let pool = PgPoolOptions::new()
        .max_connections(pool_cfg.max_conns)
        .min_connections(pool_cfg.min_conns)
        .max_lifetime(pool_cfg.max_conn_lifetime)
        .idle_timeout(pool_cfg.max_conn_idle_time)
        .acquire_timeout(pool_cfg.connect_timeout)
        .test_before_acquire(!pool_cfg.health_check_period.is_zero())
        .connect_with(options)
        .await?;

    info!(
        host = %config.database.host,
        max_connections = pool_cfg.max_conns,
        "PostgreSQL connection pool initialized"
    );
    Ok(pool)
}

/// Create a pool and run migrations.
pub async fn create_pool_and_migrate(config: &StoreConfig) -> Result<PgPool, sqlx::Error> {
    let pool = create_pool(config).await?;
    run_migrations(&pool).await?;
    Ok(pool)
}

/// Run embedded migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::migrate!("./migrations").run(pool).await?;
    info!("migrations applied");
    Ok(())
}
