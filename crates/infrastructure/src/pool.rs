use std::time::Duration;

use config::DatabaseConfig;
use sqlx::{postgres::PgPoolOptions, PgPool};

pub async fn create_pg_pool(
    database_url: &str,
    max_connections: u32,
    min_connections: u32,
    acquire_timeout: Duration,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .min_connections(min_connections.min(max_connections))
        .acquire_timeout(acquire_timeout)
        .connect(database_url)
        .await
}

/// 按配置创建连接池
pub async fn connect_database(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    let pool = create_pg_pool(
        &config.connection_url(),
        config.max_connections,
        config.min_connections,
        config.acquire_timeout(),
    )
    .await?;
    tracing::info!(
        host = %config.host,
        database = %config.name,
        max_connections = config.max_connections,
        "database pool ready"
    );
    Ok(pool)
}
