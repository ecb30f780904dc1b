//! 数据库迁移
//!
//! 两个服务各自维护自己的表，可以部署在同一个数据库里，
//! 所以迁移版本号互不重叠，并且运行时忽略对方已应用的版本。

use sqlx::{migrate::Migrator, PgPool};

pub async fn run_account_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    run(sqlx::migrate!("./migrations/accounts"), pool).await
}

pub async fn run_chat_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    run(sqlx::migrate!("./migrations/chat"), pool).await
}

async fn run(mut migrator: Migrator, pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    migrator.set_ignore_missing(true);
    migrator.run(pool).await
}
