//! PostgreSQL 仓储实现
//!
//! 枚举以 TEXT 存储，通过 `as_str` / `FromStr` 互转；结构化字段以 JSONB 存储。

mod account;
mod activity;
mod message;
mod preferences;
mod session;

use application::Page;
use domain::RepositoryError;

pub use account::PgAccountRepository;
pub use activity::{PgActivityRepository, PgLoginAttemptRepository};
pub use message::PgMessageRepository;
pub use preferences::PgPreferencesRepository;
pub use session::PgSessionRepository;

/// 唯一约束冲突保留约束名，其余错误一律视为存储故障
pub(crate) fn map_sqlx_err(err: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return RepositoryError::conflict(db.constraint().unwrap_or("unique").to_owned());
        }
    }
    RepositoryError::storage(err.to_string())
}

pub(crate) fn invalid_data(message: impl Into<String>) -> RepositoryError {
    RepositoryError::storage(message)
}

pub(crate) fn to_count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

pub(crate) fn page<T>(items: Vec<T>, total: i64, offset: u32) -> Page<T> {
    Page::new(items, to_count(total), offset)
}
