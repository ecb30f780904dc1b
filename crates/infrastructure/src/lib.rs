//! 基础设施层实现。
//!
//! 提供 PostgreSQL 仓储、Redis 缓存、bcrypt 密码哈希等适配器，实现应用层定义的接口。

pub mod builder;
pub mod cache;
pub mod migrations;
pub mod password;
pub mod pool;
pub mod repository;

pub use builder::{AccountInfrastructure, ChatInfrastructure, InfrastructureError};
pub use cache::RedisCacheStore;
pub use migrations::{run_account_migrations, run_chat_migrations};
pub use password::BcryptPasswordHasher;
pub use pool::{connect_database, create_pg_pool};
pub use repository::{
    PgAccountRepository, PgActivityRepository, PgLoginAttemptRepository, PgMessageRepository,
    PgPreferencesRepository, PgSessionRepository,
};
