use std::sync::Arc;

use application::{
    AccountRepository, ActivityRepository, CacheStore, LoginAttemptRepository, MessageRepository,
    PasswordHasher, PreferencesRepository, SessionRepository,
};
use config::{DatabaseConfig, RedisConfig};
use sqlx::PgPool;
use thiserror::Error;

use crate::{
    cache::RedisCacheStore,
    migrations::{run_account_migrations, run_chat_migrations},
    password::BcryptPasswordHasher,
    pool::connect_database,
    repository::{
        PgAccountRepository, PgActivityRepository, PgLoginAttemptRepository, PgMessageRepository,
        PgPreferencesRepository, PgSessionRepository,
    },
};

#[derive(Debug, Error)]
pub enum InfrastructureError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("cache error: {0}")]
    Cache(#[from] redis::RedisError),
}

/// 身份服务使用的适配器集合
#[derive(Clone)]
pub struct AccountInfrastructure {
    pub pool: PgPool,
    pub accounts: Arc<PgAccountRepository>,
    pub preferences: Arc<PgPreferencesRepository>,
    pub activity: Arc<PgActivityRepository>,
    pub login_attempts: Arc<PgLoginAttemptRepository>,
    pub password_hasher: Arc<BcryptPasswordHasher>,
}

impl AccountInfrastructure {
    /// 建立连接池并执行账户相关迁移
    pub async fn connect(
        database: &DatabaseConfig,
        bcrypt_cost: u32,
    ) -> Result<Self, InfrastructureError> {
        let pool = connect_database(database).await?;
        run_account_migrations(&pool).await?;
        let infra = Self::from_pool(pool, bcrypt_cost);
        tracing::info!(
            bcrypt_cost = infra.password_hasher.cost(),
            "account infrastructure ready"
        );
        Ok(infra)
    }

    pub fn from_pool(pool: PgPool, bcrypt_cost: u32) -> Self {
        Self {
            accounts: Arc::new(PgAccountRepository::new(pool.clone())),
            preferences: Arc::new(PgPreferencesRepository::new(pool.clone())),
            activity: Arc::new(PgActivityRepository::new(pool.clone())),
            login_attempts: Arc::new(PgLoginAttemptRepository::new(pool.clone())),
            password_hasher: Arc::new(BcryptPasswordHasher::new(Some(bcrypt_cost))),
            pool,
        }
    }

    pub fn account_repository(&self) -> Arc<dyn AccountRepository> {
        self.accounts.clone()
    }

    pub fn preferences_repository(&self) -> Arc<dyn PreferencesRepository> {
        self.preferences.clone()
    }

    pub fn activity_repository(&self) -> Arc<dyn ActivityRepository> {
        self.activity.clone()
    }

    pub fn login_attempt_repository(&self) -> Arc<dyn LoginAttemptRepository> {
        self.login_attempts.clone()
    }

    pub fn password_hasher_trait(&self) -> Arc<dyn PasswordHasher> {
        self.password_hasher.clone()
    }
}

/// 聊天服务使用的适配器集合
#[derive(Clone)]
pub struct ChatInfrastructure {
    pub pool: PgPool,
    pub sessions: Arc<PgSessionRepository>,
    pub messages: Arc<PgMessageRepository>,
    pub cache: Arc<RedisCacheStore>,
}

impl ChatInfrastructure {
    /// 建立数据库与 Redis 连接，并执行聊天相关迁移
    pub async fn connect(
        database: &DatabaseConfig,
        redis: &RedisConfig,
    ) -> Result<Self, InfrastructureError> {
        let pool = connect_database(database).await?;
        run_chat_migrations(&pool).await?;
        let cache = RedisCacheStore::connect(&redis.connection_url()).await?;
        tracing::info!(db = redis.db, "redis connection ready");

        Ok(Self {
            sessions: Arc::new(PgSessionRepository::new(pool.clone())),
            messages: Arc::new(PgMessageRepository::new(pool.clone())),
            cache: Arc::new(cache),
            pool,
        })
    }

    pub fn session_repository(&self) -> Arc<dyn SessionRepository> {
        self.sessions.clone()
    }

    pub fn message_repository(&self) -> Arc<dyn MessageRepository> {
        self.messages.clone()
    }

    pub fn cache_store(&self) -> Arc<dyn CacheStore> {
        self.cache.clone()
    }
}
