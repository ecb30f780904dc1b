//! 应用层实现。
//!
//! 这里提供围绕领域模型的用例服务，处理输入校验、缓存读写策略，
//! 以及对外部适配器（例如密码哈希、持久化存储、缓存后端）的抽象。

pub mod cache;
pub mod clock;
pub mod dto;
pub mod error;
pub mod memory;
pub mod password;
pub mod repository;
pub mod services;
pub mod token;

pub use cache::{CacheError, CacheStore, CacheTtls, CachedHistory, NoopCacheStore, SessionCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use dto::{AccountView, AuthOutcome, Page, VerifiedToken};
pub use error::{ApplicationError, ErrorKind};
pub use password::{PasswordHasher, PasswordHasherError};
pub use repository::{
    AccountRepository, ActivityRepository, HistoryQuery, LoginAttemptRepository,
    MessageRepository, PreferencesRepository, SessionRepository,
};
pub use services::*;
pub use token::{TokenClaims, TokenKind, TokenPair, TokenService, TokenSettings};
