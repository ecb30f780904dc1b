//! 会话与身份服务的核心领域模型
//!
//! 包含账户、会话、消息、偏好等实体，以及登录锁定、密码强度等业务规则。

pub mod account;
pub mod activity;
pub mod errors;
pub mod lockout;
pub mod message;
pub mod password_policy;
pub mod preferences;
pub mod session;
pub mod value_objects;

// 重新导出常用类型
pub use account::{Account, AccountRole, AccountStatus};
pub use activity::{ActivityEvent, ActivityType, LoginAttempt, UserStats};
pub use errors::{DomainError, RepositoryError};
pub use lockout::{FailedLoginOutcome, LockState, LockoutPolicy};
pub use message::{validate_content, Message, MessageMetadata, MessageType, NewMessage};
pub use password_policy::{PasswordPolicy, PasswordViolation};
pub use preferences::{parse_language, AiPreferences, Preferences, ProfileVisibility, Theme};
pub use session::{validate_title, ChatSession, SessionSettings, SessionStatus};
pub use value_objects::{AccountId, Email, MessageId, PasswordHash, SessionId, Timestamp, Username};
