//! 领域模型错误定义
//!
//! 领域层只描述业务上可识别的失败；存储层失败统一落到 [`RepositoryError`]。

use thiserror::Error;

use crate::password_policy::PasswordViolation;
use crate::value_objects::Timestamp;

/// 领域模型错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    /// 输入校验失败
    #[error("invalid {field}: {reason}")]
    InvalidArgument { field: String, reason: String },

    /// 密码强度不满足要求
    #[error("weak password: {0}")]
    WeakPassword(PasswordViolation),

    #[error("email already registered")]
    EmailTaken,

    #[error("username already taken")]
    UsernameTaken,

    /// 数量上限（活跃会话数、会话消息数等）
    #[error("limit exceeded: {resource} (max {max})")]
    LimitExceeded { resource: &'static str, max: u64 },

    #[error("account not found")]
    AccountNotFound,

    #[error("preferences not found")]
    PreferencesNotFound,

    /// 会话不存在或不属于调用者
    #[error("session not found")]
    SessionNotFound,

    /// 消息不存在或不属于调用者
    #[error("message not found")]
    MessageNotFound,

    #[error("session is not active")]
    SessionNotActive,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("account is not active")]
    AccountInactive,

    #[error("account is temporarily locked until {until}")]
    AccountLocked { until: Timestamp },

    #[error("invalid token")]
    TokenInvalid,

    #[error("token expired")]
    TokenExpired,

    #[error("unexpected token kind: expected {expected}, got {actual}")]
    TokenKindMismatch { expected: String, actual: String },
}

impl DomainError {
    /// 创建输入校验错误
    pub fn invalid_argument(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// 是否属于认证类错误
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            Self::InvalidCredentials
                | Self::AccountInactive
                | Self::AccountLocked { .. }
                | Self::TokenInvalid
                | Self::TokenExpired
                | Self::TokenKindMismatch { .. }
        )
    }
}

/// 仓储层错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RepositoryError {
    #[error("record not found")]
    NotFound,

    /// 唯一约束冲突，携带约束名便于上层映射
    #[error("unique constraint violated: {constraint}")]
    Conflict { constraint: String },

    #[error("storage error: {message}")]
    Storage { message: String },
}

impl RepositoryError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    pub fn conflict(constraint: impl Into<String>) -> Self {
        Self::Conflict {
            constraint: constraint.into(),
        }
    }
}
