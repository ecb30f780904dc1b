use domain::{DomainError, RepositoryError};
use thiserror::Error;

use crate::password::PasswordHasherError;

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),
    #[error("repository error: {0}")]
    Repository(RepositoryError),
    #[error("password error: {0}")]
    Password(#[from] PasswordHasherError),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

/// 对外暴露的错误分类，传输层据此决定状态码和是否隐藏细节
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    FailedPrecondition,
    Unauthenticated,
    Dependency,
}

impl ApplicationError {
    /// 创建基础设施错误
    pub fn infrastructure(message: impl Into<String>) -> Self {
        ApplicationError::Infrastructure(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        ApplicationError::Configuration(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ApplicationError::Domain(err) => match err {
                DomainError::InvalidArgument { .. } | DomainError::WeakPassword(_) => {
                    ErrorKind::Validation
                }
                DomainError::EmailTaken
                | DomainError::UsernameTaken
                | DomainError::LimitExceeded { .. } => ErrorKind::Conflict,
                DomainError::AccountNotFound
                | DomainError::PreferencesNotFound
                | DomainError::SessionNotFound
                | DomainError::MessageNotFound => ErrorKind::NotFound,
                DomainError::SessionNotActive => ErrorKind::FailedPrecondition,
                DomainError::InvalidCredentials
                | DomainError::AccountInactive
                | DomainError::AccountLocked { .. }
                | DomainError::TokenInvalid
                | DomainError::TokenExpired
                | DomainError::TokenKindMismatch { .. } => ErrorKind::Unauthenticated,
            },
            ApplicationError::Repository(RepositoryError::NotFound) => ErrorKind::NotFound,
            ApplicationError::Repository(RepositoryError::Conflict { .. }) => ErrorKind::Conflict,
            ApplicationError::Repository(RepositoryError::Storage { .. })
            | ApplicationError::Password(_)
            | ApplicationError::Configuration(_)
            | ApplicationError::Infrastructure(_) => ErrorKind::Dependency,
        }
    }
}

impl From<RepositoryError> for ApplicationError {
    fn from(value: RepositoryError) -> Self {
        ApplicationError::Repository(value)
    }
}
