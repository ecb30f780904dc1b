use application::{ApplicationError, ErrorKind};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use domain::{DomainError, RepositoryError};
use serde::Serialize;

pub const INTERNAL_ERROR_MESSAGE: &str = "internal error";

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub code: &'static str,
    pub error: String,
}

/// 以传输层状态码返回的失败
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                success: false,
                code,
                error: message.into(),
            },
        }
    }

    pub fn internal() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL",
            INTERNAL_ERROR_MESSAGE,
        )
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.body.code
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::FailedPrecondition => StatusCode::PRECONDITION_FAILED,
        ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
        ErrorKind::Dependency => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// 稳定的错误码，供调用方分支
pub fn error_code(error: &ApplicationError) -> &'static str {
    match error {
        ApplicationError::Domain(err) => match err {
            DomainError::InvalidArgument { .. } => "INVALID_ARGUMENT",
            DomainError::WeakPassword(_) => "WEAK_PASSWORD",
            DomainError::EmailTaken => "EMAIL_TAKEN",
            DomainError::UsernameTaken => "USERNAME_TAKEN",
            DomainError::LimitExceeded { .. } => "LIMIT_EXCEEDED",
            DomainError::AccountNotFound => "ACCOUNT_NOT_FOUND",
            DomainError::PreferencesNotFound => "PREFERENCES_NOT_FOUND",
            DomainError::SessionNotFound => "SESSION_NOT_FOUND",
            DomainError::MessageNotFound => "MESSAGE_NOT_FOUND",
            DomainError::SessionNotActive => "SESSION_NOT_ACTIVE",
            DomainError::InvalidCredentials => "INVALID_CREDENTIALS",
            DomainError::AccountInactive => "ACCOUNT_INACTIVE",
            DomainError::AccountLocked { .. } => "ACCOUNT_LOCKED",
            DomainError::TokenInvalid => "TOKEN_INVALID",
            DomainError::TokenExpired => "TOKEN_EXPIRED",
            DomainError::TokenKindMismatch { .. } => "TOKEN_KIND_MISMATCH",
        },
        ApplicationError::Repository(RepositoryError::NotFound) => "NOT_FOUND",
        ApplicationError::Repository(RepositoryError::Conflict { .. }) => "CONFLICT",
        _ => "INTERNAL",
    }
}

/// 对外可见的错误信息；依赖故障只记录日志，不暴露细节
pub fn public_message(error: &ApplicationError) -> String {
    match error {
        ApplicationError::Domain(err) => err.to_string(),
        ApplicationError::Repository(RepositoryError::NotFound) => "not found".to_string(),
        ApplicationError::Repository(RepositoryError::Conflict { .. }) => {
            "resource already exists".to_string()
        }
        other => {
            tracing::error!(error = %other, "request failed on a dependency");
            INTERNAL_ERROR_MESSAGE.to_string()
        }
    }
}

impl From<ApplicationError> for ApiError {
    fn from(error: ApplicationError) -> Self {
        let status = status_for(error.kind());
        let code = error_code(&error);
        let message = public_message(&error);
        ApiError::new(status, code, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependency_failures_hide_details() {
        let err = ApiError::from(ApplicationError::from(RepositoryError::storage(
            "connection refused at 10.0.0.5",
        )));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.body.error, INTERNAL_ERROR_MESSAGE);
    }

    #[test]
    fn domain_failures_map_to_status() {
        let err = ApiError::from(ApplicationError::from(DomainError::SessionNotFound));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.code(), "SESSION_NOT_FOUND");

        let err = ApiError::from(ApplicationError::from(DomainError::TokenExpired));
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }
}
