//! RPC 应答信封
//!
//! 校验、认证和业务失败放在应答体里（`success = false` + `error`），
//! 依赖故障才使用传输层错误。

use application::{ApplicationError, ErrorKind};
use axum::Json;
use serde::Serialize;

use crate::error::{error_code, public_message, ApiError};

#[derive(Debug, Serialize)]
pub struct Reply<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
    #[serde(flatten)]
    pub data: Option<T>,
}

impl<T> Reply<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            error: None,
            code: None,
            data: Some(data),
        }
    }

    pub fn failure(error: &ApplicationError) -> Self {
        Self {
            success: false,
            error: Some(public_message(error)),
            code: Some(error_code(error)),
            data: None,
        }
    }
}

/// 无数据的成功应答
#[derive(Debug, Serialize)]
pub struct Done {
    pub success: bool,
}

pub type RpcResult<T> = Result<Json<Reply<T>>, ApiError>;

/// 业务失败写进应答体，依赖故障转为传输层错误
pub fn respond<T, U>(result: Result<T, ApplicationError>, map: impl FnOnce(T) -> U) -> RpcResult<U> {
    match result {
        Ok(value) => Ok(Json(Reply::ok(map(value)))),
        Err(err) if err.kind() == ErrorKind::Dependency => Err(ApiError::from(err)),
        Err(err) => {
            tracing::debug!(code = error_code(&err), error = %err, "request rejected");
            Ok(Json(Reply::failure(&err)))
        }
    }
}

/// 空应答的操作用状态码表达失败
pub fn done(result: Result<(), ApplicationError>) -> Result<Json<Done>, ApiError> {
    result.map_err(ApiError::from)?;
    Ok(Json(Done { success: true }))
}
