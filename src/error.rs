//! 统一错误处理
//!
//! 提供 `ApiError` 枚举实现 `IntoResponse`，所有 handler 共用同一种错误响应格式

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::probe::ProbeError;

/// API 错误响应结构
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// 统一 API 错误类型
#[derive(Debug)]
pub enum ApiError {
    /// 404 - 资源未找到
    NotFound(String),
    /// 400 - 请求无效
    BadRequest(String),
    /// 409 - 冲突（如：流水线已在运行）
    Conflict(String),
    /// 500 - 内部错误
    Internal(String),
    /// 503 - 后端存储不可达，携带探测失败详情
    ServiceUnavailable {
        message: String,
        details: Option<String>,
    },
}

impl ApiError {
    /// 创建未找到错误
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound(resource.into())
    }

    /// 创建请求无效错误
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    /// 创建冲突错误
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// 创建内部错误
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// 创建服务不可用错误
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::ServiceUnavailable {
            message: message.into(),
            details: None,
        }
    }
}

/// 探测失败统一映射为 503，人类可读信息放 message，底层错误放 details
impl From<ProbeError> for ApiError {
    fn from(err: ProbeError) -> Self {
        Self::ServiceUnavailable {
            message: err.user_message(),
            details: Some(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::NotFound(resource) => (
                StatusCode::NOT_FOUND,
                ErrorResponse::new("not_found", format!("{} not found", resource)),
            ),
            ApiError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, ErrorResponse::new("bad_request", msg))
            }
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, ErrorResponse::new("conflict", msg)),
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse::new("internal_error", msg),
            ),
            ApiError::ServiceUnavailable { message, details } => {
                let mut body = ErrorResponse::new("service_unavailable", message);
                if let Some(details) = details {
                    body = body.with_details(details);
                }
                (StatusCode::SERVICE_UNAVAILABLE, body)
            }
        };

        (status, Json(body)).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::NotFound(r) => write!(f, "Not found: {}", r),
            ApiError::BadRequest(m) => write!(f, "Bad request: {}", m),
            ApiError::Conflict(m) => write!(f, "Conflict: {}", m),
            ApiError::Internal(m) => write!(f, "Internal error: {}", m),
            ApiError::ServiceUnavailable { message, .. } => {
                write!(f, "Service unavailable: {}", message)
            }
        }
    }
}

impl std::error::Error for ApiError {}

/// 便捷类型别名
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::health::ProbeTarget;

    #[test]
    fn test_error_response_new() {
        let resp = ErrorResponse::new("test_error", "Test message");
        assert_eq!(resp.error, "test_error");
        assert_eq!(resp.message, "Test message");
        assert!(resp.details.is_none());
    }

    #[test]
    fn test_error_response_with_details() {
        let resp = ErrorResponse::new("test_error", "Test message").with_details("Extra info");
        assert_eq!(resp.details, Some("Extra info".to_string()));
    }

    #[test]
    fn test_probe_error_maps_to_service_unavailable() {
        let err = ProbeError::Timeout {
            target: ProbeTarget::Cache,
            secs: 5,
        };
        let api_err = ApiError::from(err);
        match api_err {
            ApiError::ServiceUnavailable { message, details } => {
                assert!(message.contains("Redis"));
                assert!(details.is_some());
            }
            other => panic!("expected ServiceUnavailable, got {:?}", other),
        }
    }
}
