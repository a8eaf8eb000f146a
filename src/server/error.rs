// API 错误类型

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use tracing::error;

/// 控制面 API 错误
///
/// 参数校验失败返回 400，存储后端问题统一 500，响应体固定为 `{"error": ...}`
#[derive(Debug)]
pub enum ApiError {
    /// 请求参数非法（缺失/为空）
    BadRequest(String),
    /// 服务端内部错误
    Internal(anyhow::Error),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(e) => {
                error!("内部错误: {:#}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, format!("{}", e))
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        ApiError::Internal(e)
    }
}

impl ApiError {
    /// 缺少必填字段
    pub fn missing_field(field: &str) -> Self {
        ApiError::BadRequest(format!("缺少必需参数: {}", field))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_request_maps_to_400() {
        let response = ApiError::missing_field("sessionId").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_internal_maps_to_500() {
        let response = ApiError::Internal(anyhow::anyhow!("boom")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
