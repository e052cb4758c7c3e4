use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// 路由核心错误
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("没有可用的API提供商")]
    NoAvailableProvider,

    #[error("不支持的API类型: {0}")]
    UnsupportedApiType(String),

    #[error("调用提供商 {provider_id} 失败 [{code}]: {message}")]
    ProviderCall {
        provider_id: String,
        code: String,
        message: String,
    },

    #[error("提供商不存在: {0}")]
    ProviderNotFound(String),

    #[error("无效的路由规则: {0}")]
    InvalidRule(String),

    #[error("无效的请求体: {0}")]
    InvalidRequest(String),

    #[error("请求参数校验失败: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("遥测存储错误: {0}")]
    Telemetry(#[from] anyhow::Error),
}

impl RouterError {
    pub fn provider_call(
        provider_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::ProviderCall {
            provider_id: provider_id.into(),
            code: code.into(),
            message: message.into(),
        }
    }

    /// 写入错误事件的错误码
    pub fn code(&self) -> &str {
        match self {
            RouterError::NoAvailableProvider => "NO_AVAILABLE_PROVIDER",
            RouterError::UnsupportedApiType(_) => "UNSUPPORTED_API_TYPE",
            RouterError::ProviderCall { code, .. } => code,
            RouterError::ProviderNotFound(_) => "PROVIDER_NOT_FOUND",
            RouterError::InvalidRule(_) => "INVALID_RULE",
            RouterError::InvalidRequest(_) => "INVALID_REQUEST",
            RouterError::Validation(_) => "VALIDATION_ERROR",
            RouterError::Telemetry(_) => "TELEMETRY_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            RouterError::NoAvailableProvider => StatusCode::SERVICE_UNAVAILABLE,
            RouterError::UnsupportedApiType(_) => StatusCode::NOT_IMPLEMENTED,
            RouterError::ProviderCall { .. } => StatusCode::BAD_GATEWAY,
            RouterError::ProviderNotFound(_) => StatusCode::NOT_FOUND,
            RouterError::InvalidRule(_)
            | RouterError::InvalidRequest(_)
            | RouterError::Validation(_) => StatusCode::BAD_REQUEST,
            RouterError::Telemetry(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type Result<T, E = RouterError> = std::result::Result<T, E>;

/// API错误响应
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// 错误信息
    pub error: String,
    /// 错误码
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl IntoResponse for RouterError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.to_string(),
            code: Some(self.code().to_string()),
        };
        (self.status_code(), Json(body)).into_response()
    }
}
