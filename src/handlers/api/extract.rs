use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Request},
    Json,
};
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::error::RouterError;

/// 与 `Json` 相同，但解析失败时返回 JSON 格式的 `ErrorResponse`
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = RouterError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        Json::<T>::from_request(req, state)
            .await
            .map(|Json(value)| ApiJson(value))
            .map_err(|rejection| {
                warn!("请求体解析失败: {}", rejection.body_text());
                RouterError::InvalidRequest(rejection.body_text())
            })
    }
}

/// 路由规则请求体解析失败（包括未知的条件字段）统一视为无效规则
pub fn rule_rejection(rejection: JsonRejection) -> RouterError {
    warn!("路由规则解析失败: {}", rejection.body_text());
    RouterError::InvalidRule(rejection.body_text())
}
