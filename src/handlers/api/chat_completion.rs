use axum::extract::{Json, State};
use tracing::info;

use crate::error::RouterError;
use crate::handlers::api::extract::ApiJson;
use crate::models::{ChatRequest, ChatResponse};
use crate::routes::api::AppState;

/// 处理聊天完成请求
///
/// 按显式指定、路由规则、默认策略的顺序选择提供商。
#[utoipa::path(
    post,
    path = "/api/v1/chat/completions",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "成功处理聊天请求", body = ChatResponse),
        (status = 400, description = "请求体格式错误", body = crate::error::ErrorResponse),
        (status = 501, description = "提供商的API类型没有适配器", body = crate::error::ErrorResponse),
        (status = 502, description = "提供商调用失败", body = crate::error::ErrorResponse),
        (status = 503, description = "没有可用的提供商", body = crate::error::ErrorResponse),
    ),
    tag = "chat"
)]
pub async fn handle_chat_completion(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<ChatRequest>,
) -> Result<Json<ChatResponse>, RouterError> {
    info!(
        "收到聊天完成请求, 指定提供商: {:?}, 消息数: {}",
        request.provider_id,
        request.messages.len()
    );

    let response = state.api.send_chat_message(request).await?;
    Ok(Json(response))
}
