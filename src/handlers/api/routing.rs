use axum::extract::{rejection::JsonRejection, Json, State};
use tracing::info;

use crate::error::RouterError;
use crate::handlers::api::extract::{rule_rejection, ApiJson};
use crate::models::{RouterSettings, RoutingRule, SettingsUpdate};
use crate::routes::api::AppState;

/// 获取当前路由规则
#[utoipa::path(
    get,
    path = "/api/v1/routing/rules",
    responses((status = 200, description = "路由规则列表", body = Vec<RoutingRule>)),
    tag = "routing"
)]
pub async fn get_routing_rules(State(state): State<AppState>) -> Json<Vec<RoutingRule>> {
    Json(state.api.get_routing_rules().await)
}

/// 整体替换路由规则
///
/// 条件字段不在白名单内时整批拒绝，返回400 `INVALID_RULE`。
#[utoipa::path(
    put,
    path = "/api/v1/routing/rules",
    request_body = Vec<RoutingRule>,
    responses(
        (status = 200, description = "替换后的路由规则", body = Vec<RoutingRule>),
        (status = 400, description = "无效的路由规则", body = crate::error::ErrorResponse),
    ),
    tag = "routing"
)]
pub async fn set_routing_rules(
    State(state): State<AppState>,
    payload: Result<Json<Vec<RoutingRule>>, JsonRejection>,
) -> Result<Json<Vec<RoutingRule>>, RouterError> {
    let Json(rules) = payload.map_err(rule_rejection)?;
    info!("收到路由规则替换请求, 共 {} 条", rules.len());
    state.api.set_routing_rules(rules).await;
    Ok(Json(state.api.get_routing_rules().await))
}

#[utoipa::path(
    get,
    path = "/api/v1/settings",
    responses((status = 200, description = "路由设置", body = RouterSettings)),
    tag = "routing"
)]
pub async fn get_settings(State(state): State<AppState>) -> Json<RouterSettings> {
    Json(state.api.get_settings().await)
}

/// 部分更新路由设置
#[utoipa::path(
    patch,
    path = "/api/v1/settings",
    request_body = SettingsUpdate,
    responses(
        (status = 200, description = "更新后的路由设置", body = RouterSettings),
        (status = 400, description = "请求体格式错误", body = crate::error::ErrorResponse),
    ),
    tag = "routing"
)]
pub async fn update_settings(
    State(state): State<AppState>,
    ApiJson(update): ApiJson<SettingsUpdate>,
) -> Json<RouterSettings> {
    Json(state.api.update_settings(update).await)
}
