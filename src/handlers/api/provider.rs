use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{info, warn};
use utoipa::ToSchema;
use validator::Validate;

use crate::error::RouterError;
use crate::handlers::api::extract::ApiJson;
use crate::models::{
    ApiProvider, ApiType, HealthCheckResult, HealthStatus, ModelCapability, ModelInfo,
    ProviderStatus, ProviderUpdate,
};
use crate::routes::api::AppState;

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct RegisterProviderRequest {
    /// 提供商ID，已存在时覆盖原记录
    #[validate(length(min = 1, message = "提供商ID不能为空"))]
    pub id: String,
    /// 提供商名称（可选，默认与ID相同）
    #[serde(default)]
    pub name: Option<String>,
    /// API类型（openai/anthropic/google/deepseek/mistral/azure）
    pub api_type: ApiType,
    /// 默认模型
    #[validate(length(min = 1, message = "默认模型不能为空"))]
    pub default_model: String,
    /// 支持的模型列表
    #[serde(default)]
    pub models: Vec<ModelInfo>,
    /// 每token成本
    #[validate(range(min = 0.0, message = "成本不能为负数"))]
    pub cost_per_token: f64,
    /// 运行状态（可选，默认active）
    #[serde(default)]
    pub status: Option<ProviderStatus>,
    /// 健康状态（可选，默认healthy）
    #[serde(default)]
    pub health_status: Option<HealthStatus>,
    /// 最后一次健康检查时间（可选）
    #[serde(default)]
    pub last_health_check: Option<DateTime<Utc>>,
    /// 基础URL（可选）
    #[serde(default)]
    #[validate(url(message = "基础URL格式不正确"))]
    pub base_url: Option<String>,
    /// API密钥（可选）
    #[serde(default)]
    pub api_key: Option<String>,
}

impl RegisterProviderRequest {
    fn into_provider(self) -> ApiProvider {
        let name = self.name.unwrap_or_else(|| self.id.clone());
        ApiProvider {
            id: self.id,
            name,
            api_type: self.api_type,
            status: self.status.unwrap_or(ProviderStatus::Active),
            health_status: self.health_status.unwrap_or(HealthStatus::Healthy),
            default_model: self.default_model,
            models: self.models,
            cost_per_token: self.cost_per_token,
            base_url: self.base_url,
            api_key: self.api_key,
            last_health_check: self.last_health_check,
        }
    }
}

fn not_found(id: &str) -> Response {
    RouterError::ProviderNotFound(id.to_string()).into_response()
}

/// 注册API提供商
#[utoipa::path(
    post,
    path = "/api/v1/providers",
    request_body = RegisterProviderRequest,
    responses(
        (status = 201, description = "成功注册API提供商", body = ApiProvider),
        (status = 400, description = "请求参数错误", body = crate::error::ErrorResponse),
    ),
    tag = "providers"
)]
pub async fn register_provider(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<RegisterProviderRequest>,
) -> Response {
    if let Err(e) = request.validate() {
        warn!("注册提供商参数错误: {}", e);
        return RouterError::from(e).into_response();
    }

    let provider = request.into_provider();
    info!("注册API提供商: id={}, 类型: {}", provider.id, provider.api_type);
    state.api.register_provider(provider.clone()).await;

    (StatusCode::CREATED, Json(provider)).into_response()
}

/// 获取所有API提供商（按注册顺序）
#[utoipa::path(
    get,
    path = "/api/v1/providers",
    responses(
        (status = 200, description = "提供商列表", body = Vec<ApiProvider>),
    ),
    tag = "providers"
)]
pub async fn list_providers(State(state): State<AppState>) -> Json<Vec<ApiProvider>> {
    Json(state.api.get_providers().await)
}

/// 获取单个API提供商
#[utoipa::path(
    get,
    path = "/api/v1/providers/{id}",
    params(("id" = String, Path, description = "提供商ID")),
    responses(
        (status = 200, description = "提供商详情", body = ApiProvider),
        (status = 404, description = "提供商不存在", body = crate::error::ErrorResponse),
    ),
    tag = "providers"
)]
pub async fn get_provider(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.api.get_provider(&id).await {
        Some(provider) => Json(provider).into_response(),
        None => not_found(&id),
    }
}

/// 部分更新API提供商
#[utoipa::path(
    patch,
    path = "/api/v1/providers/{id}",
    params(("id" = String, Path, description = "提供商ID")),
    request_body = ProviderUpdate,
    responses(
        (status = 200, description = "更新后的提供商", body = ApiProvider),
        (status = 400, description = "请求参数错误", body = crate::error::ErrorResponse),
        (status = 404, description = "提供商不存在", body = crate::error::ErrorResponse),
    ),
    tag = "providers"
)]
pub async fn update_provider(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(update): ApiJson<ProviderUpdate>,
) -> Response {
    if let Err(e) = update.validate() {
        warn!("更新提供商参数错误: id={}, {}", id, e);
        return RouterError::from(e).into_response();
    }
    if !state.api.update_provider(&id, update).await {
        warn!("更新的提供商不存在: {}", id);
        return not_found(&id);
    }
    info!("提供商已更新: {}", id);
    get_provider(State(state), Path(id)).await
}

/// 删除API提供商
#[utoipa::path(
    delete,
    path = "/api/v1/providers/{id}",
    params(("id" = String, Path, description = "提供商ID")),
    responses(
        (status = 204, description = "删除成功"),
        (status = 404, description = "提供商不存在", body = crate::error::ErrorResponse),
    ),
    tag = "providers"
)]
pub async fn remove_provider(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    if state.api.remove_provider(&id).await {
        info!("提供商已删除: {}", id);
        StatusCode::NO_CONTENT.into_response()
    } else {
        not_found(&id)
    }
}

/// 立即检查单个提供商的健康状态
#[utoipa::path(
    get,
    path = "/api/v1/providers/{id}/health",
    params(("id" = String, Path, description = "提供商ID")),
    responses(
        (status = 200, description = "健康检查结果", body = HealthCheckResult),
        (status = 404, description = "提供商不存在", body = crate::error::ErrorResponse),
    ),
    tag = "health"
)]
pub async fn get_provider_health(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<HealthCheckResult>, RouterError> {
    Ok(Json(state.api.check_provider_health(&id).await?))
}

/// 查询模型能力
#[utoipa::path(
    get,
    path = "/api/v1/providers/{id}/models/{model}/capabilities",
    params(
        ("id" = String, Path, description = "提供商ID"),
        ("model" = String, Path, description = "模型ID"),
    ),
    responses(
        (status = 200, description = "能力标签，未知提供商或模型时为空", body = Vec<ModelCapability>),
    ),
    tag = "providers"
)]
pub async fn get_model_capabilities(
    State(state): State<AppState>,
    Path((id, model)): Path<(String, String)>,
) -> Json<Vec<ModelCapability>> {
    Json(state.api.get_model_capabilities(&id, &model).await)
}
