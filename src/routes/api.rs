use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::ServerConfig;
use crate::error::ErrorResponse;
use crate::handlers::api::{
    chat_completion::handle_chat_completion,
    health::check_all_providers_health,
    provider::{
        get_model_capabilities, get_provider, get_provider_health, list_providers,
        register_provider, remove_provider, update_provider, RegisterProviderRequest,
    },
    routing::{get_routing_rules, get_settings, set_routing_rules, update_settings},
    usage::get_usage_statistics,
};
use crate::models::{
    ApiProvider, ApiType, BreakdownStats, ChatRequest, ChatResponse, ConditionOperator,
    GenerationParameters, HealthCheckResult, HealthStatus, Message, MessageRole, ModelCapability,
    ModelInfo, ProviderStatus, ProviderUpdate, RouterSettings, RoutingRule, RuleAction,
    RuleCondition, SettingsUpdate, TimelineBucket, TokenUsage, UsageStatistics,
};
use crate::services::UnifiedApi;

const MAX_BODY_BYTES: usize = 1024 * 1024;

/// API文档
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::api::chat_completion::handle_chat_completion,
        crate::handlers::api::provider::register_provider,
        crate::handlers::api::provider::list_providers,
        crate::handlers::api::provider::get_provider,
        crate::handlers::api::provider::update_provider,
        crate::handlers::api::provider::remove_provider,
        crate::handlers::api::provider::get_provider_health,
        crate::handlers::api::provider::get_model_capabilities,
        crate::handlers::api::routing::get_routing_rules,
        crate::handlers::api::routing::set_routing_rules,
        crate::handlers::api::routing::get_settings,
        crate::handlers::api::routing::update_settings,
        crate::handlers::api::health::check_all_providers_health,
        crate::handlers::api::usage::get_usage_statistics
    ),
    components(
        schemas(
            ChatRequest,
            ChatResponse,
            Message,
            MessageRole,
            GenerationParameters,
            TokenUsage,
            ErrorResponse,
            ApiProvider,
            ApiType,
            ProviderStatus,
            HealthStatus,
            ModelInfo,
            ModelCapability,
            ProviderUpdate,
            RegisterProviderRequest,
            RoutingRule,
            RuleCondition,
            RuleAction,
            ConditionOperator,
            RouterSettings,
            SettingsUpdate,
            HealthCheckResult,
            UsageStatistics,
            BreakdownStats,
            TimelineBucket
        )
    ),
    tags(
        (name = "chat", description = "聊天相关的API"),
        (name = "providers", description = "API提供商管理"),
        (name = "routing", description = "路由规则与全局设置"),
        (name = "health", description = "提供商健康检查"),
        (name = "usage", description = "使用量统计")
    )
)]
pub struct ApiDoc;

// 应用程序状态
#[derive(Clone)]
pub struct AppState {
    pub api: Arc<UnifiedApi>,
}

// 配置API路由
pub fn app_routes(state: AppState) -> Router {
    Router::new()
        .route("/v1/chat/completions", post(handle_chat_completion))
        .route("/v1/providers", post(register_provider).get(list_providers))
        .route(
            "/v1/providers/:id",
            get(get_provider).patch(update_provider).delete(remove_provider),
        )
        .route("/v1/providers/:id/health", get(get_provider_health))
        .route(
            "/v1/providers/:id/models/:model/capabilities",
            get(get_model_capabilities),
        )
        .route("/v1/routing/rules", get(get_routing_rules).put(set_routing_rules))
        .route("/v1/settings", get(get_settings).patch(update_settings))
        .route("/v1/health/providers", get(check_all_providers_health))
        .route("/v1/usage", get(get_usage_statistics))
        .with_state(state)
}

/// 完整的HTTP应用：API路由、Swagger文档和中间件
pub fn build_app(api: Arc<UnifiedApi>, server: &ServerConfig) -> Router {
    let origins: Vec<HeaderValue> = server
        .cors_allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any);

    // cors 和 timeout 需要能构造默认响应体，放在最内层
    let middleware = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(cors)
        .layer(TimeoutLayer::new(Duration::from_millis(server.request_timeout_ms)));

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .nest("/api", app_routes(AppState { api }))
        .route("/health", get(health_check))
        .layer(middleware)
}

// 简单的存活检查
async fn health_check() -> &'static str {
    "OK"
}
