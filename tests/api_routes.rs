use std::sync::Arc;
use std::time::Duration;

use api_router::config::{LogFormat, ServerConfig};
use api_router::models::{ApiProvider, ApiType, RouterSettings, UsageStatistics};
use api_router::routes::build_app;
use api_router::services::{AdapterRegistry, InMemoryTelemetry, ProviderRegistry, RouterState, UnifiedApi};
use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tower::ServiceExt;

fn server_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        log_level: "debug".to_string(),
        log_format: LogFormat::Pretty,
        cors_allowed_origins: vec!["http://localhost:3000".to_string()],
        request_timeout_ms: 5_000,
    }
}

fn app_with(providers: Vec<ApiProvider>) -> Router {
    let state = RouterState {
        providers: ProviderRegistry::new(providers),
        rules: Vec::new(),
        settings: RouterSettings { cost_optimization: true, ..Default::default() },
    };
    let api = UnifiedApi::new(
        AdapterRegistry::simulated(Duration::ZERO),
        Arc::new(InMemoryTelemetry::new()),
    )
    .with_state(state);
    build_app(Arc::new(api), &server_config())
}

fn two_providers() -> Vec<ApiProvider> {
    vec![
        ApiProvider::new("a", "A", ApiType::OpenAI, "gpt-4", 0.01),
        ApiProvider::new("b", "B", ApiType::Anthropic, "claude-3", 0.02),
    ]
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, value)
}

#[tokio::test]
async fn chat_completion_routes_to_cheapest() {
    let app = app_with(two_providers());

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/chat/completions",
        Some(json!({"messages": [{"role": "user", "content": "ping"}]})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["provider"], "a");
    assert_eq!(body["model"], "gpt-4");
}

#[tokio::test]
async fn chat_without_providers_is_service_unavailable() {
    let app = app_with(Vec::new());

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/chat/completions",
        Some(json!({"messages": [{"role": "user", "content": "ping"}]})),
    )
    .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "NO_AVAILABLE_PROVIDER");
}

#[tokio::test]
async fn provider_crud_lifecycle() {
    let app = app_with(Vec::new());

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/providers",
        Some(json!({
            "id": "ds",
            "api_type": "deepseek",
            "default_model": "deepseek-chat",
            "cost_per_token": 0.000002,
            "api_key": "sk-secret"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["name"], "ds");
    assert!(body.get("api_key").is_none());

    let (status, body) = send(&app, Method::GET, "/api/v1/providers", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().map(Vec::len), Some(1));

    let (status, body) = send(
        &app,
        Method::PATCH,
        "/api/v1/providers/ds",
        Some(json!({"status": "inactive"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "inactive");

    let (status, _) = send(&app, Method::DELETE, "/api/v1/providers/ds", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(&app, Method::GET, "/api/v1/providers/ds", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "PROVIDER_NOT_FOUND");
}

#[tokio::test]
async fn unknown_provider_update_and_delete_are_not_found() {
    let app = app_with(two_providers());

    let (status, _) = send(&app, Method::PATCH, "/api/v1/providers/ghost", Some(json!({"name": "x"}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, Method::DELETE, "/api/v1/providers/ghost", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_registration_is_rejected() {
    let app = app_with(Vec::new());

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/providers",
        Some(json!({
            "id": "bad",
            "api_type": "openai",
            "default_model": "gpt-4",
            "cost_per_token": -0.5
        })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn invalid_update_is_rejected_and_leaves_provider_unchanged() {
    let app = app_with(two_providers());

    let (status, body) = send(
        &app,
        Method::PATCH,
        "/api/v1/providers/a",
        Some(json!({"cost_per_token": -5.0, "name": "cheaper"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let (status, body) = send(&app, Method::PATCH, "/api/v1/providers/a", Some(json!({"base_url": "nope"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let (_, body) = send(&app, Method::GET, "/api/v1/providers/a", None).await;
    assert_eq!(body["cost_per_token"], 0.01);
    assert_eq!(body["name"], "A");
}

#[tokio::test]
async fn registration_keeps_supplied_health_status() {
    let app = app_with(Vec::new());

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/providers",
        Some(json!({
            "id": "sick",
            "api_type": "openai",
            "default_model": "gpt-4",
            "cost_per_token": 0.01,
            "health_status": "unhealthy",
            "last_health_check": "2026-01-02T03:04:05Z"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["health_status"], "unhealthy");

    let (_, body) = send(&app, Method::GET, "/api/v1/providers/sick", None).await;
    assert_eq!(body["health_status"], "unhealthy");
    assert_eq!(body["last_health_check"], "2026-01-02T03:04:05Z");

    // 不健康的唯一提供商不可用
    let (status, _) = send(
        &app,
        Method::POST,
        "/api/v1/chat/completions",
        Some(json!({"messages": [{"role": "user", "content": "ping"}]})),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn rules_replace_routing_for_chat() {
    let app = app_with(two_providers());

    let (status, body) = send(
        &app,
        Method::PUT,
        "/api/v1/routing/rules",
        Some(json!([{
            "id": "claude-for-code",
            "priority": 1,
            "conditions": [{"field": "messages.last_user", "operator": "contains", "value": "code"}],
            "action": {"provider_id": "b"}
        }])),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["enabled"], true);

    let (_, body) = send(
        &app,
        Method::POST,
        "/api/v1/chat/completions",
        Some(json!({"messages": [{"role": "user", "content": "write some code"}]})),
    )
    .await;
    assert_eq!(body["provider"], "b");
}

#[tokio::test]
async fn unknown_rule_field_is_rejected() {
    let app = app_with(two_providers());

    let (status, body) = send(
        &app,
        Method::PUT,
        "/api/v1/routing/rules",
        Some(json!([{
            "id": "typo",
            "priority": 1,
            "conditions": [{"field": "modle", "operator": "equals", "value": "gpt-4"}],
            "action": {"provider_id": "b"}
        }])),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_RULE");
    assert!(body["error"].as_str().is_some_and(|msg| msg.contains("modle")));

    let (_, rules) = send(&app, Method::GET, "/api/v1/routing/rules", None).await;
    assert_eq!(rules, json!([]));
}

#[tokio::test]
async fn malformed_bodies_get_json_errors() {
    let app = app_with(two_providers());

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/chat/completions",
        Some(json!({"messages": "not a list"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_REQUEST");

    let (status, body) = send(
        &app,
        Method::PATCH,
        "/api/v1/settings",
        Some(json!({"failover": "sometimes"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_REQUEST");

    let (status, body) = send(&app, Method::POST, "/api/v1/providers", Some(json!({"id": "x"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_REQUEST");
}

#[tokio::test]
async fn settings_patch_is_partial() {
    let app = app_with(Vec::new());

    let (status, body) = send(&app, Method::PATCH, "/api/v1/settings", Some(json!({"failover": false}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["failover"], false);
    assert_eq!(body["cost_optimization"], true);

    let (_, body) = send(&app, Method::GET, "/api/v1/settings", None).await;
    assert_eq!(body["failover"], false);
}

#[tokio::test]
async fn capabilities_and_health_endpoints() {
    let app = app_with(two_providers());

    let (status, body) = send(&app, Method::GET, "/api/v1/providers/a/models/unknown/capabilities", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));

    let (status, body) = send(&app, Method::GET, "/api/v1/providers/ghost/health", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "PROVIDER_NOT_FOUND");

    let (status, body) = send(&app, Method::GET, "/api/v1/health/providers", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["a"]["status"], "healthy");
    assert_eq!(body["b"]["provider_id"], "b");
}

#[tokio::test]
async fn usage_reflects_completed_calls() {
    let app = app_with(two_providers());
    for _ in 0..2 {
        send(
            &app,
            Method::POST,
            "/api/v1/chat/completions",
            Some(json!({"messages": [{"role": "user", "content": "ping"}]})),
        )
        .await;
    }

    let (status, body) = send(&app, Method::GET, "/api/v1/usage?group_by=hour", None).await;
    assert_eq!(status, StatusCode::OK);

    let stats: UsageStatistics = serde_json::from_value(body).unwrap();
    assert_eq!(stats.total_calls, 2);
    assert_eq!(stats.error_rate, 0.0);
    assert_eq!(stats.by_provider.len(), 1);
    assert_eq!(stats.by_provider[0].key, "a");
}

#[tokio::test]
async fn liveness_probe() {
    let app = app_with(Vec::new());
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
