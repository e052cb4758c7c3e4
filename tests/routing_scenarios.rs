use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use api_router::models::{
    ApiProvider, ApiType, ChatRequest, ChatResponse, ConditionOperator, HealthStatus, Message,
    ProviderUpdate, RequestField, RouterSettings, RoutingRule, RuleCondition, TokenUsage,
};
use api_router::services::{
    AdapterRegistry, InMemoryTelemetry, ProviderAdapter, ProviderRegistry, RouterState, UnifiedApi,
};
use api_router::RouterError;
use async_trait::async_trait;
use pretty_assertions::assert_eq;

fn provider(id: &str, cost: f64) -> ApiProvider {
    ApiProvider::new(id, id, ApiType::OpenAI, "gpt-4", cost)
}

fn hello() -> ChatRequest {
    ChatRequest::new(vec![Message::user("hello")])
}

fn simulated_api(state: RouterState) -> (UnifiedApi, Arc<InMemoryTelemetry>) {
    let telemetry = Arc::new(InMemoryTelemetry::new());
    let api = UnifiedApi::new(AdapterRegistry::simulated(Duration::ZERO), telemetry.clone()).with_state(state);
    (api, telemetry)
}

/// 指定的提供商ID一律失败，其他提供商正常返回，并记录每次调用的请求
#[derive(Default)]
struct FlakyAdapter {
    failing: Vec<String>,
    calls: AtomicUsize,
    seen: Mutex<Vec<ChatRequest>>,
}

impl FlakyAdapter {
    fn failing(ids: &[&str]) -> Self {
        Self {
            failing: ids.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }
}

#[async_trait]
impl ProviderAdapter for FlakyAdapter {
    async fn call(&self, provider: &ApiProvider, request: &ChatRequest) -> api_router::Result<ChatResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(request.clone());
        if self.failing.contains(&provider.id) {
            return Err(RouterError::provider_call(&provider.id, "HTTP_503", "overloaded"));
        }
        Ok(ChatResponse {
            content: format!("ok from {}", provider.id),
            model: provider.default_model.clone(),
            provider: provider.id.clone(),
            usage: TokenUsage::new(3, 4),
            latency_ms: 0,
        })
    }
}

fn flaky_api(adapter: Arc<FlakyAdapter>, providers: Vec<ApiProvider>) -> (UnifiedApi, Arc<InMemoryTelemetry>) {
    let mut adapters = AdapterRegistry::new();
    adapters.register(ApiType::OpenAI, adapter);
    let telemetry = Arc::new(InMemoryTelemetry::new());
    let state = RouterState {
        providers: ProviderRegistry::new(providers),
        rules: Vec::new(),
        settings: RouterSettings { cost_optimization: true, ..Default::default() },
    };
    (UnifiedApi::new(adapters, telemetry.clone()).with_state(state), telemetry)
}

#[tokio::test]
async fn cheapest_provider_is_selected_with_cost_optimization() {
    let (api, telemetry) = simulated_api(RouterState {
        providers: ProviderRegistry::new(vec![provider("a", 0.01), provider("b", 0.02)]),
        rules: Vec::new(),
        settings: RouterSettings { cost_optimization: true, ..Default::default() },
    });

    let response = api.send_chat_message(hello()).await.unwrap();
    assert_eq!(response.provider, "a");
    assert!(response.content.contains("hello"));

    let events = telemetry.snapshot().await;
    assert_eq!(events.usage.len(), 1);
    assert_eq!(events.usage[0].provider_id, "a");
    assert_eq!(events.usage[0].endpoint, "chat");
}

#[tokio::test]
async fn matching_rule_beats_cheaper_provider() {
    let rule = RoutingRule::new("gpt4", 1, "a").with_condition(RuleCondition::new(
        RequestField::Model,
        ConditionOperator::Equals,
        "gpt-4",
    ));
    let (api, _) = simulated_api(RouterState {
        providers: ProviderRegistry::new(vec![provider("a", 0.05), provider("b", 0.01)]),
        rules: vec![rule],
        settings: RouterSettings { cost_optimization: true, ..Default::default() },
    });

    let response = api.send_chat_message(hello().with_model("gpt-4")).await.unwrap();
    assert_eq!(response.provider, "a");

    // 不命中规则时回到成本优化
    let response = api.send_chat_message(hello().with_model("gpt-3.5")).await.unwrap();
    assert_eq!(response.provider, "b");
}

#[tokio::test]
async fn unhealthy_rule_target_falls_back() {
    let rule = RoutingRule::new("primary", 1, "a").with_fallback("b");
    let (api, _) = simulated_api(RouterState {
        providers: ProviderRegistry::new(vec![
            provider("a", 0.01).with_health(HealthStatus::Unhealthy),
            provider("b", 0.02),
        ]),
        rules: vec![rule],
        settings: RouterSettings::default(),
    });

    let response = api.send_chat_message(hello()).await.unwrap();
    assert_eq!(response.provider, "b");
}

#[tokio::test]
async fn empty_registry_has_no_available_provider() {
    let (api, telemetry) = simulated_api(RouterState::default());

    let err = api.send_chat_message(hello()).await.unwrap_err();
    assert!(matches!(err, RouterError::NoAvailableProvider));

    let events = telemetry.snapshot().await;
    assert_eq!(events.errors.len(), 1);
    assert_eq!(events.errors[0].error_code, "NO_AVAILABLE_PROVIDER");
}

#[tokio::test]
async fn failed_explicit_provider_is_retried_once_without_it() {
    let adapter = Arc::new(FlakyAdapter::failing(&["a"]));
    let (api, telemetry) = flaky_api(adapter.clone(), vec![provider("a", 0.05), provider("b", 0.01)]);

    let response = api.send_chat_message(hello().with_provider("a")).await.unwrap();
    assert_eq!(response.provider, "b");
    assert_eq!(adapter.calls.load(Ordering::SeqCst), 2);

    let seen = adapter.seen.lock().unwrap();
    assert_eq!(seen[0].provider_id.as_deref(), Some("a"));
    assert_eq!(seen[1].provider_id, None);
    drop(seen);

    let events = telemetry.snapshot().await;
    assert_eq!(events.errors.len(), 1);
    assert_eq!(events.errors[0].provider_id, "a");
    assert_eq!(events.usage.len(), 1);
    assert_eq!(events.usage[0].provider_id, "b");
}

#[tokio::test]
async fn retry_happens_at_most_once() {
    let adapter = Arc::new(FlakyAdapter::failing(&["a", "b"]));
    let (api, telemetry) = flaky_api(adapter.clone(), vec![provider("a", 0.05), provider("b", 0.01)]);

    let err = api.send_chat_message(hello().with_provider("a")).await.unwrap_err();

    // 调用方拿到的是重试的错误
    assert!(matches!(err, RouterError::ProviderCall { ref provider_id, .. } if provider_id == "b"));
    assert_eq!(adapter.calls.load(Ordering::SeqCst), 2);
    assert_eq!(telemetry.snapshot().await.errors.len(), 2);
}

#[tokio::test]
async fn explicit_provider_overrides_rules_and_cost() {
    let rule = RoutingRule::new("all", 1, "b");
    let (api, _) = simulated_api(RouterState {
        providers: ProviderRegistry::new(vec![provider("a", 0.05), provider("b", 0.01)]),
        rules: vec![rule],
        settings: RouterSettings { cost_optimization: true, ..Default::default() },
    });

    let response = api.send_chat_message(hello().with_provider("a")).await.unwrap();
    assert_eq!(response.provider, "a");
}

#[tokio::test]
async fn registry_snapshots_and_round_trip() {
    let (api, _) = simulated_api(RouterState::default());
    let p = provider("a", 0.01).with_endpoint("https://api.example.com/v1", Some("sk-test".to_string()));
    api.register_provider(p.clone()).await;
    api.register_provider(provider("b", 0.02)).await;

    assert_eq!(api.get_provider("a").await, Some(p));
    assert_eq!(api.get_providers().await, api.get_providers().await);

    let ids: Vec<String> = api.get_providers().await.into_iter().map(|p| p.id).collect();
    assert_eq!(ids, vec!["a", "b"]);
}

#[tokio::test]
async fn unknown_ids_are_ignored_by_update_and_remove() {
    let (api, _) = simulated_api(RouterState {
        providers: ProviderRegistry::new(vec![provider("a", 0.01)]),
        ..Default::default()
    });
    let before = api.get_providers().await;

    assert!(!api.update_provider("ghost", ProviderUpdate { cost_per_token: Some(1.0), ..Default::default() }).await);
    assert!(!api.remove_provider("ghost").await);
    assert_eq!(api.get_providers().await, before);

    assert!(api.remove_provider("a").await);
    assert!(api.get_providers().await.is_empty());
}
