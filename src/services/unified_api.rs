//! 统一API入口
//!
//! 持有提供商注册表、路由规则和全局设置，负责选择提供商、调用适配器、
//! 记录遥测事件，并在显式指定的提供商失败时做一次故障转移重试。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use reqwest::Client;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::config::HealthCheckConfig;
use crate::error::{Result, RouterError};
use crate::models::{
    ApiProvider, ChatRequest, ChatResponse, ErrorEvent, GroupBy, HealthCheckResult,
    ModelCapability, ProviderUpdate, RouterSettings, RoutingRule, SettingsUpdate, UsageEvent,
    UsageStatistics, ENDPOINT_CHAT,
};
use crate::services::adapters::AdapterRegistry;
use crate::services::health_checker::HealthChecker;
use crate::services::provider_registry::ProviderRegistry;
use crate::services::router::select_provider;
use crate::services::telemetry::TelemetrySink;
use crate::services::usage_stats::compute_statistics;

// 路由状态：注册表、规则、设置
#[derive(Debug, Clone, Default)]
pub struct RouterState {
    pub providers: ProviderRegistry,
    pub rules: Vec<RoutingRule>,
    pub settings: RouterSettings,
}

pub struct UnifiedApi {
    state: RwLock<RouterState>,
    adapters: AdapterRegistry,
    telemetry: Arc<dyn TelemetrySink>,
    health_checker: HealthChecker,
}

impl UnifiedApi {
    pub fn new(adapters: AdapterRegistry, telemetry: Arc<dyn TelemetrySink>) -> Self {
        Self {
            state: RwLock::new(RouterState::default()),
            adapters,
            telemetry,
            health_checker: HealthChecker::new(Client::new(), &HealthCheckConfig::default(), HashMap::new()),
        }
    }

    pub fn with_state(mut self, state: RouterState) -> Self {
        self.state = RwLock::new(state);
        self
    }

    pub fn with_health_checker(mut self, health_checker: HealthChecker) -> Self {
        self.health_checker = health_checker;
        self
    }

    /// 发送聊天请求
    ///
    /// 显式指定的提供商调用失败且启用了故障转移时，清除 `provider_id`
    /// 重新走一次完整的选择流程，调用方拿到的是这次重试的结果。
    pub async fn send_chat_message(&self, request: ChatRequest) -> Result<ChatResponse> {
        match self.dispatch(&request).await {
            Ok(response) => Ok(response),
            Err(err) => {
                let failover = self.state.read().await.settings.failover;
                if failover && request.provider_id.is_some() {
                    warn!(
                        "提供商 {} 调用失败，清除显式指定后重试一次: {}",
                        request.provider_id.as_deref().unwrap_or_default(),
                        err
                    );
                    let retry = ChatRequest { provider_id: None, ..request };
                    return self.dispatch(&retry).await;
                }
                Err(err)
            }
        }
    }

    async fn dispatch(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let selected = {
            let state = self.state.read().await;
            select_provider(state.providers.providers(), &state.rules, &state.settings, request).cloned()
        };
        let provider = match selected {
            Ok(provider) => provider,
            Err(err) => {
                error!("选择提供商失败: {}", err);
                let provider_id = request.provider_id.as_deref().unwrap_or("unknown");
                self.log_error(provider_id, &err).await;
                return Err(err);
            }
        };

        info!(
            "收到聊天请求, 提供商: {}, 模型: {}, 消息数: {}",
            provider.id,
            request.model.as_deref().unwrap_or(&provider.default_model),
            request.messages.len()
        );

        let started = Instant::now();
        let result = match self.adapters.get(&provider.api_type) {
            Ok(adapter) => adapter.call(&provider, request).await,
            Err(err) => Err(err),
        };

        match result {
            Ok(mut response) => {
                let latency_ms = started.elapsed().as_millis() as u64;
                // 以实际调用的提供商为准
                response.provider = provider.id.clone();
                response.latency_ms = latency_ms;

                let event = UsageEvent::new(
                    &provider.id,
                    &response.model,
                    ENDPOINT_CHAT,
                    response.usage,
                    latency_ms,
                    provider.cost_per_token,
                );
                if let Err(e) = self.telemetry.record_usage(event).await {
                    warn!("记录调用事件失败: {}", e);
                }

                info!(
                    "请求完成, 提供商: {}, 总tokens: {}, 耗时: {}ms",
                    provider.id, response.usage.total_tokens, latency_ms
                );
                Ok(response)
            }
            Err(err) => {
                error!("使用提供商 {} 调用失败: {}", provider.id, err);
                self.log_error(&provider.id, &err).await;
                Err(err)
            }
        }
    }

    async fn log_error(&self, provider_id: &str, err: &RouterError) {
        let event = ErrorEvent::new(provider_id, ENDPOINT_CHAT, err.code(), err.to_string());
        if let Err(e) = self.telemetry.record_error(event).await {
            warn!("记录错误事件失败: {}", e);
        }
    }

    pub async fn register_provider(&self, provider: ApiProvider) {
        self.state.write().await.providers.register(provider);
    }

    /// 未知ID时不做任何事，返回false
    pub async fn update_provider(&self, id: &str, update: ProviderUpdate) -> bool {
        self.state.write().await.providers.update(id, update)
    }

    /// 未知ID时不做任何事，返回false
    pub async fn remove_provider(&self, id: &str) -> bool {
        self.state.write().await.providers.remove(id)
    }

    pub async fn get_providers(&self) -> Vec<ApiProvider> {
        self.state.read().await.providers.providers().to_vec()
    }

    pub async fn get_provider(&self, id: &str) -> Option<ApiProvider> {
        self.state.read().await.providers.get(id).cloned()
    }

    /// 整体替换路由规则
    pub async fn set_routing_rules(&self, rules: Vec<RoutingRule>) {
        info!("更新路由规则, 共 {} 条", rules.len());
        self.state.write().await.rules = rules;
    }

    pub async fn get_routing_rules(&self) -> Vec<RoutingRule> {
        self.state.read().await.rules.clone()
    }

    pub async fn update_settings(&self, update: SettingsUpdate) -> RouterSettings {
        let mut state = self.state.write().await;
        update.apply(&mut state.settings);
        info!("路由设置已更新: {:?}", state.settings);
        state.settings
    }

    pub async fn get_settings(&self) -> RouterSettings {
        self.state.read().await.settings
    }

    /// 检查单个提供商并写回健康状态
    pub async fn check_provider_health(&self, id: &str) -> Result<HealthCheckResult> {
        let provider = self
            .get_provider(id)
            .await
            .ok_or_else(|| RouterError::ProviderNotFound(id.to_string()))?;

        let result = self.health_checker.check(&provider).await;
        self.state
            .write()
            .await
            .providers
            .update_health(id, result.status, result.checked_at);
        Ok(result)
    }

    /// 并发检查所有提供商
    pub async fn check_all_providers_health(&self) -> HashMap<String, HealthCheckResult> {
        let providers = self.get_providers().await;
        let results = join_all(providers.iter().map(|p| self.health_checker.check(p))).await;

        let mut state = self.state.write().await;
        results
            .into_iter()
            .map(|result| {
                state
                    .providers
                    .update_health(&result.provider_id, result.status, result.checked_at);
                (result.provider_id.clone(), result)
            })
            .collect()
    }

    /// 模型的能力标签，提供商或模型未知时为空
    pub async fn get_model_capabilities(&self, provider_id: &str, model_id: &str) -> Vec<ModelCapability> {
        let state = self.state.read().await;
        state
            .providers
            .get(provider_id)
            .and_then(|p| p.find_model(model_id))
            .map(|m| m.capabilities.iter().copied().collect())
            .unwrap_or_default()
    }

    pub async fn get_usage_statistics(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        group_by: GroupBy,
    ) -> Result<UsageStatistics> {
        let events = self.telemetry.events_between(start, end).await.map_err(|e| {
            error!("查询遥测事件失败: {}", e);
            RouterError::Telemetry(e)
        })?;
        Ok(compute_statistics(&events, group_by))
    }
}

/// 定期检查所有提供商的健康状态
pub fn spawn_health_monitor(api: Arc<UnifiedApi>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            info!("开始定期健康检查...");
            let results = api.check_all_providers_health().await;
            let unhealthy = results.values().filter(|r| r.is_unhealthy()).count();
            info!("健康检查完成, 共 {} 个提供商, 不健康 {} 个", results.len(), unhealthy);
        }
    })
}
