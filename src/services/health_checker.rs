use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::{Client, StatusCode};
use tracing::{error, info, warn};

use crate::config::{ApiProviderConfig, HealthCheckConfig};
use crate::models::{ApiProvider, ApiType, HealthCheckResult, HealthStatus};

/// 对提供商端点做真实探测，按延迟和错误分类为三种健康状态
#[derive(Clone)]
pub struct HealthChecker {
    client: Client,
    timeout: Duration,
    degraded_threshold: Duration,
    credentials: Arc<HashMap<String, ApiProviderConfig>>,
}

impl HealthChecker {
    pub fn new(client: Client, config: &HealthCheckConfig, credentials: HashMap<String, ApiProviderConfig>) -> Self {
        Self {
            client,
            timeout: Duration::from_millis(config.timeout),
            degraded_threshold: Duration::from_millis(config.degraded_threshold_ms),
            credentials: Arc::new(credentials),
        }
    }

    /// 检查单个提供商
    pub async fn check(&self, provider: &ApiProvider) -> HealthCheckResult {
        let fallback = self.credentials.get(provider.api_type.as_str());
        let Some(base_url) = provider
            .base_url
            .clone()
            .or_else(|| fallback.map(|c| c.base_url.clone()))
        else {
            // 模拟部署没有端点，沿用当前状态
            return HealthCheckResult::new(
                &provider.id,
                provider.health_status,
                0,
                "未配置端点，跳过探测",
                None,
            );
        };
        let api_key = provider.api_key.clone().or_else(|| fallback.map(|c| c.api_key.clone()));

        let url = format!("{}/models", base_url.trim_end_matches('/'));
        info!("探测提供商健康状态, id={}, URL: {}", provider.id, url);

        let mut request = self.client.get(&url).timeout(self.timeout);
        if let Some(key) = api_key.as_deref() {
            request = match provider.api_type {
                ApiType::Anthropic => request.header("x-api-key", key).header("anthropic-version", "2023-06-01"),
                ApiType::Azure => request.header("api-key", key),
                _ => request.bearer_auth(key),
            };
        }

        let started = Instant::now();
        let outcome = request.send().await;
        let elapsed = started.elapsed();
        let latency_ms = elapsed.as_millis() as u64;

        let (status, message, http_status) = match outcome {
            Ok(response) => {
                let code = response.status();
                let (status, message) = self.classify(code, elapsed);
                (status, message, Some(code.as_u16()))
            }
            Err(e) => {
                error!("提供商 {} 探测失败: {}", provider.id, e);
                let message = if e.is_timeout() {
                    format!("探测超时({}ms)", self.timeout.as_millis())
                } else {
                    format!("探测失败: {}", e)
                };
                (HealthStatus::Unhealthy, message, None)
            }
        };

        if status != HealthStatus::Healthy {
            warn!("提供商 {} 健康状态: {:?}, {}", provider.id, status, message);
        }

        HealthCheckResult::new(&provider.id, status, latency_ms, message, http_status)
    }

    fn classify(&self, code: StatusCode, elapsed: Duration) -> (HealthStatus, String) {
        if code.is_server_error() || code == StatusCode::UNAUTHORIZED || code == StatusCode::FORBIDDEN {
            return (HealthStatus::Unhealthy, format!("HTTP {}", code));
        }
        if code == StatusCode::TOO_MANY_REQUESTS {
            return (HealthStatus::Degraded, "触发速率限制".to_string());
        }
        if !code.is_success() {
            return (HealthStatus::Degraded, format!("端点可达但返回 HTTP {}", code));
        }
        if elapsed > self.degraded_threshold {
            return (
                HealthStatus::Degraded,
                format!("响应较慢: {}ms", elapsed.as_millis()),
            );
        }
        (HealthStatus::Healthy, "OK".to_string())
    }
}
