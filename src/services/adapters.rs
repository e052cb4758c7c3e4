//! 提供商适配器
//!
//! 每种传输方式一个实现，通过 [`AdapterRegistry`] 按 API 类型查找。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::config::ApiProviderConfig;
use crate::error::{Result, RouterError};
use crate::models::{ApiProvider, ApiType, ChatRequest, ChatResponse, Message, MessageRole, TokenUsage};

const DEFAULT_MAX_TOKENS: u32 = 1024;
const DEFAULT_TEMPERATURE: f32 = 0.7;
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// 把统一请求转换为厂商调用，并把结果归一化为 [`ChatResponse`]
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    async fn call(&self, provider: &ApiProvider, request: &ChatRequest) -> Result<ChatResponse>;
}

/// 按API类型查找适配器
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<ApiType, Arc<dyn ProviderAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 所有内置类型都使用模拟适配器
    pub fn simulated(latency: Duration) -> Self {
        let adapter: Arc<dyn ProviderAdapter> = Arc::new(SimulatedAdapter::new(latency));
        let mut registry = Self::new();
        for api_type in ApiType::BUILTIN {
            registry.register(api_type, adapter.clone());
        }
        registry
    }

    /// 所有内置类型都使用真实的HTTP传输
    pub fn http(
        client: Client,
        credentials: HashMap<String, ApiProviderConfig>,
        azure_api_version: impl Into<String>,
    ) -> Self {
        let credentials = Arc::new(credentials);
        let openai: Arc<dyn ProviderAdapter> = Arc::new(
            OpenAiCompatibleAdapter::new(client.clone(), credentials.clone())
                .with_azure_api_version(azure_api_version),
        );
        let anthropic: Arc<dyn ProviderAdapter> = Arc::new(AnthropicAdapter::new(client, credentials));

        let mut registry = Self::new();
        for api_type in ApiType::BUILTIN {
            let adapter = match api_type {
                ApiType::Anthropic => anthropic.clone(),
                _ => openai.clone(),
            };
            registry.register(api_type, adapter);
        }
        registry
    }

    pub fn register(&mut self, api_type: ApiType, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.insert(api_type, adapter);
    }

    pub fn get(&self, api_type: &ApiType) -> Result<Arc<dyn ProviderAdapter>> {
        self.adapters
            .get(api_type)
            .cloned()
            .ok_or_else(|| RouterError::UnsupportedApiType(api_type.to_string()))
    }

    pub fn supports(&self, api_type: &ApiType) -> bool {
        self.adapters.contains_key(api_type)
    }
}

/// 按4字符约1个token估算
pub fn estimate_tokens(text: &str) -> u32 {
    let chars = text.chars().count() as u32;
    chars.div_ceil(4).max(1)
}

fn resolve_model(provider: &ApiProvider, request: &ChatRequest) -> String {
    request
        .model
        .clone()
        .unwrap_or_else(|| provider.default_model.clone())
}

/// 模拟适配器：等待固定延迟后返回包含最后一条用户消息的合成回复
#[derive(Debug, Clone)]
pub struct SimulatedAdapter {
    latency: Duration,
}

impl SimulatedAdapter {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

#[async_trait]
impl ProviderAdapter for SimulatedAdapter {
    async fn call(&self, provider: &ApiProvider, request: &ChatRequest) -> Result<ChatResponse> {
        let started = Instant::now();
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let model = resolve_model(provider, request);
        let prompt = request.last_user_message().unwrap_or_default();
        let content = format!("来自 {} ({}) 的模拟响应: {}", provider.name, model, prompt);

        let prompt_tokens = request
            .messages
            .iter()
            .map(|m| estimate_tokens(&m.content))
            .sum::<u32>()
            .max(1);
        let usage = TokenUsage::new(prompt_tokens, estimate_tokens(&content));

        Ok(ChatResponse {
            content,
            model,
            provider: provider.id.clone(),
            usage,
            latency_ms: started.elapsed().as_millis() as u64,
        })
    }
}

fn endpoint_for(
    provider: &ApiProvider,
    credentials: &HashMap<String, ApiProviderConfig>,
) -> Result<(String, Option<String>)> {
    let fallback = credentials.get(provider.api_type.as_str());
    let base_url = provider
        .base_url
        .clone()
        .or_else(|| fallback.map(|c| c.base_url.clone()))
        .ok_or_else(|| {
            RouterError::provider_call(&provider.id, "MISSING_ENDPOINT", "提供商未配置base_url")
        })?;
    let api_key = provider
        .api_key
        .clone()
        .or_else(|| fallback.map(|c| c.api_key.clone()));
    Ok((base_url.trim_end_matches('/').to_string(), api_key))
}

fn transport_error(provider: &ApiProvider, err: reqwest::Error) -> RouterError {
    let code = if err.is_timeout() { "TIMEOUT" } else { "TRANSPORT" };
    error!("请求发送失败: provider={}, 错误: {}", provider.id, err);
    RouterError::provider_call(&provider.id, code, err.to_string())
}

async fn read_success_body(provider: &ApiProvider, response: reqwest::Response) -> Result<String> {
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| transport_error(provider, e))?;
    if !status.is_success() {
        error!(
            "API调用失败\n状态码: {}\n提供商: {}\n错误响应: {}",
            status, provider.id, text
        );
        return Err(RouterError::provider_call(
            &provider.id,
            format!("HTTP_{}", status.as_u16()),
            format!("API调用失败，状态码: {}，错误: {}", status, text),
        ));
    }
    Ok(text)
}

fn parse_body<T: for<'de> Deserialize<'de>>(provider: &ApiProvider, text: &str) -> Result<T> {
    serde_json::from_str(text).map_err(|e| {
        error!("解析响应失败: {}\n原始响应: {}", e, text);
        RouterError::provider_call(&provider.id, "INVALID_RESPONSE", format!("解析响应失败: {}", e))
    })
}

// OpenAI兼容格式的请求
#[derive(Debug, Clone, Serialize)]
struct OpenAiRequest<'a> {
    model: String,
    messages: &'a [Message],
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

// OpenAI兼容格式的响应
#[derive(Debug, Clone, Deserialize)]
struct OpenAiResponse {
    model: String,
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenAiMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

/// OpenAI兼容的 `/chat/completions` 传输（OpenAI、DeepSeek、Mistral、Azure、Google兼容端点）
#[derive(Clone)]
pub struct OpenAiCompatibleAdapter {
    client: Client,
    credentials: Arc<HashMap<String, ApiProviderConfig>>,
    azure_api_version: String,
}

/// Azure OpenAI 要求每个请求携带 `api-version` 查询参数
pub const DEFAULT_AZURE_API_VERSION: &str = "2024-02-01";

impl OpenAiCompatibleAdapter {
    pub fn new(client: Client, credentials: Arc<HashMap<String, ApiProviderConfig>>) -> Self {
        Self {
            client,
            credentials,
            azure_api_version: DEFAULT_AZURE_API_VERSION.to_string(),
        }
    }

    pub fn with_azure_api_version(mut self, version: impl Into<String>) -> Self {
        self.azure_api_version = version.into();
        self
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiCompatibleAdapter {
    async fn call(&self, provider: &ApiProvider, request: &ChatRequest) -> Result<ChatResponse> {
        let (base_url, api_key) = endpoint_for(provider, &self.credentials)?;
        let url = format!("{}/chat/completions", base_url);
        let params = request.parameters.unwrap_or_default();
        let body = OpenAiRequest {
            model: resolve_model(provider, request),
            messages: &request.messages,
            max_tokens: params.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: params.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            stream: false,
        };

        info!("发送请求到 {}, 提供商: {}, 模型: {}", url, provider.id, body.model);

        let mut builder = self.client.post(&url).json(&body);
        if provider.api_type == ApiType::Azure {
            builder = builder.query(&[("api-version", self.azure_api_version.as_str())]);
        }
        if let Some(key) = api_key.as_deref() {
            builder = match provider.api_type {
                ApiType::Azure => builder.header("api-key", key),
                _ => builder.bearer_auth(key),
            };
        }

        let started = Instant::now();
        let response = builder.send().await.map_err(|e| transport_error(provider, e))?;
        let text = read_success_body(provider, response).await?;
        let parsed: OpenAiResponse = parse_body(provider, &text)?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();
        let usage = parsed
            .usage
            .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens))
            .unwrap_or_default();

        Ok(ChatResponse {
            content,
            model: parsed.model,
            provider: provider.id.clone(),
            usage,
            latency_ms: started.elapsed().as_millis() as u64,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
struct AnthropicRequest<'a> {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<AnthropicMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Clone, Serialize)]
struct AnthropicMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
struct AnthropicResponse {
    model: String,
    content: Vec<AnthropicContent>,
    usage: AnthropicUsage,
}

#[derive(Debug, Clone, Deserialize)]
struct AnthropicContent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

/// Anthropic `/messages` 传输
#[derive(Clone)]
pub struct AnthropicAdapter {
    client: Client,
    credentials: Arc<HashMap<String, ApiProviderConfig>>,
}

impl AnthropicAdapter {
    pub fn new(client: Client, credentials: Arc<HashMap<String, ApiProviderConfig>>) -> Self {
        Self { client, credentials }
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    async fn call(&self, provider: &ApiProvider, request: &ChatRequest) -> Result<ChatResponse> {
        let (base_url, api_key) = endpoint_for(provider, &self.credentials)?;
        let url = format!("{}/messages", base_url);
        let params = request.parameters.unwrap_or_default();

        // 系统消息单独传递
        let messages = request
            .messages
            .iter()
            .filter_map(|m| match m.role {
                MessageRole::User => Some(AnthropicMessage { role: "user", content: &m.content }),
                MessageRole::Assistant => Some(AnthropicMessage { role: "assistant", content: &m.content }),
                MessageRole::System => None,
            })
            .collect();
        let body = AnthropicRequest {
            model: resolve_model(provider, request),
            max_tokens: params.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            system: request.system_message(),
            messages,
            temperature: params.temperature.unwrap_or(DEFAULT_TEMPERATURE),
        };

        info!("发送请求到 {}, 提供商: {}, 模型: {}", url, provider.id, body.model);

        let mut builder = self
            .client
            .post(&url)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body);
        if let Some(key) = api_key.as_deref() {
            builder = builder.header("x-api-key", key);
        }

        let started = Instant::now();
        let response = builder.send().await.map_err(|e| transport_error(provider, e))?;
        let text = read_success_body(provider, response).await?;
        let parsed: AnthropicResponse = parse_body(provider, &text)?;

        let content = parsed
            .content
            .into_iter()
            .filter(|c| c.kind == "text")
            .filter_map(|c| c.text)
            .collect::<Vec<_>>()
            .join("");

        Ok(ChatResponse {
            content,
            model: parsed.model,
            provider: provider.id.clone(),
            usage: TokenUsage::new(parsed.usage.input_tokens, parsed.usage.output_tokens),
            latency_ms: started.elapsed().as_millis() as u64,
        })
    }
}
