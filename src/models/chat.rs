use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// 消息角色
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// 对话消息
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct Message {
    /// 消息角色（system/user/assistant）
    pub role: MessageRole,
    /// 消息内容
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: MessageRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: MessageRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: MessageRole::Assistant, content: content.into() }
    }
}

/// 生成参数
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct GenerationParameters {
    /// 温度参数
    pub temperature: Option<f32>,
    /// 最大生成token数
    pub max_tokens: Option<u32>,
}

/// 聊天请求
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct ChatRequest {
    /// 对话消息列表
    pub messages: Vec<Message>,
    /// 显式指定的提供商，可选
    #[serde(default)]
    pub provider_id: Option<String>,
    /// 显式指定的模型，可选，默认使用提供商的默认模型
    #[serde(default)]
    pub model: Option<String>,
    /// 生成参数，可选
    #[serde(default)]
    pub parameters: Option<GenerationParameters>,
}

impl ChatRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self { messages, ..Default::default() }
    }

    pub fn with_provider(mut self, provider_id: impl Into<String>) -> Self {
        self.provider_id = Some(provider_id.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_parameters(mut self, parameters: GenerationParameters) -> Self {
        self.parameters = Some(parameters);
        self
    }

    /// 最后一条用户消息的内容
    pub fn last_user_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User)
            .map(|m| m.content.as_str())
    }

    /// 第一条系统消息的内容
    pub fn system_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|m| m.role == MessageRole::System)
            .map(|m| m.content.as_str())
    }
}

/// Token使用统计
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// 统一的聊天响应
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct ChatResponse {
    /// 生成的回复内容
    pub content: String,
    /// 实际使用的模型
    pub model: String,
    /// 实际生成回复的提供商ID
    pub provider: String,
    /// Token使用统计
    pub usage: TokenUsage,
    /// 响应耗时(毫秒)
    #[serde(default)]
    pub latency_ms: u64,
}
