use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

/// API类型标签，决定由哪个适配器处理请求
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ApiType {
    OpenAI,
    Anthropic,
    Google,
    DeepSeek,
    Mistral,
    Azure,
    /// 自定义厂商，没有内置适配器
    Custom(String),
}

impl ApiType {
    /// 内置的厂商标签
    pub const BUILTIN: [ApiType; 6] = [
        ApiType::OpenAI,
        ApiType::Anthropic,
        ApiType::Google,
        ApiType::DeepSeek,
        ApiType::Mistral,
        ApiType::Azure,
    ];

    /// 标准化的厂商名称（用于日志和配置键）
    pub fn as_str(&self) -> &str {
        match self {
            ApiType::OpenAI => "openai",
            ApiType::Anthropic => "anthropic",
            ApiType::Google => "google",
            ApiType::DeepSeek => "deepseek",
            ApiType::Mistral => "mistral",
            ApiType::Azure => "azure",
            ApiType::Custom(name) => name,
        }
    }
}

impl fmt::Display for ApiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 提供商运行状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ProviderStatus {
    Active,
    Inactive,
}

/// 提供商健康状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// 健康
    Healthy,
    /// 降级（仍可使用）
    Degraded,
    /// 不健康
    Unhealthy,
}

/// 模型能力标签
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ModelCapability {
    Chat,
    Completion,
    CodeGeneration,
    ImageGeneration,
    Embedding,
    Vision,
    FunctionCalling,
}

/// 提供商支持的模型
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct ModelInfo {
    /// 模型标识
    pub id: String,
    /// 显示名称
    #[serde(default)]
    pub name: String,
    /// 能力标签
    #[serde(default)]
    #[schema(value_type = Vec<ModelCapability>)]
    pub capabilities: BTreeSet<ModelCapability>,
}

impl ModelInfo {
    pub fn new(id: impl Into<String>, capabilities: impl IntoIterator<Item = ModelCapability>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            capabilities: capabilities.into_iter().collect(),
        }
    }
}

/// API提供商
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct ApiProvider {
    /// 唯一标识符
    pub id: String,
    /// 提供商名称（显示用）
    pub name: String,
    /// API类型
    pub api_type: ApiType,
    /// 当前状态
    pub status: ProviderStatus,
    /// 健康状态
    pub health_status: HealthStatus,
    /// 默认模型
    pub default_model: String,
    /// 支持的模型列表
    #[serde(default)]
    pub models: Vec<ModelInfo>,
    /// 每token成本
    pub cost_per_token: f64,
    /// 基础URL，未配置时只能使用模拟适配器
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// API密钥（不对外输出）
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    /// 最后一次健康检查时间
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_health_check: Option<DateTime<Utc>>,
}

impl ApiProvider {
    /// 创建新的API提供商，默认为活跃且健康
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        api_type: ApiType,
        default_model: impl Into<String>,
        cost_per_token: f64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            api_type,
            status: ProviderStatus::Active,
            health_status: HealthStatus::Healthy,
            default_model: default_model.into(),
            models: Vec::new(),
            cost_per_token,
            base_url: None,
            api_key: None,
            last_health_check: None,
        }
    }

    pub fn with_models(mut self, models: Vec<ModelInfo>) -> Self {
        self.models = models;
        self
    }

    pub fn with_endpoint(mut self, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        self.base_url = Some(base_url.into());
        self.api_key = api_key;
        self
    }

    pub fn with_status(mut self, status: ProviderStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_health(mut self, health_status: HealthStatus) -> Self {
        self.health_status = health_status;
        self
    }

    /// 检查是否为活跃状态
    pub fn is_active(&self) -> bool {
        self.status == ProviderStatus::Active
    }

    /// 活跃且不是不健康状态时才可被路由选中
    pub fn is_usable(&self) -> bool {
        self.is_active() && self.health_status != HealthStatus::Unhealthy
    }

    /// 更新健康状态和检查时间
    pub fn update_health(&mut self, status: HealthStatus, checked_at: DateTime<Utc>) {
        self.health_status = status;
        self.last_health_check = Some(checked_at);
    }

    pub fn find_model(&self, model_id: &str) -> Option<&ModelInfo> {
        self.models.iter().find(|m| m.id == model_id)
    }
}

/// 提供商部分更新，未设置的字段保持不变
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Validate, ToSchema)]
pub struct ProviderUpdate {
    #[validate(length(min = 1, message = "名称不能为空"))]
    pub name: Option<String>,
    pub api_type: Option<ApiType>,
    pub status: Option<ProviderStatus>,
    pub health_status: Option<HealthStatus>,
    #[validate(length(min = 1, message = "默认模型不能为空"))]
    pub default_model: Option<String>,
    pub models: Option<Vec<ModelInfo>>,
    #[validate(range(min = 0.0, message = "成本不能为负数"))]
    pub cost_per_token: Option<f64>,
    #[validate(url(message = "基础URL格式不正确"))]
    pub base_url: Option<String>,
    pub api_key: Option<String>,
}

impl ProviderUpdate {
    /// 合并到已有记录
    pub fn apply(self, provider: &mut ApiProvider) {
        if let Some(name) = self.name {
            provider.name = name;
        }
        if let Some(api_type) = self.api_type {
            provider.api_type = api_type;
        }
        if let Some(status) = self.status {
            provider.status = status;
        }
        if let Some(health_status) = self.health_status {
            provider.health_status = health_status;
        }
        if let Some(default_model) = self.default_model {
            provider.default_model = default_model;
        }
        if let Some(models) = self.models {
            provider.models = models;
        }
        if let Some(cost) = self.cost_per_token {
            provider.cost_per_token = cost;
        }
        if let Some(base_url) = self.base_url {
            provider.base_url = Some(base_url);
        }
        if let Some(api_key) = self.api_key {
            provider.api_key = Some(api_key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn degraded_provider_is_still_usable() {
        let provider = ApiProvider::new("a", "A", ApiType::OpenAI, "gpt-4", 0.01)
            .with_health(HealthStatus::Degraded);
        assert!(provider.is_usable());

        let provider = provider.with_health(HealthStatus::Unhealthy);
        assert!(!provider.is_usable());

        let provider = provider
            .with_health(HealthStatus::Healthy)
            .with_status(ProviderStatus::Inactive);
        assert!(!provider.is_usable());
    }

    #[test]
    fn update_merges_only_present_fields() {
        let mut provider = ApiProvider::new("a", "A", ApiType::OpenAI, "gpt-4", 0.01);
        ProviderUpdate {
            cost_per_token: Some(0.5),
            status: Some(ProviderStatus::Inactive),
            ..Default::default()
        }
        .apply(&mut provider);

        assert_eq!(provider.cost_per_token, 0.5);
        assert_eq!(provider.status, ProviderStatus::Inactive);
        assert_eq!(provider.name, "A");
        assert_eq!(provider.default_model, "gpt-4");
    }

    #[test]
    fn api_type_serializes_as_lowercase_tag() {
        let json = serde_json::to_string(&ApiType::DeepSeek).unwrap();
        assert_eq!(json, "\"deepseek\"");

        let custom: ApiType = serde_json::from_str(r#"{"custom":"baidu"}"#).unwrap();
        assert_eq!(custom, ApiType::Custom("baidu".to_string()));
        assert_eq!(custom.as_str(), "baidu");
    }

    #[test]
    fn api_key_is_not_serialized() {
        let provider = ApiProvider::new("a", "A", ApiType::OpenAI, "gpt-4", 0.01)
            .with_endpoint("https://api.openai.com/v1", Some("sk-secret".to_string()));
        let json = serde_json::to_string(&provider).unwrap();
        assert!(!json.contains("sk-secret"));
        assert!(json.contains("https://api.openai.com/v1"));
    }

    #[test]
    fn update_validation_matches_registration_rules() {
        assert!(ProviderUpdate::default().validate().is_ok());
        assert!(ProviderUpdate { cost_per_token: Some(0.0), ..Default::default() }.validate().is_ok());

        let negative = ProviderUpdate { cost_per_token: Some(-5.0), ..Default::default() };
        assert!(negative.validate().is_err());

        let bad_url = ProviderUpdate { base_url: Some("not a url".to_string()), ..Default::default() };
        assert!(bad_url.validate().is_err());

        let empty_model = ProviderUpdate { default_model: Some(String::new()), ..Default::default() };
        assert!(empty_model.validate().is_err());
    }
}
