use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::RouterError;
use crate::models::chat::ChatRequest;

/// 规则条件可引用的请求字段（白名单）
///
/// 以点分路径的字符串形式序列化，例如 `parameters.temperature`。
/// 未知路径在反序列化时直接报错，避免拼写错误导致规则永远不命中。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RequestField {
    Model,
    ProviderId,
    Temperature,
    MaxTokens,
    MessageCount,
    LastUserMessage,
    SystemMessage,
}

impl RequestField {
    pub const ALL: [RequestField; 7] = [
        RequestField::Model,
        RequestField::ProviderId,
        RequestField::Temperature,
        RequestField::MaxTokens,
        RequestField::MessageCount,
        RequestField::LastUserMessage,
        RequestField::SystemMessage,
    ];

    pub fn path(&self) -> &'static str {
        match self {
            RequestField::Model => "model",
            RequestField::ProviderId => "provider_id",
            RequestField::Temperature => "parameters.temperature",
            RequestField::MaxTokens => "parameters.max_tokens",
            RequestField::MessageCount => "messages.count",
            RequestField::LastUserMessage => "messages.last_user",
            RequestField::SystemMessage => "messages.system",
        }
    }

    /// 从请求中取出字段值，缺失时返回None
    pub fn lookup<'a>(&self, request: &'a ChatRequest) -> Option<FieldValue<'a>> {
        match self {
            RequestField::Model => request.model.as_deref().map(FieldValue::Text),
            RequestField::ProviderId => request.provider_id.as_deref().map(FieldValue::Text),
            RequestField::Temperature => request
                .parameters
                .and_then(|p| p.temperature)
                .map(|t| FieldValue::Number(f64::from(t))),
            RequestField::MaxTokens => request
                .parameters
                .and_then(|p| p.max_tokens)
                .map(|m| FieldValue::Number(f64::from(m))),
            RequestField::MessageCount => Some(FieldValue::Number(request.messages.len() as f64)),
            RequestField::LastUserMessage => request.last_user_message().map(FieldValue::Text),
            RequestField::SystemMessage => request.system_message().map(FieldValue::Text),
        }
    }
}

impl fmt::Display for RequestField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

impl FromStr for RequestField {
    type Err = RouterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // 兼容前端使用的驼峰写法
        let normalized = match s.trim() {
            "providerId" => "provider_id",
            "parameters.maxTokens" => "parameters.max_tokens",
            "messages.length" => "messages.count",
            other => other,
        };
        RequestField::ALL
            .into_iter()
            .find(|field| field.path() == normalized)
            .ok_or_else(|| RouterError::InvalidRule(format!("未知的条件字段: {}", s)))
    }
}

impl TryFrom<String> for RequestField {
    type Error = RouterError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RequestField> for String {
    fn from(field: RequestField) -> Self {
        field.path().to_string()
    }
}

/// 请求字段的取值
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue<'a> {
    Text(&'a str),
    Number(f64),
}

/// 条件比较运算符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    /// 子串匹配，仅用于字符串字段
    Contains,
    StartsWith,
    EndsWith,
    /// 仅用于数值字段
    GreaterThan,
    LessThan,
}

/// 单个规则条件
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct RuleCondition {
    /// 请求字段路径
    #[schema(value_type = String, example = "model")]
    pub field: RequestField,
    pub operator: ConditionOperator,
    /// 比较值（字符串或数值）
    #[schema(value_type = Object)]
    pub value: serde_json::Value,
}

impl RuleCondition {
    pub fn new(field: RequestField, operator: ConditionOperator, value: impl Into<serde_json::Value>) -> Self {
        Self { field, operator, value: value.into() }
    }
}

/// 规则命中后的动作
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct RuleAction {
    /// 主提供商
    pub provider_id: String,
    /// 备用提供商（仅在启用故障转移时使用）
    #[serde(default)]
    pub fallback_provider_id: Option<String>,
}

/// 路由规则
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct RoutingRule {
    /// 规则ID
    pub id: String,
    /// 规则名称
    #[serde(default)]
    pub name: String,
    /// 优先级，数值越小越先评估
    pub priority: i32,
    /// 是否启用
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// 条件列表，全部满足才算命中
    #[serde(default)]
    pub conditions: Vec<RuleCondition>,
    pub action: RuleAction,
}

fn default_enabled() -> bool {
    true
}

impl RoutingRule {
    pub fn new(id: impl Into<String>, priority: i32, provider_id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            priority,
            enabled: true,
            conditions: Vec::new(),
            action: RuleAction { provider_id: provider_id.into(), fallback_provider_id: None },
        }
    }

    pub fn with_condition(mut self, condition: RuleCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn with_fallback(mut self, provider_id: impl Into<String>) -> Self {
        self.action.fallback_provider_id = Some(provider_id.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}
