// 导出所有模型组件

pub mod api_provider;
pub mod api_usage;
pub mod chat;
pub mod health_check;
pub mod routing_rule;
pub mod settings;

// 重新导出核心类型
pub use api_provider::{
    ApiProvider, ApiType, HealthStatus, ModelCapability, ModelInfo, ProviderStatus, ProviderUpdate,
};
pub use api_usage::{
    BreakdownStats, ErrorEvent, ErrorEventRow, GroupBy, TimelineBucket, UsageEvent, UsageEventRow,
    UsageStatistics, ENDPOINT_CHAT,
};
pub use chat::{ChatRequest, ChatResponse, GenerationParameters, Message, MessageRole, TokenUsage};
pub use health_check::HealthCheckResult;
pub use routing_rule::{
    ConditionOperator, FieldValue, RequestField, RoutingRule, RuleAction, RuleCondition,
};
pub use settings::{RouterSettings, SettingsUpdate};
