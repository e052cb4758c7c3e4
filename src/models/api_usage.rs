use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::chat::TokenUsage;

/// 端点标签：聊天
pub const ENDPOINT_CHAT: &str = "chat";

/// API调用成功记录
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct UsageEvent {
    /// 唯一标识符
    pub id: String,
    /// 提供商ID
    pub provider_id: String,
    /// 模型名称
    pub model: String,
    /// 端点标签
    pub endpoint: String,
    /// 输入token数量
    pub prompt_tokens: u32,
    /// 输出token数量
    pub completion_tokens: u32,
    /// 总token数量
    pub total_tokens: u32,
    /// 响应时间(毫秒)
    pub response_time_ms: u64,
    pub success: bool,
    /// 估算成本
    pub cost: f64,
    /// 请求时间
    pub timestamp: DateTime<Utc>,
}

impl UsageEvent {
    /// 创建新的成功调用记录
    pub fn new(
        provider_id: impl Into<String>,
        model: impl Into<String>,
        endpoint: impl Into<String>,
        usage: TokenUsage,
        response_time_ms: u64,
        cost_per_token: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            provider_id: provider_id.into(),
            model: model.into(),
            endpoint: endpoint.into(),
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
            response_time_ms,
            success: true,
            cost: f64::from(usage.total_tokens) * cost_per_token,
            timestamp: Utc::now(),
        }
    }
}

/// API调用失败记录
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct ErrorEvent {
    pub id: String,
    pub provider_id: String,
    pub endpoint: String,
    /// 错误码
    pub error_code: String,
    /// 错误信息
    pub error_message: String,
    pub timestamp: DateTime<Utc>,
}

impl ErrorEvent {
    pub fn new(
        provider_id: impl Into<String>,
        endpoint: impl Into<String>,
        error_code: impl Into<String>,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            provider_id: provider_id.into(),
            endpoint: endpoint.into(),
            error_code: error_code.into(),
            error_message: error_message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// 数据库中的成功调用行
#[derive(Debug, Clone, FromRow)]
pub struct UsageEventRow {
    pub id: String,
    pub provider_id: String,
    pub model: String,
    pub endpoint: String,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,
    pub response_time_ms: i64,
    pub success: bool,
    pub cost: f64,
    /// 毫秒时间戳
    pub timestamp_ms: i64,
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}

impl From<UsageEventRow> for UsageEvent {
    fn from(row: UsageEventRow) -> Self {
        Self {
            id: row.id,
            provider_id: row.provider_id,
            model: row.model,
            endpoint: row.endpoint,
            prompt_tokens: u32::try_from(row.prompt_tokens).unwrap_or_default(),
            completion_tokens: u32::try_from(row.completion_tokens).unwrap_or_default(),
            total_tokens: u32::try_from(row.total_tokens).unwrap_or_default(),
            response_time_ms: u64::try_from(row.response_time_ms).unwrap_or_default(),
            success: row.success,
            cost: row.cost,
            timestamp: from_millis(row.timestamp_ms),
        }
    }
}

/// 数据库中的失败调用行
#[derive(Debug, Clone, FromRow)]
pub struct ErrorEventRow {
    pub id: String,
    pub provider_id: String,
    pub endpoint: String,
    pub error_code: String,
    pub error_message: String,
    pub timestamp_ms: i64,
}

impl From<ErrorEventRow> for ErrorEvent {
    fn from(row: ErrorEventRow) -> Self {
        Self {
            id: row.id,
            provider_id: row.provider_id,
            endpoint: row.endpoint,
            error_code: row.error_code,
            error_message: row.error_message,
            timestamp: from_millis(row.timestamp_ms),
        }
    }
}

/// 时间线分组粒度
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum GroupBy {
    Hour,
    #[default]
    Day,
    Week,
    Month,
}

impl FromStr for GroupBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hour" => Ok(GroupBy::Hour),
            "day" => Ok(GroupBy::Day),
            "week" => Ok(GroupBy::Week),
            "month" => Ok(GroupBy::Month),
            _ => Err(format!("Unknown group_by: {}", s)),
        }
    }
}

/// 使用量统计报告
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct UsageStatistics {
    /// 总调用次数（成功 + 失败）
    pub total_calls: u64,
    /// 总成本
    pub total_cost: f64,
    /// 平均响应时间(毫秒)，仅统计成功调用
    pub avg_response_time_ms: f64,
    /// 错误率
    pub error_rate: f64,
    /// 按提供商分组的统计
    pub by_provider: Vec<BreakdownStats>,
    /// 按端点分组的统计
    pub by_endpoint: Vec<BreakdownStats>,
    /// 按时间分组的统计
    pub timeline: Vec<TimelineBucket>,
}

/// 单个维度的统计
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct BreakdownStats {
    /// 维度取值（提供商ID或端点）
    pub key: String,
    pub calls: u64,
    pub errors: u64,
    pub total_tokens: u64,
    pub cost: f64,
    pub avg_response_time_ms: f64,
}

/// 时间桶统计
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct TimelineBucket {
    /// 桶起始时间
    pub start: DateTime<Utc>,
    pub calls: u64,
    pub errors: u64,
    pub cost: f64,
}
