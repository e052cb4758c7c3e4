use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::api_provider::HealthStatus;

/// 健康检查结果
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct HealthCheckResult {
    /// 关联的API提供商ID
    pub provider_id: String,
    /// 健康状态
    pub status: HealthStatus,
    /// 响应时间(毫秒)
    pub latency_ms: u64,
    /// 说明信息
    pub message: String,
    /// HTTP状态码
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    /// 检查时间
    pub checked_at: DateTime<Utc>,
}

impl HealthCheckResult {
    pub fn new(
        provider_id: impl Into<String>,
        status: HealthStatus,
        latency_ms: u64,
        message: impl Into<String>,
        http_status: Option<u16>,
    ) -> Self {
        Self {
            provider_id: provider_id.into(),
            status,
            latency_ms,
            message: message.into(),
            http_status,
            checked_at: Utc::now(),
        }
    }

    /// 检查是否不健康
    pub fn is_unhealthy(&self) -> bool {
        self.status == HealthStatus::Unhealthy
    }
}
