use axum::extract::{Json, Query, State};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::error::RouterError;
use crate::models::{GroupBy, UsageStatistics};
use crate::routes::api::AppState;

/// 统计查询参数，默认最近24小时按天分组
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UsageQuery {
    /// 起始时间（包含），RFC 3339
    pub start: Option<DateTime<Utc>>,
    /// 结束时间（不包含），RFC 3339
    pub end: Option<DateTime<Utc>>,
    /// 分组粒度（hour/day/week/month）
    #[param(value_type = Option<String>)]
    pub group_by: Option<GroupBy>,
}

impl UsageQuery {
    fn resolve(self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>, GroupBy) {
        let end = self.end.unwrap_or(now);
        let start = self.start.unwrap_or(end - Duration::hours(24));
        (start, end, self.group_by.unwrap_or_default())
    }
}

/// 查询使用量统计
#[utoipa::path(
    get,
    path = "/api/v1/usage",
    params(UsageQuery),
    responses(
        (status = 200, description = "使用量统计", body = UsageStatistics),
        (status = 500, description = "遥测存储错误", body = crate::error::ErrorResponse),
    ),
    tag = "usage"
)]
pub async fn get_usage_statistics(
    State(state): State<AppState>,
    Query(query): Query<UsageQuery>,
) -> Result<Json<UsageStatistics>, RouterError> {
    let (start, end, group_by) = query.resolve(Utc::now());
    let stats = state.api.get_usage_statistics(start, end, group_by).await?;
    Ok(Json(stats))
}
