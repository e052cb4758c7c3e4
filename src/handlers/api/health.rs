use std::collections::HashMap;

use axum::extract::{Json, State};

use crate::models::HealthCheckResult;
use crate::routes::api::AppState;

/// 并发检查所有提供商的健康状态
#[utoipa::path(
    get,
    path = "/api/v1/health/providers",
    responses(
        (status = 200, description = "按提供商ID索引的检查结果", body = HashMap<String, HealthCheckResult>),
    ),
    tag = "health"
)]
pub async fn check_all_providers_health(
    State(state): State<AppState>,
) -> Json<HashMap<String, HealthCheckResult>> {
    Json(state.api.check_all_providers_health().await)
}
