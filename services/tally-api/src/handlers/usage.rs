//! Usage and reporting handlers

use std::time::Instant;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use tally_types::{DailyUsage, StatsSummary, UsageRecord};
use tracing::instrument;

use crate::error::ApiResult;
use crate::handlers::shared::{parse_quota_type, parse_user_id, record_op_duration, window_days};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WindowQuery {
    pub days: Option<u32>,
}

/// GET /api/v1/quota/usage/{user_id}/{quota_type}
#[instrument(skip(state))]
pub async fn get_usage(
    State(state): State<AppState>,
    Path((user_id, quota_type)): Path<(String, String)>,
) -> ApiResult<Json<UsageRecord>> {
    let start = Instant::now();

    let user_id = parse_user_id(&user_id)?;
    let quota_type = parse_quota_type(&quota_type)?;

    let result = state.quota.usage(&user_id, quota_type).await;
    record_op_duration("get_usage", start, result.is_ok());

    Ok(Json(result?))
}

/// GET /api/v1/quota/statistics/{user_id}/{quota_type}?days=N
#[instrument(skip(state))]
pub async fn get_statistics(
    State(state): State<AppState>,
    Path((user_id, quota_type)): Path<(String, String)>,
    Query(query): Query<WindowQuery>,
) -> ApiResult<Json<StatsSummary>> {
    let start = Instant::now();

    let user_id = parse_user_id(&user_id)?;
    let quota_type = parse_quota_type(&quota_type)?;
    let days = window_days(query.days)?;

    let result = state.quota.statistics(&user_id, quota_type, days).await;
    record_op_duration("get_statistics", start, result.is_ok());

    Ok(Json(result?))
}

/// GET /api/v1/quota/daily/{user_id}?days=N
#[instrument(skip(state))]
pub async fn get_daily_usage(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<WindowQuery>,
) -> ApiResult<Json<Vec<DailyUsage>>> {
    let start = Instant::now();

    let user_id = parse_user_id(&user_id)?;
    let days = window_days(query.days)?;

    let result = state.quota.daily_usage(&user_id, days).await;
    record_op_duration("get_daily_usage", start, result.is_ok());

    Ok(Json(result?))
}
