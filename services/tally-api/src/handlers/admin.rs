//! Admin control plane handlers
//!
//! Every route here sits behind [`require_admin`].

use axum::extract::{Path, Query, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use tally_types::{ResetLog, SchedulerStatus};
use tracing::instrument;

use crate::error::{ApiError, ApiResult};
use crate::handlers::shared::{parse_quota_type, parse_user_id};
use crate::state::AppState;

/// Largest page of reset logs
const MAX_RESET_LOGS: i64 = 100;

/// Default page of reset logs
const DEFAULT_RESET_LOGS: i64 = 20;

#[derive(Debug, Deserialize)]
pub struct ResetLogsQuery {
    pub limit: Option<i64>,
}

/// Reject requests without `Authorization: Bearer <ADMIN_TOKEN>`
pub async fn require_admin(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let presented = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    let authorized =
        presented.is_some_and(|token| token_matches(token, &state.config.admin_token));

    if !authorized {
        tracing::warn!(path = %request.uri().path(), "Rejected admin request");
        return Err(ApiError::Unauthorized);
    }
    Ok(next.run(request).await)
}

/// Constant-time token comparison. Length is not treated as secret.
fn token_matches(presented: &str, expected: &str) -> bool {
    let (a, b) = (presented.as_bytes(), expected.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// POST /admin/v1/reset
#[instrument(skip(state))]
pub async fn trigger_reset(State(state): State<AppState>) -> ApiResult<Json<ResetLog>> {
    Ok(Json(state.quota.reset_now().await?))
}

/// POST /admin/v1/reset/{user_id}/{quota_type}
#[instrument(skip(state))]
pub async fn reset_user_quota(
    State(state): State<AppState>,
    Path((user_id, quota_type)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    let user_id = parse_user_id(&user_id)?;
    let quota_type = parse_quota_type(&quota_type)?;

    state.quota.reset_user(&user_id, quota_type).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /admin/v1/scheduler
pub async fn scheduler_status(State(state): State<AppState>) -> Json<SchedulerStatus> {
    Json(state.quota.scheduler_status().await)
}

/// GET /admin/v1/reset-logs?limit=N
#[instrument(skip(state))]
pub async fn list_reset_logs(
    State(state): State<AppState>,
    Query(query): Query<ResetLogsQuery>,
) -> ApiResult<Json<Vec<ResetLog>>> {
    let limit = query.limit.unwrap_or(DEFAULT_RESET_LOGS);
    if !(1..=MAX_RESET_LOGS).contains(&limit) {
        return Err(ApiError::BadRequest(format!(
            "limit must be between 1 and {MAX_RESET_LOGS}"
        )));
    }
    Ok(Json(state.quota.recent_reset_logs(limit).await?))
}
