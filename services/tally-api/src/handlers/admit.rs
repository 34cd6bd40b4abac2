//! Request gate handler

use std::time::Instant;

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use tally_core::AdmissionRequest;
use tally_types::Verdict;
use tracing::instrument;

use crate::error::{ApiError, ApiResult};
use crate::handlers::shared::{
    parse_quota_type, parse_user_id, record_op_duration, validate_idempotency_key,
    validate_increment,
};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AdmitRequest {
    pub user_id: String,
    pub quota_type: String,
    #[serde(default = "default_increment")]
    pub increment: u64,
    pub idempotency_key: Option<String>,
}

fn default_increment() -> u64 {
    1
}

/// POST /api/v1/quota/admit
///
/// 200 with the verdict when admitted, 429 `QUOTA_EXCEEDED` when denied.
/// Any other error means no decision was made and the action must not run.
#[instrument(skip(state, req), fields(user_id = %req.user_id, quota_type = %req.quota_type, increment = req.increment))]
pub async fn admit(
    State(state): State<AppState>,
    Json(req): Json<AdmitRequest>,
) -> ApiResult<Json<Verdict>> {
    let start = Instant::now();

    let user_id = parse_user_id(&req.user_id)?;
    let quota_type = parse_quota_type(&req.quota_type)?;
    validate_increment(req.increment)?;
    if let Some(key) = req.idempotency_key.as_deref() {
        validate_idempotency_key(key)?;
    }

    let mut admission = AdmissionRequest::new(user_id, quota_type).with_increment(req.increment);
    if let Some(key) = req.idempotency_key {
        admission = admission.with_idempotency_key(key);
    }

    let result = state.quota.admit(&admission).await;
    record_op_duration("admit", start, result.is_ok());

    let verdict = result?;
    if verdict.allowed {
        Ok(Json(verdict))
    } else {
        Err(ApiError::QuotaExceeded(Box::new(verdict)))
    }
}
