//! Error types for the Tally API service.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;
use tally_core::QuotaError;
use tally_types::Verdict;

/// API error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// API error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Quota exceeded for {}", .0.quota_type)]
    QuotaExceeded(Box<Verdict>),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Quota(#[from] QuotaError),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::QuotaExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Quota(e) => match e {
                QuotaError::PolicyNotFound { .. } => StatusCode::FORBIDDEN,
                QuotaError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                QuotaError::SchedulerBusy => StatusCode::CONFLICT,
                QuotaError::PromptNotFound(_) => StatusCode::NOT_FOUND,
                QuotaError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
                QuotaError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::QuotaExceeded(_) => "QUOTA_EXCEEDED",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Quota(e) => match e {
                QuotaError::PolicyNotFound { .. } => "POLICY_NOT_FOUND",
                QuotaError::StorageUnavailable(_) => "STORAGE_UNAVAILABLE",
                QuotaError::SchedulerBusy => "SCHEDULER_BUSY",
                QuotaError::PromptNotFound(_) => "PROMPT_NOT_FOUND",
                QuotaError::InvalidRequest(_) => "BAD_REQUEST",
                QuotaError::Config(_) => "INTERNAL_ERROR",
            },
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::QuotaExceeded(verdict) => Some(json!({
                "tier": verdict.tier,
                "quota_type": verdict.quota_type,
                "usage": verdict.usage_count,
                "limit": verdict.limit,
                "suggested_tier": verdict.suggested_tier,
                "period_end": verdict.period_end,
            })),
            Self::Quota(e) if e.is_retryable() => Some(json!({ "retryable": true })),
            _ => None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();

        if status.is_server_error() {
            tracing::error!(error = ?self, "Internal API error");
        }

        let body = ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message: self.to_string(),
                details: self.details(),
            },
        };

        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
