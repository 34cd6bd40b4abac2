//! Shared handler utilities
//!
//! Common validation, metrics, and helper functions used across handlers.

use std::time::Instant;

use tally_types::{PromptId, QuotaType, UserId};

use crate::error::ApiError;

// ============================================================================
// Input Validation
// ============================================================================

/// Largest increment a single admission may carry
pub const MAX_INCREMENT: u64 = 10_000;

/// Maximum idempotency key length
const MAX_IDEMPOTENCY_KEY_LEN: usize = 128;

/// Largest statistics window in days
pub const MAX_WINDOW_DAYS: u32 = 365;

/// Default statistics window in days
pub const DEFAULT_WINDOW_DAYS: u32 = 7;

/// Parse a user ID path or body value
pub fn parse_user_id(raw: &str) -> Result<UserId, ApiError> {
    UserId::parse(raw).map_err(|_| ApiError::BadRequest("Invalid user_id".into()))
}

/// Parse a prompt ID path value
pub fn parse_prompt_id(raw: &str) -> Result<PromptId, ApiError> {
    PromptId::parse(raw).map_err(|_| ApiError::BadRequest("Invalid prompt id".into()))
}

/// Parse a quota type name
pub fn parse_quota_type(raw: &str) -> Result<QuotaType, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("Unknown quota type: {raw}")))
}

/// Validate an admission increment.
pub fn validate_increment(increment: u64) -> Result<(), ApiError> {
    if increment == 0 {
        return Err(ApiError::BadRequest("Increment must be positive".into()));
    }
    if increment > MAX_INCREMENT {
        return Err(ApiError::BadRequest(format!(
            "Increment too large (max {MAX_INCREMENT})"
        )));
    }
    Ok(())
}

/// Validate a caller-supplied idempotency key.
///
/// # Security
/// Keys are stored and used as primary keys, so length and alphabet are
/// bounded. Allows: alphanumeric, underscore, hyphen, dot, colon.
pub fn validate_idempotency_key(key: &str) -> Result<(), ApiError> {
    if key.is_empty() {
        return Err(ApiError::BadRequest("Idempotency key cannot be empty".into()));
    }

    if key.len() > MAX_IDEMPOTENCY_KEY_LEN {
        return Err(ApiError::BadRequest(format!(
            "Idempotency key too long (max {MAX_IDEMPOTENCY_KEY_LEN} chars)"
        )));
    }

    if !key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':'))
    {
        return Err(ApiError::BadRequest(
            "Idempotency key contains invalid characters (use alphanumeric, _, -, ., :)".into(),
        ));
    }

    Ok(())
}

/// Resolve an optional `days` query value
pub fn window_days(days: Option<u32>) -> Result<u32, ApiError> {
    let days = days.unwrap_or(DEFAULT_WINDOW_DAYS);
    if days == 0 || days > MAX_WINDOW_DAYS {
        return Err(ApiError::BadRequest(format!(
            "days must be between 1 and {MAX_WINDOW_DAYS}"
        )));
    }
    Ok(days)
}

// ============================================================================
// Metrics Helpers
// ============================================================================

/// Record HTTP operation duration with result label.
/// Labels: operation, result (ok/err)
#[inline]
pub fn record_op_duration(operation: &'static str, start: Instant, success: bool) {
    let result = if success { "ok" } else { "err" };
    metrics::histogram!(
        "quota_operation_duration_seconds",
        "operation" => operation,
        "result" => result
    )
    .record(start.elapsed().as_secs_f64());
}

// ============================================================================
// Tests
// ============================================================================
