//! Repository traits
//!
//! Define async repository interfaces for database operations. Usage rows
//! are only ever mutated through [`UsageRepository::increment_with_ceiling`],
//! [`UsageRepository::roll_forward`] and [`UsageRepository::reset`], each of
//! which is a single atomic step in every backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DbResult;
use crate::models::*;

/// Input for an atomic increment against one period's counter
#[derive(Debug, Clone)]
pub struct IncrementRequest {
    pub user_id: Uuid,
    pub quota_type: String,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    /// Units to add, always positive
    pub increment: i64,
    /// Maximum stored count after the increment; `None` means no ceiling
    pub ceiling: Option<i64>,
    /// Caller-supplied key, scoped to the user and quota type; a repeated
    /// key replays the stored outcome
    pub idempotency_key: Option<String>,
    pub now: DateTime<Utc>,
}

/// Result of an atomic increment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IncrementOutcome {
    /// Whether the increment was applied
    pub allowed: bool,
    /// Stored count after the operation
    pub usage_count: i64,
    /// Period the outcome applies to; differs from the request only on replay
    pub period_start: DateTime<Utc>,
    /// True when the outcome came from an earlier attempt with the same key
    pub replayed: bool,
}

/// Usage repository trait
#[async_trait]
pub trait UsageRepository: Send + Sync {
    /// Find the counter row for one period
    async fn find(
        &self,
        user_id: Uuid,
        quota_type: &str,
        period_start: DateTime<Utc>,
    ) -> DbResult<Option<UsageRow>>;

    /// Create the period row if missing, then add `increment` only if the
    /// result stays within `ceiling`. Denied increments leave the row as is.
    async fn increment_with_ceiling(&self, req: IncrementRequest) -> DbResult<IncrementOutcome>;

    /// Force the counter for one period to zero, creating the row if needed
    async fn reset(
        &self,
        user_id: Uuid,
        quota_type: &str,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> DbResult<()>;

    /// Create a zero row for one period if none exists. An existing row is
    /// left untouched, so admissions already counted toward the period stay.
    async fn roll_forward(
        &self,
        user_id: Uuid,
        quota_type: &str,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> DbResult<()>;

    /// Pairs whose most recent row has ended by `now` and recorded usage
    async fn find_stale(&self, now: DateTime<Utc>, limit: i64) -> DbResult<Vec<StaleKey>>;

    /// Rows whose period contains `now` and have non-zero usage
    async fn find_live(&self, now: DateTime<Utc>) -> DbResult<Vec<UsageRow>>;

    /// Rows for a user whose period starts in `[from, to)`
    async fn history(
        &self,
        user_id: Uuid,
        quota_type: Option<&str>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> DbResult<Vec<UsageRow>>;

    /// Delete stored admission outcomes created before `before`
    async fn purge_admissions(&self, before: DateTime<Utc>) -> DbResult<u64>;
}

/// Create prompt input
#[derive(Debug, Clone)]
pub struct CreatePrompt {
    pub id: Uuid,
    pub user_id: Uuid,
    pub quota_type: String,
    pub current_tier: String,
    pub suggested_tier: String,
    pub shown_at: DateTime<Utc>,
}

/// Upgrade prompt repository trait
#[async_trait]
pub trait PromptRepository: Send + Sync {
    /// Insert a prompt unless an open one exists for the same user and
    /// quota type. Returns `None` when one already exists.
    async fn create_if_absent(&self, prompt: CreatePrompt) -> DbResult<Option<PromptRow>>;

    /// Find a prompt by ID
    async fn find_by_id(&self, id: Uuid) -> DbResult<Option<PromptRow>>;

    /// List a user's prompts, newest first
    async fn find_by_user(&self, user_id: Uuid, include_dismissed: bool)
        -> DbResult<Vec<PromptRow>>;

    /// Set `dismissed_at` if the prompt is not terminal. Returns whether it changed.
    async fn dismiss(&self, id: Uuid, at: DateTime<Utc>) -> DbResult<bool>;

    /// Set `converted_at` if the prompt is not terminal. Returns whether it changed.
    async fn mark_converted(&self, id: Uuid, at: DateTime<Utc>) -> DbResult<bool>;
}

/// Reset log repository trait
#[async_trait]
pub trait ResetLogRepository: Send + Sync {
    /// Append a log entry
    async fn append(&self, log: ResetLogRow) -> DbResult<()>;

    /// Most recent entries, newest first
    async fn recent(&self, limit: i64) -> DbResult<Vec<ResetLogRow>>;
}

/// Read-only view of user profiles
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Stored tier name for a user
    async fn find_tier(&self, id: Uuid) -> DbResult<Option<String>>;
}
