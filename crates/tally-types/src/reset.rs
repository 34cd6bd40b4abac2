//! Reset scheduler audit and status types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One scheduler run, appended once per run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetLog {
    /// Log entry ID
    pub id: Uuid,
    /// When the run started
    pub executed_at: DateTime<Utc>,
    /// Distinct users with at least one successful reset
    pub users_reset: u64,
    /// (user, quota type) pairs reset
    pub quotas_reset: u64,
    /// Pairs whose reset failed and were skipped
    pub failed_count: u64,
    /// Wall-clock duration of the run
    pub duration_ms: u64,
}

/// Scheduler lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerState {
    /// Waiting for the next tick or trigger
    Idle,
    /// A sweep is in progress
    Running,
}

/// Snapshot reported by the admin control plane
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStatus {
    /// Current state
    pub state: SchedulerState,
    /// Start of the most recent completed run
    pub last_run_at: Option<DateTime<Utc>>,
    /// Summary of the most recent completed run
    pub last_run: Option<ResetLog>,
}
