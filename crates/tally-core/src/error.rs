//! Quota engine errors

use tally_types::{PromptId, QuotaType, Tier};
use thiserror::Error;

/// Quota engine errors
///
/// A denied admission is not an error; it is a [`Verdict`](tally_types::Verdict)
/// with `allowed == false`.
#[derive(Error, Debug)]
pub enum QuotaError {
    /// No limit configured for the tier and quota type; requests fail closed
    #[error("no policy configured for tier {tier} and quota {quota_type}")]
    PolicyNotFound {
        /// Tier that was looked up
        tier: Tier,
        /// Quota type that was looked up
        quota_type: QuotaType,
    },

    /// The usage store could not be read or written
    #[error("usage storage unavailable: {0}")]
    StorageUnavailable(String),

    /// A reset run is already in progress
    #[error("reset run already in progress")]
    SchedulerBusy,

    /// Upgrade prompt does not exist
    #[error("upgrade prompt not found: {0}")]
    PromptNotFound(PromptId),

    /// Caller supplied an unusable argument
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Configuration could not be loaded or is inconsistent
    #[error("configuration error: {0}")]
    Config(String),
}

impl QuotaError {
    /// Whether retrying the whole request later may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StorageUnavailable(_) | Self::SchedulerBusy)
    }
}

impl From<tally_db::DbError> for QuotaError {
    fn from(err: tally_db::DbError) -> Self {
        tracing::error!(error = %err, "Storage error");
        Self::StorageUnavailable(err.to_string())
    }
}
