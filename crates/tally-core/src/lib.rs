//! Tally Core - Tiered quota enforcement
//!
//! Meters rate-limited actions per user, enforces per-tier ceilings with an
//! atomic admit/deny decision, rolls usage windows forward, drives upgrade
//! prompts and produces usage statistics.
//!
//! # Example
//!
//! ```rust,ignore
//! use tally_core::{AdmissionRequest, QuotaConfig, QuotaService};
//! use tally_types::QuotaType;
//!
//! let service = QuotaService::from_repositories(QuotaConfig::default(), repos);
//!
//! let verdict = service
//!     .admit(&AdmissionRequest::new(user_id, QuotaType::Search))
//!     .await?;
//! if !verdict.allowed {
//!     // surface "quota exceeded" with verdict.suggested_tier
//! }
//! ```

pub mod config;
pub mod enforcer;
pub mod error;
pub mod ledger;
pub mod period;
pub mod policy;
pub mod prompt;
pub mod scheduler;
pub mod service;
pub mod stats;
pub mod tier;

pub use config::QuotaConfig;
pub use enforcer::{AdmissionRequest, QuotaEnforcer};
pub use error::QuotaError;
pub use ledger::{LedgerOutcome, UsageLedger};
pub use period::Period;
pub use policy::TierPolicyStore;
pub use prompt::{SweepSummary, UpgradePromptEngine};
pub use scheduler::ResetScheduler;
pub use service::QuotaService;
pub use stats::StatisticsAggregator;
pub use tier::{CachedTierResolver, TierResolver};
