//! Tally Types - Shared domain types
//!
//! This crate contains domain types used across tally crates and services:
//! - User identity
//! - Subscription tiers and quota limits
//! - Usage records, admission verdicts and reporting summaries
//! - Upgrade prompts and reset audit logs

pub mod error;
pub mod prompt;
pub mod quota;
pub mod reset;
pub mod tier;
pub mod usage;
pub mod user;

pub use error::*;
pub use prompt::*;
pub use quota::*;
pub use reset::*;
pub use tier::*;
pub use usage::*;
pub use user::*;
