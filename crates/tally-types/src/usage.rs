//! Usage records, admission verdicts and reporting summaries

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{Limit, QuotaType, Tier, UserId};

/// Usage counter for one user, quota type and period
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    /// User who generated the usage
    pub user_id: UserId,
    /// Quota category
    pub quota_type: QuotaType,
    /// Inclusive period start
    pub period_start: DateTime<Utc>,
    /// Exclusive period end
    pub period_end: DateTime<Utc>,
    /// Units consumed in the period
    pub usage_count: u64,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
}

impl UsageRecord {
    /// Zero-usage record for a period that has no stored row yet
    pub fn empty(
        user_id: UserId,
        quota_type: QuotaType,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            quota_type,
            period_start,
            period_end,
            usage_count: 0,
            updated_at: now,
        }
    }

    /// Whether `at` falls inside `[period_start, period_end)`
    pub fn covers(&self, at: DateTime<Utc>) -> bool {
        self.period_start <= at && at < self.period_end
    }
}

/// Admission decision returned by the request gate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    /// Whether the guarded action may proceed
    pub allowed: bool,
    /// Tier the decision was made under
    pub tier: Tier,
    /// Quota category
    pub quota_type: QuotaType,
    /// Usage after the decision (unchanged on deny)
    pub usage_count: u64,
    /// Ceiling applied
    pub limit: Limit,
    /// Units left in the period, `None` when unlimited.
    ///
    /// A denial reports what is actually left: `Some(0)` for single-unit
    /// requests, but a denied multi-unit request may leave `Some(n)` with
    /// `0 < n < increment`, since nothing was consumed.
    pub remaining: Option<u64>,
    /// Inclusive period start
    pub period_start: DateTime<Utc>,
    /// Exclusive period end; the quota refills at this instant
    pub period_end: DateTime<Utc>,
    /// Next higher tier for upgrade messaging
    pub suggested_tier: Option<Tier>,
    /// True when this outcome was replayed for a repeated idempotency key
    #[serde(default)]
    pub replayed: bool,
}

/// Rollup of usage over a trailing window of days
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSummary {
    /// Quota category
    pub quota_type: QuotaType,
    /// Number of days in the window
    pub days: u32,
    /// Sum of usage over the window
    pub total_usage: u64,
    /// Mean usage per day, days without activity counted as zero
    pub avg_daily_usage: f64,
    /// Highest single-day usage
    pub max_daily_usage: u64,
    /// Days on which usage reached the limit
    pub days_at_limit: u32,
}

/// Usage for one calendar day, by quota type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyUsage {
    /// UTC calendar date
    pub date: NaiveDate,
    /// Usage per quota type; every quota type is present
    pub counts: BTreeMap<QuotaType, u64>,
}

impl DailyUsage {
    /// A day with zero usage for every quota type
    pub fn zeroed(date: NaiveDate) -> Self {
        Self {
            date,
            counts: QuotaType::ALL.into_iter().map(|q| (q, 0)).collect(),
        }
    }
}
