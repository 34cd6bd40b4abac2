//! Usage ledger
//!
//! Sole owner of usage counter mutation. Every write goes through the
//! repository's atomic primitives; the ledger itself holds no counters.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tally_db::{IncrementRequest, StaleKey, UsageRepository};
use tally_types::{Limit, QuotaType, UsageRecord, UserId};
use tracing::instrument;

use crate::period::Period;
use crate::QuotaError;

/// Result of [`UsageLedger::check_and_increment`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerOutcome {
    /// Whether the increment was applied
    pub allowed: bool,
    /// Usage after the decision
    pub usage_count: u64,
    /// Limit the decision was made against
    pub limit: Limit,
    /// Units left, `None` when unlimited; may be non-zero on a denied
    /// multi-unit request
    pub remaining: Option<u64>,
    /// Period the usage counts toward
    pub period: Period,
    /// Whether this is a stored outcome for a repeated idempotency key
    pub replayed: bool,
}

/// Durable per-user, per-quota, per-period counters
#[derive(Clone)]
pub struct UsageLedger {
    repo: Arc<dyn UsageRepository>,
}

impl UsageLedger {
    /// Create a ledger over a usage repository
    pub fn new(repo: Arc<dyn UsageRepository>) -> Self {
        Self { repo }
    }

    /// Atomically admit `increment` units against `limit` for the period
    /// containing `now`. A denial leaves the stored count untouched.
    #[instrument(skip(self, idempotency_key), fields(user_id = %user_id, quota_type = %quota_type))]
    pub async fn check_and_increment(
        &self,
        user_id: &UserId,
        quota_type: QuotaType,
        increment: u64,
        limit: Limit,
        now: DateTime<Utc>,
        idempotency_key: Option<&str>,
    ) -> Result<LedgerOutcome, QuotaError> {
        if increment == 0 {
            return Err(QuotaError::InvalidRequest("increment must be positive".into()));
        }
        let increment = i64::try_from(increment)
            .map_err(|_| QuotaError::InvalidRequest("increment too large".into()))?;

        let period = Period::containing(now);
        let outcome = self
            .repo
            .increment_with_ceiling(IncrementRequest {
                user_id: user_id.0,
                quota_type: quota_type.as_str().to_string(),
                period_start: period.start,
                period_end: period.end,
                increment,
                ceiling: limit
                    .ceiling()
                    .map(|c| i64::try_from(c).unwrap_or(i64::MAX)),
                idempotency_key: idempotency_key.map(String::from),
                now,
            })
            .await?;

        let usage_count = to_count(outcome.usage_count)?;
        Ok(LedgerOutcome {
            allowed: outcome.allowed,
            usage_count,
            limit,
            remaining: limit.remaining(usage_count),
            period: Period::containing(outcome.period_start),
            replayed: outcome.replayed,
        })
    }

    /// Current period's record, or a zero-usage record if none is stored.
    /// Never writes.
    pub async fn get_usage(
        &self,
        user_id: &UserId,
        quota_type: QuotaType,
        now: DateTime<Utc>,
    ) -> Result<UsageRecord, QuotaError> {
        let period = Period::containing(now);
        let row = self
            .repo
            .find(user_id.0, quota_type.as_str(), period.start)
            .await?;

        match row {
            Some(row) => Ok(row.to_record()?),
            None => Ok(UsageRecord::empty(
                *user_id,
                quota_type,
                period.start,
                period.end,
                now,
            )),
        }
    }

    /// Force the current period's count to zero. Idempotent.
    #[instrument(skip(self), fields(user_id = %user_id, quota_type = %quota_type))]
    pub async fn reset_period(
        &self,
        user_id: &UserId,
        quota_type: QuotaType,
        now: DateTime<Utc>,
    ) -> Result<(), QuotaError> {
        let period = Period::containing(now);
        self.repo
            .reset(user_id.0, quota_type.as_str(), period.start, period.end, now)
            .await?;
        Ok(())
    }

    /// Make sure the period containing `now` has a row, leaving any count
    /// already recorded for it in place. Safe against concurrent admissions.
    #[instrument(skip(self), fields(user_id = %user_id, quota_type = %quota_type))]
    pub async fn roll_forward(
        &self,
        user_id: &UserId,
        quota_type: QuotaType,
        now: DateTime<Utc>,
    ) -> Result<(), QuotaError> {
        let period = Period::containing(now);
        self.repo
            .roll_forward(user_id.0, quota_type.as_str(), period.start, period.end, now)
            .await?;
        Ok(())
    }

    /// Records whose period falls on `first..=last`
    pub async fn history(
        &self,
        user_id: &UserId,
        quota_type: Option<QuotaType>,
        first: NaiveDate,
        last: NaiveDate,
    ) -> Result<Vec<UsageRecord>, QuotaError> {
        let rows = self
            .repo
            .history(
                user_id.0,
                quota_type.map(|q| q.as_str()),
                Period::day_of(first).start,
                Period::day_of(last).end,
            )
            .await?;

        rows.iter()
            .map(|row| row.to_record().map_err(QuotaError::from))
            .collect()
    }

    /// Pairs whose latest period has ended with usage still recorded
    pub async fn find_stale(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<StaleKey>, QuotaError> {
        Ok(self.repo.find_stale(now, limit).await?)
    }

    /// Records for the current period with non-zero usage
    pub async fn live_records(&self, now: DateTime<Utc>) -> Result<Vec<UsageRecord>, QuotaError> {
        let rows = self.repo.find_live(now).await?;
        rows.iter()
            .map(|row| row.to_record().map_err(QuotaError::from))
            .collect()
    }

    /// Forget idempotency keys recorded before `before`
    pub async fn purge_admissions(&self, before: DateTime<Utc>) -> Result<u64, QuotaError> {
        Ok(self.repo.purge_admissions(before).await?)
    }
}

fn to_count(raw: i64) -> Result<u64, QuotaError> {
    u64::try_from(raw)
        .map_err(|_| QuotaError::StorageUnavailable(format!("negative usage count {raw}")))
}

impl std::fmt::Debug for UsageLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsageLedger").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tally_db::memory::MemoryUsageRepository;

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn ledger() -> (UsageLedger, MemoryUsageRepository) {
        let repo = MemoryUsageRepository::new();
        (UsageLedger::new(Arc::new(repo.clone())), repo)
    }

    #[tokio::test]
    async fn test_get_usage_does_not_create_rows() {
        let (ledger, repo) = ledger();
        let user = UserId::new();

        let record = ledger
            .get_usage(&user, QuotaType::Search, ts("2025-05-05T10:00:00Z"))
            .await
            .unwrap();

        assert_eq!(record.usage_count, 0);
        assert_eq!(record.period_start, ts("2025-05-05T00:00:00Z"));
        assert_eq!(repo.row_count(), 0);
    }

    #[tokio::test]
    async fn test_denied_call_leaves_count_unchanged() {
        let (ledger, _) = ledger();
        let user = UserId::new();
        let now = ts("2025-05-05T10:00:00Z");
        let limit = Limit::Limited(3);

        ledger
            .check_and_increment(&user, QuotaType::Export, 2, limit, now, None)
            .await
            .unwrap();
        let denied = ledger
            .check_and_increment(&user, QuotaType::Export, 2, limit, now, None)
            .await
            .unwrap();

        // Multi-unit denials report what is actually left, not zero
        assert!(!denied.allowed);
        assert_eq!(denied.usage_count, 2);
        assert_eq!(denied.remaining, Some(1));
        let after = ledger.get_usage(&user, QuotaType::Export, now).await.unwrap();
        assert_eq!(after.usage_count, 2);
    }

    #[tokio::test]
    async fn test_reset_restores_full_limit() {
        let (ledger, _) = ledger();
        let user = UserId::new();
        let now = ts("2025-05-05T10:00:00Z");
        let limit = Limit::Limited(1);

        ledger
            .check_and_increment(&user, QuotaType::Search, 1, limit, now, None)
            .await
            .unwrap();
        ledger.reset_period(&user, QuotaType::Search, now).await.unwrap();
        ledger.reset_period(&user, QuotaType::Search, now).await.unwrap();

        let outcome = ledger
            .check_and_increment(&user, QuotaType::Search, 1, limit, now, None)
            .await
            .unwrap();
        assert!(outcome.allowed);
        assert_eq!(outcome.remaining, Some(0));
    }

    #[tokio::test]
    async fn test_roll_forward_keeps_new_period_usage() {
        let (ledger, _) = ledger();
        let user = UserId::new();
        let now = ts("2025-05-06T00:00:05Z");
        let limit = Limit::Limited(2);

        for _ in 0..2 {
            ledger
                .check_and_increment(&user, QuotaType::Search, 1, limit, now, None)
                .await
                .unwrap();
        }
        ledger.roll_forward(&user, QuotaType::Search, now).await.unwrap();

        let denied = ledger
            .check_and_increment(&user, QuotaType::Search, 1, limit, now, None)
            .await
            .unwrap();
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, Some(0));
    }

    #[tokio::test]
    async fn test_new_day_starts_fresh_record() {
        let (ledger, _) = ledger();
        let user = UserId::new();
        let late = ts("2025-05-05T23:59:59Z");
        let limit = Limit::Limited(5);

        let first = ledger
            .check_and_increment(&user, QuotaType::Search, 5, limit, late, None)
            .await
            .unwrap();
        let second = ledger
            .check_and_increment(&user, QuotaType::Search, 1, limit, late + Duration::seconds(1), None)
            .await
            .unwrap();

        assert_eq!(first.usage_count, 5);
        assert!(second.allowed);
        assert_eq!(second.usage_count, 1);
        assert_eq!(second.period.start, first.period.end);
    }

    #[tokio::test]
    async fn test_zero_increment_rejected() {
        let (ledger, _) = ledger();
        let result = ledger
            .check_and_increment(
                &UserId::new(),
                QuotaType::Search,
                0,
                Limit::Unlimited,
                Utc::now(),
                None,
            )
            .await;
        assert!(matches!(result, Err(QuotaError::InvalidRequest(_))));
    }
}
