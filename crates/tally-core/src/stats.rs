//! Read-side usage rollups

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Days, NaiveDate, Utc};
use tally_types::{DailyUsage, Limit, QuotaType, StatsSummary, UserId};

use crate::ledger::UsageLedger;
use crate::QuotaError;

/// Statistics over ledger history. Never writes.
#[derive(Debug, Clone)]
pub struct StatisticsAggregator {
    ledger: Arc<UsageLedger>,
}

impl StatisticsAggregator {
    pub fn new(ledger: Arc<UsageLedger>) -> Self {
        Self { ledger }
    }

    /// Summary over the trailing `days` calendar days ending today.
    ///
    /// Days without a record count as zero, so the average is always taken
    /// over `days`.
    pub async fn statistics(
        &self,
        user_id: &UserId,
        quota_type: QuotaType,
        days: u32,
        limit: Limit,
        now: DateTime<Utc>,
    ) -> Result<StatsSummary, QuotaError> {
        let dates = window(days, now)?;
        let (first, last) = (dates[0], dates[dates.len() - 1]);

        let mut by_date: BTreeMap<NaiveDate, u64> = dates.iter().map(|d| (*d, 0)).collect();
        for record in self
            .ledger
            .history(user_id, Some(quota_type), first, last)
            .await?
        {
            if let Some(count) = by_date.get_mut(&record.period_start.date_naive()) {
                *count += record.usage_count;
            }
        }

        let daily: Vec<u64> = by_date.into_values().collect();
        Ok(summarize(quota_type, limit, &daily))
    }

    /// Per-day usage for every quota type over the trailing `days` days,
    /// oldest first
    pub async fn daily_usage(
        &self,
        user_id: &UserId,
        days: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<DailyUsage>, QuotaError> {
        let dates = window(days, now)?;
        let (first, last) = (dates[0], dates[dates.len() - 1]);

        let mut by_date: BTreeMap<NaiveDate, DailyUsage> = dates
            .iter()
            .map(|d| (*d, DailyUsage::zeroed(*d)))
            .collect();
        for record in self.ledger.history(user_id, None, first, last).await? {
            if let Some(day) = by_date.get_mut(&record.period_start.date_naive()) {
                *day.counts.entry(record.quota_type).or_insert(0) += record.usage_count;
            }
        }

        Ok(by_date.into_values().collect())
    }
}

/// Dates of the trailing window, oldest first
fn window(days: u32, now: DateTime<Utc>) -> Result<Vec<NaiveDate>, QuotaError> {
    if days == 0 {
        return Err(QuotaError::InvalidRequest("days must be positive".into()));
    }
    let today = now.date_naive();
    (0..days)
        .rev()
        .map(|back| {
            today
                .checked_sub_days(Days::new(u64::from(back)))
                .ok_or_else(|| QuotaError::InvalidRequest(format!("window of {days} days out of range")))
        })
        .collect()
}

/// Roll up per-day counts. `daily` holds one entry per day of the window,
/// zeros included.
#[allow(clippy::cast_precision_loss)]
pub fn summarize(quota_type: QuotaType, limit: Limit, daily: &[u64]) -> StatsSummary {
    let total_usage: u64 = daily.iter().sum();
    let days = u32::try_from(daily.len()).unwrap_or(u32::MAX);

    StatsSummary {
        quota_type,
        days,
        total_usage,
        avg_daily_usage: if daily.is_empty() {
            0.0
        } else {
            total_usage as f64 / daily.len() as f64
        },
        max_daily_usage: daily.iter().copied().max().unwrap_or(0),
        days_at_limit: u32::try_from(daily.iter().filter(|u| limit.is_reached_by(**u)).count())
            .unwrap_or(u32::MAX),
    }
}
