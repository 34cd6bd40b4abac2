//! Reset scheduler
//!
//! Rolls expired usage periods forward and writes one audit entry per run.
//! The ledger derives the active period from the clock, so the request path
//! never depends on this having run; a skipped or partial sweep only delays
//! the bookkeeping. Rolling forward only creates missing rows, so admissions
//! that land in the new period while a sweep is in flight are kept.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tally_db::{ResetLogRepository, ResetLogRow};
use tally_types::{ResetLog, SchedulerState, SchedulerStatus};
use tokio::sync::RwLock;
use tokio::time::MissedTickBehavior;
use tracing::instrument;
use uuid::Uuid;

use crate::ledger::UsageLedger;
use crate::QuotaError;

/// Periodic sweep over expired usage periods
pub struct ResetScheduler {
    ledger: Arc<UsageLedger>,
    logs: Arc<dyn ResetLogRepository>,
    running: AtomicBool,
    last_run: RwLock<Option<ResetLog>>,
    batch_size: i64,
    admission_retention: Duration,
}

/// Clears the running flag when a run ends, including on early return
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl ResetScheduler {
    /// Create a scheduler
    pub fn new(
        ledger: Arc<UsageLedger>,
        logs: Arc<dyn ResetLogRepository>,
        batch_size: i64,
        admission_retention: Duration,
    ) -> Self {
        Self {
            ledger,
            logs,
            running: AtomicBool::new(false),
            last_run: RwLock::new(None),
            batch_size,
            admission_retention,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> SchedulerState {
        if self.running.load(Ordering::Acquire) {
            SchedulerState::Running
        } else {
            SchedulerState::Idle
        }
    }

    /// State plus the most recent completed run
    pub async fn status(&self) -> SchedulerStatus {
        let last_run = self.last_run.read().await.clone();
        SchedulerStatus {
            state: self.state(),
            last_run_at: last_run.as_ref().map(|log| log.executed_at),
            last_run,
        }
    }

    /// Most recent audit entries, newest first
    pub async fn recent_logs(&self, limit: i64) -> Result<Vec<ResetLog>, QuotaError> {
        let rows = self.logs.recent(limit).await?;
        rows.iter()
            .map(|row| row.to_log().map_err(QuotaError::from))
            .collect()
    }

    /// Run one sweep now. Fails with [`QuotaError::SchedulerBusy`] if a
    /// sweep is already running.
    ///
    /// Individual reset failures are logged, counted in `failed_count` and
    /// skipped; they never abort the sweep. If the stale scan itself fails,
    /// the run is still logged with `failed_count = 1` before the error is
    /// returned.
    #[instrument(skip(self))]
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<ResetLog, QuotaError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(QuotaError::SchedulerBusy);
        }
        let _guard = RunGuard(&self.running);

        let started = Instant::now();
        let stale = match self.ledger.find_stale(now, self.batch_size).await {
            Ok(stale) => stale,
            Err(e) => {
                tracing::error!(error = %e, "Scanning for expired periods failed");
                metrics::counter!("quota_reset_items_total", "result" => "err").increment(1);
                let log = ResetLog {
                    id: Uuid::new_v4(),
                    executed_at: now,
                    users_reset: 0,
                    quotas_reset: 0,
                    failed_count: 1,
                    duration_ms: elapsed_ms(started),
                };
                self.record(&log).await;
                return Err(e);
            }
        };

        let mut users = HashSet::new();
        let mut quotas_reset = 0u64;
        let mut failed_count = 0u64;

        for key in &stale {
            let reset = match key.parts() {
                Ok((user_id, quota_type)) => self
                    .ledger
                    .roll_forward(&user_id, quota_type, now)
                    .await
                    .map(|()| user_id),
                Err(e) => Err(e.into()),
            };

            match reset {
                Ok(user_id) => {
                    users.insert(user_id);
                    quotas_reset += 1;
                    metrics::counter!("quota_reset_items_total", "result" => "ok").increment(1);
                }
                Err(e) => {
                    failed_count += 1;
                    metrics::counter!("quota_reset_items_total", "result" => "err").increment(1);
                    tracing::warn!(
                        user_id = %key.user_id,
                        quota_type = %key.quota_type,
                        error = %e,
                        "Reset failed, skipping"
                    );
                }
            }
        }

        if let Ok(retention) = chrono::Duration::from_std(self.admission_retention) {
            if let Err(e) = self.ledger.purge_admissions(now - retention).await {
                tracing::warn!(error = %e, "Purging idempotency keys failed");
            }
        }

        let log = ResetLog {
            id: Uuid::new_v4(),
            executed_at: now,
            users_reset: users.len() as u64,
            quotas_reset,
            failed_count,
            duration_ms: elapsed_ms(started),
        };

        self.record(&log).await;
        tracing::info!(
            users_reset = log.users_reset,
            quotas_reset = log.quotas_reset,
            failed = log.failed_count,
            duration_ms = log.duration_ms,
            "Reset run complete"
        );

        Ok(log)
    }

    /// Append the audit entry and remember it as the last run
    async fn record(&self, log: &ResetLog) {
        if let Err(e) = self.logs.append(ResetLogRow::from(log)).await {
            tracing::error!(error = %e, "Writing reset log failed");
        }
        metrics::counter!("quota_reset_runs_total").increment(1);
        *self.last_run.write().await = Some(log.clone());
    }

    /// Manual run at the current time
    pub async fn trigger(&self) -> Result<ResetLog, QuotaError> {
        tracing::info!("Manual reset run requested");
        self.run_once(Utc::now()).await
    }

    /// Run a sweep every `every` until the task is dropped or aborted.
    pub async fn run_forever(self: Arc<Self>, every: Duration) {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            match self.run_once(Utc::now()).await {
                Ok(_) => {}
                Err(QuotaError::SchedulerBusy) => {
                    tracing::debug!("Reset run still in progress, skipping tick");
                }
                Err(e) => tracing::error!(error = %e, "Reset run failed"),
            }
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

impl std::fmt::Debug for ResetScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResetScheduler")
            .field("state", &self.state())
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_db::memory::{MemoryResetLogRepository, MemoryUsageRepository};
    use tally_types::{Limit, QuotaType, UserId};

    fn scheduler() -> ResetScheduler {
        ResetScheduler::new(
            Arc::new(UsageLedger::new(Arc::new(MemoryUsageRepository::new()))),
            Arc::new(MemoryResetLogRepository::new()),
            100,
            Duration::from_secs(3600),
        )
    }

    #[tokio::test]
    async fn test_empty_run_still_logs() {
        let scheduler = scheduler();

        let log = scheduler.run_once(Utc::now()).await.unwrap();
        assert_eq!(log.quotas_reset, 0);
        assert_eq!(scheduler.recent_logs(10).await.unwrap(), vec![log.clone()]);

        let status = scheduler.status().await;
        assert_eq!(status.state, SchedulerState::Idle);
        assert_eq!(status.last_run, Some(log));
    }

    #[tokio::test]
    async fn test_concurrent_run_is_rejected() {
        let scheduler = scheduler();
        scheduler.running.store(true, Ordering::SeqCst);

        assert_eq!(scheduler.state(), SchedulerState::Running);
        assert!(matches!(
            scheduler.run_once(Utc::now()).await,
            Err(QuotaError::SchedulerBusy)
        ));
    }

    #[tokio::test]
    async fn test_failed_scan_is_still_logged() {
        let repo = MemoryUsageRepository::new();
        let scheduler = ResetScheduler::new(
            Arc::new(UsageLedger::new(Arc::new(repo.clone()))),
            Arc::new(MemoryResetLogRepository::new()),
            100,
            Duration::from_secs(3600),
        );
        repo.set_unavailable(true);
        let now = Utc::now();

        let result = scheduler.run_once(now).await;
        assert!(matches!(result, Err(QuotaError::StorageUnavailable(_))));

        let logs = scheduler.recent_logs(10).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].failed_count, 1);
        assert_eq!(logs[0].quotas_reset, 0);

        let status = scheduler.status().await;
        assert_eq!(status.state, SchedulerState::Idle);
        assert_eq!(status.last_run_at, Some(now));
    }

    #[tokio::test]
    async fn test_current_period_usage_is_not_reset() {
        let repo = MemoryUsageRepository::new();
        let ledger = Arc::new(UsageLedger::new(Arc::new(repo)));
        let scheduler = ResetScheduler::new(
            ledger.clone(),
            Arc::new(MemoryResetLogRepository::new()),
            100,
            Duration::from_secs(3600),
        );
        let user = UserId::new();
        let now = Utc::now();

        ledger
            .check_and_increment(&user, QuotaType::Search, 3, Limit::Limited(10), now, None)
            .await
            .unwrap();

        let log = scheduler.run_once(now).await.unwrap();
        assert_eq!(log.quotas_reset, 0);
        let usage = ledger.get_usage(&user, QuotaType::Search, now).await.unwrap();
        assert_eq!(usage.usage_count, 3);
    }
}
