//! In-memory usage repository

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::models::{AdmissionRow, StaleKey, UsageRow};
use crate::repo::{IncrementOutcome, IncrementRequest, UsageRepository};

type UsageKey = (Uuid, String, DateTime<Utc>);
/// (user, quota type, idempotency key)
type AdmissionKey = (Uuid, String, String);

#[derive(Default)]
struct Faults {
    unavailable: AtomicBool,
    failing_resets: DashSet<Uuid>,
}

/// In-memory usage repository
#[derive(Default, Clone)]
pub struct MemoryUsageRepository {
    rows: Arc<DashMap<UsageKey, UsageRow>>,
    admissions: Arc<DashMap<AdmissionKey, AdmissionRow>>,
    faults: Arc<Faults>,
}

impl MemoryUsageRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a row directly, bypassing the ceiling check
    pub fn insert_row(&self, row: UsageRow) {
        let key = (row.user_id, row.quota_type.clone(), row.period_start);
        self.rows.insert(key, row);
    }

    /// Number of stored rows across all periods
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Make every operation fail with [`DbError::Unavailable`]
    pub fn set_unavailable(&self, unavailable: bool) {
        self.faults.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make resets and roll-forwards for one user fail
    pub fn fail_resets_for(&self, user_id: Uuid) {
        self.faults.failing_resets.insert(user_id);
    }

    fn check_available(&self) -> DbResult<()> {
        if self.faults.unavailable.load(Ordering::SeqCst) {
            return Err(DbError::Unavailable("usage store offline".into()));
        }
        Ok(())
    }

    fn check_resettable(&self, user_id: Uuid) -> DbResult<()> {
        self.check_available()?;
        if self.faults.failing_resets.contains(&user_id) {
            return Err(DbError::Unavailable(format!("reset refused for {user_id}")));
        }
        Ok(())
    }
}

fn replay(row: &AdmissionRow) -> IncrementOutcome {
    IncrementOutcome {
        allowed: row.allowed,
        usage_count: row.usage_count,
        period_start: row.period_start,
        replayed: true,
    }
}

#[async_trait]
impl UsageRepository for MemoryUsageRepository {
    async fn find(
        &self,
        user_id: Uuid,
        quota_type: &str,
        period_start: DateTime<Utc>,
    ) -> DbResult<Option<UsageRow>> {
        self.check_available()?;
        let key = (user_id, quota_type.to_string(), period_start);
        Ok(self.rows.get(&key).map(|r| r.value().clone()))
    }

    async fn increment_with_ceiling(&self, req: IncrementRequest) -> DbResult<IncrementOutcome> {
        self.check_available()?;

        let key = (req.user_id, req.quota_type.clone(), req.period_start);
        // Held until the end of the function: the entry lock is what makes
        // check, increment and key registration one step.
        let mut row = self.rows.entry(key).or_insert_with(|| UsageRow {
            user_id: req.user_id,
            quota_type: req.quota_type.clone(),
            period_start: req.period_start,
            period_end: req.period_end,
            usage_count: 0,
            updated_at: req.now,
        });

        let admission_key = req
            .idempotency_key
            .clone()
            .map(|key| (req.user_id, req.quota_type.clone(), key));
        if let Some(key) = &admission_key {
            if let Some(prior) = self.admissions.get(key) {
                return Ok(replay(prior.value()));
            }
        }

        let allowed = req
            .ceiling
            .is_none_or(|ceiling| row.usage_count.saturating_add(req.increment) <= ceiling);
        if allowed {
            row.usage_count = row.usage_count.saturating_add(req.increment);
            row.updated_at = req.now;
        }

        let outcome = IncrementOutcome {
            allowed,
            usage_count: row.usage_count,
            period_start: req.period_start,
            replayed: false,
        };

        if let Some(key) = admission_key {
            let idempotency_key = key.2.clone();
            self.admissions.insert(
                key,
                AdmissionRow {
                    idempotency_key,
                    user_id: req.user_id,
                    quota_type: req.quota_type,
                    period_start: req.period_start,
                    allowed,
                    usage_count: outcome.usage_count,
                    created_at: req.now,
                },
            );
        }

        Ok(outcome)
    }

    async fn reset(
        &self,
        user_id: Uuid,
        quota_type: &str,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        self.check_resettable(user_id)?;

        let key = (user_id, quota_type.to_string(), period_start);
        let mut row = self.rows.entry(key).or_insert_with(|| UsageRow {
            user_id,
            quota_type: quota_type.to_string(),
            period_start,
            period_end,
            usage_count: 0,
            updated_at: now,
        });
        row.usage_count = 0;
        row.updated_at = now;

        Ok(())
    }

    async fn roll_forward(
        &self,
        user_id: Uuid,
        quota_type: &str,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        self.check_resettable(user_id)?;

        let key = (user_id, quota_type.to_string(), period_start);
        self.rows.entry(key).or_insert_with(|| UsageRow {
            user_id,
            quota_type: quota_type.to_string(),
            period_start,
            period_end,
            usage_count: 0,
            updated_at: now,
        });

        Ok(())
    }

    async fn find_stale(&self, now: DateTime<Utc>, limit: i64) -> DbResult<Vec<StaleKey>> {
        self.check_available()?;

        let mut latest: HashMap<(Uuid, String), UsageRow> = HashMap::new();
        for entry in self.rows.iter() {
            let row = entry.value();
            let slot = (row.user_id, row.quota_type.clone());
            match latest.get(&slot) {
                Some(existing) if existing.period_start >= row.period_start => {}
                _ => {
                    latest.insert(slot, row.clone());
                }
            }
        }

        let mut keys: Vec<StaleKey> = latest
            .into_values()
            .filter(|row| row.period_end <= now && row.usage_count > 0)
            .map(|row| StaleKey {
                user_id: row.user_id,
                quota_type: row.quota_type,
            })
            .collect();
        keys.sort_by(|a, b| (a.user_id, &a.quota_type).cmp(&(b.user_id, &b.quota_type)));
        keys.truncate(usize::try_from(limit).unwrap_or(0));

        Ok(keys)
    }

    async fn find_live(&self, now: DateTime<Utc>) -> DbResult<Vec<UsageRow>> {
        self.check_available()?;

        let mut rows: Vec<UsageRow> = self
            .rows
            .iter()
            .map(|r| r.value().clone())
            .filter(|row| row.period_start <= now && now < row.period_end && row.usage_count > 0)
            .collect();
        rows.sort_by(|a, b| (a.user_id, &a.quota_type).cmp(&(b.user_id, &b.quota_type)));

        Ok(rows)
    }

    async fn history(
        &self,
        user_id: Uuid,
        quota_type: Option<&str>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> DbResult<Vec<UsageRow>> {
        self.check_available()?;

        let mut rows: Vec<UsageRow> = self
            .rows
            .iter()
            .map(|r| r.value().clone())
            .filter(|row| {
                row.user_id == user_id
                    && quota_type.is_none_or(|q| row.quota_type == q)
                    && row.period_start >= from
                    && row.period_start < to
            })
            .collect();
        rows.sort_by(|a, b| (a.period_start, &a.quota_type).cmp(&(b.period_start, &b.quota_type)));

        Ok(rows)
    }

    async fn purge_admissions(&self, before: DateTime<Utc>) -> DbResult<u64> {
        self.check_available()?;

        let initial = self.admissions.len();
        self.admissions.retain(|_, row| row.created_at >= before);
        Ok((initial - self.admissions.len()) as u64)
    }
}
