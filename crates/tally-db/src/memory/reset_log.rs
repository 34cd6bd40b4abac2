//! In-memory reset log repository

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::DbResult;
use crate::models::ResetLogRow;
use crate::repo::ResetLogRepository;

/// In-memory reset log repository
#[derive(Default, Clone)]
pub struct MemoryResetLogRepository {
    logs: Arc<DashMap<Uuid, ResetLogRow>>,
}

impl MemoryResetLogRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResetLogRepository for MemoryResetLogRepository {
    async fn append(&self, log: ResetLogRow) -> DbResult<()> {
        self.logs.insert(log.id, log);
        Ok(())
    }

    async fn recent(&self, limit: i64) -> DbResult<Vec<ResetLogRow>> {
        let mut rows: Vec<ResetLogRow> = self.logs.iter().map(|r| r.value().clone()).collect();
        rows.sort_by(|a, b| b.executed_at.cmp(&a.executed_at));
        rows.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(rows)
    }
}
