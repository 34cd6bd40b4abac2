//! PostgreSQL reset log repository implementation

use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::DbResult;
use crate::models::ResetLogRow;
use crate::repo::ResetLogRepository;

/// PostgreSQL reset log repository
#[derive(Clone)]
pub struct PgResetLogRepository {
    pool: PgPool,
}

impl PgResetLogRepository {
    /// Create a new reset log repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResetLogRepository for PgResetLogRepository {
    async fn append(&self, log: ResetLogRow) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO reset_logs (id, executed_at, users_reset, quotas_reset, failed_count, duration_ms)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(log.id)
        .bind(log.executed_at)
        .bind(log.users_reset)
        .bind(log.quotas_reset)
        .bind(log.failed_count)
        .bind(log.duration_ms)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn recent(&self, limit: i64) -> DbResult<Vec<ResetLogRow>> {
        let rows = sqlx::query_as::<_, ResetLogRow>(
            r#"
            SELECT id, executed_at, users_reset, quotas_reset, failed_count, duration_ms
            FROM reset_logs
            ORDER BY executed_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
