//! PostgreSQL usage repository implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::models::{AdmissionRow, StaleKey, UsageRow};
use crate::repo::{IncrementOutcome, IncrementRequest, UsageRepository};

/// PostgreSQL usage repository
#[derive(Clone)]
pub struct PgUsageRepository {
    pool: PgPool,
}

impl PgUsageRepository {
    /// Create a new usage repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

async fn find_admission<'e, E: PgExecutor<'e>>(
    executor: E,
    user_id: Uuid,
    quota_type: &str,
    key: &str,
) -> DbResult<Option<AdmissionRow>> {
    let row = sqlx::query_as::<_, AdmissionRow>(
        r#"
        SELECT idempotency_key, user_id, quota_type, period_start, allowed, usage_count, created_at
        FROM admission_attempts
        WHERE user_id = $1 AND quota_type = $2 AND idempotency_key = $3
        "#,
    )
    .bind(user_id)
    .bind(quota_type)
    .bind(key)
    .fetch_optional(executor)
    .await?;

    Ok(row)
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
impl UsageRepository for PgUsageRepository {
    async fn find(
        &self,
        user_id: Uuid,
        quota_type: &str,
        period_start: DateTime<Utc>,
    ) -> DbResult<Option<UsageRow>> {
        let row = sqlx::query_as::<_, UsageRow>(
            r#"
            SELECT user_id, quota_type, period_start, period_end, usage_count, updated_at
            FROM usage_records
            WHERE user_id = $1 AND quota_type = $2 AND period_start = $3
            "#,
        )
        .bind(user_id)
        .bind(quota_type)
        .bind(period_start)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn increment_with_ceiling(&self, req: IncrementRequest) -> DbResult<IncrementOutcome> {
        let mut tx = self.pool.begin().await?;

        if let Some(key) = req.idempotency_key.as_deref() {
            let prior = find_admission(&mut *tx, req.user_id, &req.quota_type, key).await?;
            if let Some(prior) = prior {
                tx.commit().await?;
                return Ok(replay(&prior));
            }
        }

        sqlx::query(
            r#"
            INSERT INTO usage_records (user_id, quota_type, period_start, period_end, usage_count, updated_at)
            VALUES ($1, $2, $3, $4, 0, $5)
            ON CONFLICT (user_id, quota_type, period_start) DO NOTHING
            "#,
        )
        .bind(req.user_id)
        .bind(&req.quota_type)
        .bind(req.period_start)
        .bind(req.period_end)
        .bind(req.now)
        .execute(&mut *tx)
        .await?;

        // The row lock taken by UPDATE serializes concurrent callers and the
        // ceiling predicate is re-evaluated against the latest committed count.
        let updated: Option<(i64,)> = sqlx::query_as(
            r#"
            UPDATE usage_records
            SET usage_count = usage_count + $4, updated_at = $6
            WHERE user_id = $1 AND quota_type = $2 AND period_start = $3
              AND ($5::BIGINT IS NULL OR usage_count + $4 <= $5)
            RETURNING usage_count
            "#,
        )
        .bind(req.user_id)
        .bind(&req.quota_type)
        .bind(req.period_start)
        .bind(req.increment)
        .bind(req.ceiling)
        .bind(req.now)
        .fetch_optional(&mut *tx)
        .await?;

        let outcome = match updated {
            Some((usage_count,)) => IncrementOutcome {
                allowed: true,
                usage_count,
                period_start: req.period_start,
                replayed: false,
            },
            None => {
                let (usage_count,): (i64,) = sqlx::query_as(
                    r#"
                    SELECT usage_count
                    FROM usage_records
                    WHERE user_id = $1 AND quota_type = $2 AND period_start = $3
                    "#,
                )
                .bind(req.user_id)
                .bind(&req.quota_type)
                .bind(req.period_start)
                .fetch_one(&mut *tx)
                .await?;

                IncrementOutcome {
                    allowed: false,
                    usage_count,
                    period_start: req.period_start,
                    replayed: false,
                }
            }
        };

        if let Some(key) = req.idempotency_key.as_deref() {
            let inserted = sqlx::query(
                r#"
                INSERT INTO admission_attempts
                    (idempotency_key, user_id, quota_type, period_start, allowed, usage_count, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (user_id, quota_type, idempotency_key) DO NOTHING
                "#,
            )
            .bind(key)
            .bind(req.user_id)
            .bind(&req.quota_type)
            .bind(req.period_start)
            .bind(outcome.allowed)
            .bind(outcome.usage_count)
            .bind(req.now)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            if inserted == 0 {
                // A concurrent attempt with the same key committed first;
                // discard this increment and report theirs.
                tx.rollback().await?;
                let prior = find_admission(&self.pool, req.user_id, &req.quota_type, key)
                    .await?
                    .ok_or(DbError::NotFound)?;
                return Ok(replay(&prior));
            }
        }

        tx.commit().await?;
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
        sqlx::query(
            r#"
            INSERT INTO usage_records (user_id, quota_type, period_start, period_end, usage_count, updated_at)
            VALUES ($1, $2, $3, $4, 0, $5)
            ON CONFLICT (user_id, quota_type, period_start)
            DO UPDATE SET usage_count = 0, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(user_id)
        .bind(quota_type)
        .bind(period_start)
        .bind(period_end)
        .bind(now)
        .execute(&self.pool)
        .await?;

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
        sqlx::query(
            r#"
            INSERT INTO usage_records (user_id, quota_type, period_start, period_end, usage_count, updated_at)
            VALUES ($1, $2, $3, $4, 0, $5)
            ON CONFLICT (user_id, quota_type, period_start) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(quota_type)
        .bind(period_start)
        .bind(period_end)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_stale(&self, now: DateTime<Utc>, limit: i64) -> DbResult<Vec<StaleKey>> {
        let keys = sqlx::query_as::<_, StaleKey>(
            r#"
            SELECT latest.user_id, latest.quota_type
            FROM (
                SELECT DISTINCT ON (user_id, quota_type)
                    user_id, quota_type, period_end, usage_count
                FROM usage_records
                ORDER BY user_id, quota_type, period_start DESC
            ) AS latest
            WHERE latest.period_end <= $1 AND latest.usage_count > 0
            ORDER BY latest.user_id, latest.quota_type
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(keys)
    }

    async fn find_live(&self, now: DateTime<Utc>) -> DbResult<Vec<UsageRow>> {
        let rows = sqlx::query_as::<_, UsageRow>(
            r#"
            SELECT user_id, quota_type, period_start, period_end, usage_count, updated_at
            FROM usage_records
            WHERE period_start <= $1 AND period_end > $1 AND usage_count > 0
            ORDER BY user_id, quota_type
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn history(
        &self,
        user_id: Uuid,
        quota_type: Option<&str>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> DbResult<Vec<UsageRow>> {
        let rows = sqlx::query_as::<_, UsageRow>(
            r#"
            SELECT user_id, quota_type, period_start, period_end, usage_count, updated_at
            FROM usage_records
            WHERE user_id = $1
              AND ($2::TEXT IS NULL OR quota_type = $2)
              AND period_start >= $3 AND period_start < $4
            ORDER BY period_start, quota_type
            "#,
        )
        .bind(user_id)
        .bind(quota_type)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn purge_admissions(&self, before: DateTime<Utc>) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM admission_attempts WHERE created_at < $1")
            .bind(before)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
