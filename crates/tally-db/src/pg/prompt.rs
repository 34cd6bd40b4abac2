//! PostgreSQL upgrade prompt repository implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::DbResult;
use crate::models::PromptRow;
use crate::repo::{CreatePrompt, PromptRepository};

/// PostgreSQL upgrade prompt repository
#[derive(Clone)]
pub struct PgPromptRepository {
    pool: PgPool,
}

impl PgPromptRepository {
    /// Create a new prompt repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PromptRepository for PgPromptRepository {
    async fn create_if_absent(&self, prompt: CreatePrompt) -> DbResult<Option<PromptRow>> {
        // The partial unique index on open prompts makes this a single
        // atomic check-and-insert.
        let row = sqlx::query_as::<_, PromptRow>(
            r#"
            INSERT INTO upgrade_prompts (id, user_id, quota_type, current_tier, suggested_tier, shown_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (user_id, quota_type)
                WHERE dismissed_at IS NULL AND converted_at IS NULL
                DO NOTHING
            RETURNING id, user_id, quota_type, current_tier, suggested_tier,
                      shown_at, dismissed_at, converted_at
            "#,
        )
        .bind(prompt.id)
        .bind(prompt.user_id)
        .bind(&prompt.quota_type)
        .bind(&prompt.current_tier)
        .bind(&prompt.suggested_tier)
        .bind(prompt.shown_at)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn find_by_id(&self, id: Uuid) -> DbResult<Option<PromptRow>> {
        let row = sqlx::query_as::<_, PromptRow>(
            r#"
            SELECT id, user_id, quota_type, current_tier, suggested_tier,
                   shown_at, dismissed_at, converted_at
            FROM upgrade_prompts
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn find_by_user(
        &self,
        user_id: Uuid,
        include_dismissed: bool,
    ) -> DbResult<Vec<PromptRow>> {
        let rows = sqlx::query_as::<_, PromptRow>(
            r#"
            SELECT id, user_id, quota_type, current_tier, suggested_tier,
                   shown_at, dismissed_at, converted_at
            FROM upgrade_prompts
            WHERE user_id = $1 AND ($2 OR dismissed_at IS NULL)
            ORDER BY shown_at DESC
            "#,
        )
        .bind(user_id)
        .bind(include_dismissed)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn dismiss(&self, id: Uuid, at: DateTime<Utc>) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE upgrade_prompts
            SET dismissed_at = $2
            WHERE id = $1 AND dismissed_at IS NULL AND converted_at IS NULL
            "#,
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_converted(&self, id: Uuid, at: DateTime<Utc>) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE upgrade_prompts
            SET converted_at = $2
            WHERE id = $1 AND dismissed_at IS NULL AND converted_at IS NULL
            "#,
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
