//! Database row models
//!
//! These types map directly to database rows using SQLx's FromRow derive.
//! Enumerations are stored as text and mapped back to domain types here.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use tally_types::{PromptId, QuotaType, ResetLog, Tier, UpgradePrompt, UsageRecord, UserId};
use uuid::Uuid;

use crate::error::{DbError, DbResult};

/// Usage counter row
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct UsageRow {
    pub user_id: Uuid,
    pub quota_type: String,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub usage_count: i64,
    pub updated_at: DateTime<Utc>,
}

/// Upgrade prompt row
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct PromptRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub quota_type: String,
    pub current_tier: String,
    pub suggested_tier: String,
    pub shown_at: DateTime<Utc>,
    pub dismissed_at: Option<DateTime<Utc>>,
    pub converted_at: Option<DateTime<Utc>>,
}

/// Reset log row
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct ResetLogRow {
    pub id: Uuid,
    pub executed_at: DateTime<Utc>,
    pub users_reset: i64,
    pub quotas_reset: i64,
    pub failed_count: i64,
    pub duration_ms: i64,
}

/// Stored outcome of an idempotent admission
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct AdmissionRow {
    pub idempotency_key: String,
    pub user_id: Uuid,
    pub quota_type: String,
    pub period_start: DateTime<Utc>,
    pub allowed: bool,
    pub usage_count: i64,
    pub created_at: DateTime<Utc>,
}

/// Key of a (user, quota type) pair whose latest period has ended
#[derive(Debug, Clone, PartialEq, Eq, Hash, FromRow)]
pub struct StaleKey {
    pub user_id: Uuid,
    pub quota_type: String,
}

fn parse_quota_type(raw: &str) -> DbResult<QuotaType> {
    raw.parse()
        .map_err(|e: tally_types::QuotaTypeParseError| DbError::Decode(e.to_string()))
}

fn parse_tier(raw: &str) -> DbResult<Tier> {
    raw.parse()
        .map_err(|e: tally_types::TierParseError| DbError::Decode(e.to_string()))
}

fn to_count(raw: i64) -> DbResult<u64> {
    u64::try_from(raw).map_err(|_| DbError::Decode(format!("negative count {raw}")))
}

impl UsageRow {
    /// Convert to domain UserId
    pub fn user_id(&self) -> UserId {
        UserId(self.user_id)
    }

    /// Convert to domain usage record
    pub fn to_record(&self) -> DbResult<UsageRecord> {
        Ok(UsageRecord {
            user_id: self.user_id(),
            quota_type: parse_quota_type(&self.quota_type)?,
            period_start: self.period_start,
            period_end: self.period_end,
            usage_count: to_count(self.usage_count)?,
            updated_at: self.updated_at,
        })
    }
}

impl PromptRow {
    /// Convert to domain upgrade prompt
    pub fn to_prompt(&self) -> DbResult<UpgradePrompt> {
        Ok(UpgradePrompt {
            id: PromptId(self.id),
            user_id: UserId(self.user_id),
            quota_type: parse_quota_type(&self.quota_type)?,
            current_tier: parse_tier(&self.current_tier)?,
            suggested_tier: parse_tier(&self.suggested_tier)?,
            shown_at: self.shown_at,
            dismissed_at: self.dismissed_at,
            converted_at: self.converted_at,
        })
    }

    /// Whether the prompt has been dismissed or converted
    pub fn is_terminal(&self) -> bool {
        self.dismissed_at.is_some() || self.converted_at.is_some()
    }
}

impl ResetLogRow {
    /// Convert to domain reset log
    pub fn to_log(&self) -> DbResult<ResetLog> {
        Ok(ResetLog {
            id: self.id,
            executed_at: self.executed_at,
            users_reset: to_count(self.users_reset)?,
            quotas_reset: to_count(self.quotas_reset)?,
            failed_count: to_count(self.failed_count)?,
            duration_ms: to_count(self.duration_ms)?,
        })
    }
}

impl From<&ResetLog> for ResetLogRow {
    fn from(log: &ResetLog) -> Self {
        let clamp = |v: u64| i64::try_from(v).unwrap_or(i64::MAX);
        Self {
            id: log.id,
            executed_at: log.executed_at,
            users_reset: clamp(log.users_reset),
            quotas_reset: clamp(log.quotas_reset),
            failed_count: clamp(log.failed_count),
            duration_ms: clamp(log.duration_ms),
        }
    }
}

impl StaleKey {
    /// Domain user and quota type of this key
    pub fn parts(&self) -> DbResult<(UserId, QuotaType)> {
        Ok((UserId(self.user_id), parse_quota_type(&self.quota_type)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage_row(quota_type: &str, count: i64) -> UsageRow {
        let now = Utc::now();
        UsageRow {
            user_id: Uuid::new_v4(),
            quota_type: quota_type.to_string(),
            period_start: now,
            period_end: now + chrono::Duration::days(1),
            usage_count: count,
            updated_at: now,
        }
    }

    #[test]
    fn test_usage_row_to_record() {
        let record = usage_row("api_call", 7).to_record().unwrap();
        assert_eq!(record.quota_type, QuotaType::ApiCall);
        assert_eq!(record.usage_count, 7);
    }

    #[test]
    fn test_usage_row_rejects_bad_values() {
        assert!(matches!(
            usage_row("download", 1).to_record(),
            Err(DbError::Decode(_))
        ));
        assert!(matches!(
            usage_row("search", -1).to_record(),
            Err(DbError::Decode(_))
        ));
    }
}
