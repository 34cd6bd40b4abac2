//! Common test utilities for tally-core integration tests

#![allow(dead_code)]

use chrono::{DateTime, Utc};
use tally_core::{QuotaConfig, QuotaService};
use tally_db::memory::MemoryRepositories;
use tally_db::UsageRow;
use tally_types::{QuotaType, Tier, UserId};

/// Service over in-memory repositories, with the repositories kept
/// reachable for seeding and fault injection
pub struct Harness {
    pub service: QuotaService,
    pub repos: MemoryRepositories,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(QuotaConfig::default())
    }

    pub fn with_config(config: QuotaConfig) -> Self {
        let repos = MemoryRepositories::new();
        let service = QuotaService::in_memory(config, &repos);
        Self { service, repos }
    }

    /// Register a user on a tier
    pub fn user(&self, tier: Tier) -> UserId {
        let user = UserId::new();
        self.repos.users.set_tier(user.0, tier.as_str());
        user
    }

    /// Store a usage row for the day starting at `period_start`
    pub fn seed(&self, user: &UserId, quota_type: QuotaType, period_start: DateTime<Utc>, count: i64) {
        self.repos.usage.insert_row(UsageRow {
            user_id: user.0,
            quota_type: quota_type.as_str().to_string(),
            period_start,
            period_end: period_start + chrono::Duration::days(1),
            usage_count: count,
            updated_at: period_start,
        });
    }
}

pub fn ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .expect("valid timestamp")
        .with_timezone(&Utc)
}
