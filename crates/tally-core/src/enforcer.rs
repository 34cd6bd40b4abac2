//! Request-path quota gate

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tally_types::{QuotaType, Tier, UserId, Verdict};
use tracing::instrument;

use crate::ledger::UsageLedger;
use crate::policy::TierPolicyStore;
use crate::tier::TierResolver;
use crate::QuotaError;

/// One admission attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionRequest {
    /// User performing the action
    pub user_id: UserId,
    /// Quota the action counts against
    pub quota_type: QuotaType,
    /// Units the action consumes
    pub increment: u64,
    /// Caller-chosen key identifying this logical attempt across retries
    pub idempotency_key: Option<String>,
}

impl AdmissionRequest {
    /// Request for a single unit
    #[must_use]
    pub fn new(user_id: UserId, quota_type: QuotaType) -> Self {
        Self {
            user_id,
            quota_type,
            increment: 1,
            idempotency_key: None,
        }
    }

    /// Set the number of units consumed
    #[must_use]
    pub fn with_increment(mut self, increment: u64) -> Self {
        self.increment = increment;
        self
    }

    /// Attach an idempotency key
    #[must_use]
    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

/// Resolves tier and policy, then asks the ledger for an atomic decision.
///
/// Performs no retries; the only side effect is the ledger write on admit.
#[derive(Clone)]
pub struct QuotaEnforcer {
    policies: Arc<TierPolicyStore>,
    ledger: Arc<UsageLedger>,
    tiers: Arc<dyn TierResolver>,
}

impl QuotaEnforcer {
    /// Create an enforcer
    pub fn new(
        policies: Arc<TierPolicyStore>,
        ledger: Arc<UsageLedger>,
        tiers: Arc<dyn TierResolver>,
    ) -> Self {
        Self {
            policies,
            ledger,
            tiers,
        }
    }

    /// Tier for a user, falling back to the most restrictive tier when the
    /// profile system cannot answer
    pub async fn tier_for(&self, user_id: &UserId) -> Tier {
        match self.tiers.resolve_tier(user_id).await {
            Ok(tier) => tier,
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "Tier lookup failed, using most restrictive tier");
                Tier::most_restrictive()
            }
        }
    }

    /// Decide whether the action may proceed.
    ///
    /// `Ok` with `allowed == false` is a quota denial. `Err` means no
    /// decision could be made and the action must not run either.
    #[instrument(
        skip(self, req),
        fields(user_id = %req.user_id, quota_type = %req.quota_type, increment = req.increment)
    )]
    pub async fn admit(
        &self,
        req: &AdmissionRequest,
        now: DateTime<Utc>,
    ) -> Result<Verdict, QuotaError> {
        let tier = self.tier_for(&req.user_id).await;

        let limit = match self.policies.lookup(tier, req.quota_type) {
            Ok(limit) => limit,
            Err(e) => {
                tracing::warn!(tier = %tier, error = %e, "No policy, denying");
                record_admission(req.quota_type, "error");
                return Err(e);
            }
        };

        let outcome = match self
            .ledger
            .check_and_increment(
                &req.user_id,
                req.quota_type,
                req.increment,
                limit,
                now,
                req.idempotency_key.as_deref(),
            )
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                record_admission(req.quota_type, "error");
                return Err(e);
            }
        };

        if outcome.allowed {
            record_admission(req.quota_type, "allowed");
        } else {
            record_admission(req.quota_type, "denied");
            tracing::info!(
                tier = %tier,
                usage = outcome.usage_count,
                limit = %limit,
                "Quota exceeded"
            );
        }

        Ok(Verdict {
            allowed: outcome.allowed,
            tier,
            quota_type: req.quota_type,
            usage_count: outcome.usage_count,
            limit,
            remaining: outcome.remaining,
            period_start: outcome.period.start,
            period_end: outcome.period.end,
            suggested_tier: self.policies.next_tier(tier),
            replayed: outcome.replayed,
        })
    }
}

fn record_admission(quota_type: QuotaType, result: &'static str) {
    metrics::counter!(
        "quota_admissions_total",
        "quota_type" => quota_type.as_str(),
        "result" => result
    )
    .increment(1);
}

impl std::fmt::Debug for QuotaEnforcer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuotaEnforcer")
            .field("policies", &self.policies)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_db::memory::{MemoryUsageRepository, MemoryUserRepository};
    use tally_types::{Limit, TierLimit};

    use crate::tier::CachedTierResolver;

    fn enforcer(policies: TierPolicyStore, users: MemoryUserRepository) -> QuotaEnforcer {
        QuotaEnforcer::new(
            Arc::new(policies),
            Arc::new(UsageLedger::new(Arc::new(MemoryUsageRepository::new()))),
            Arc::new(CachedTierResolver::new(Arc::new(users))),
        )
    }

    #[tokio::test]
    async fn test_profile_outage_uses_free_limits() {
        let users = MemoryUserRepository::new();
        let user = UserId::new();
        users.set_tier(user.0, "enterprise");
        users.set_unavailable(true);
        let gate = enforcer(TierPolicyStore::default(), users);

        let verdict = gate
            .admit(&AdmissionRequest::new(user, QuotaType::Export), Utc::now())
            .await
            .unwrap();

        assert_eq!(verdict.tier, Tier::Free);
        assert_eq!(verdict.limit, Limit::Limited(5));
        assert_eq!(verdict.suggested_tier, Some(Tier::Pro));
    }

    #[tokio::test]
    async fn test_missing_policy_fails_closed() {
        let policies = TierPolicyStore::from_entries([TierLimit {
            tier: Tier::Free,
            quota_type: QuotaType::Search,
            limit: Limit::Limited(1),
        }])
        .unwrap();
        let gate = enforcer(policies, MemoryUserRepository::new());

        let result = gate
            .admit(&AdmissionRequest::new(UserId::new(), QuotaType::ApiCall), Utc::now())
            .await;

        assert!(matches!(result, Err(QuotaError::PolicyNotFound { .. })));
    }

    #[tokio::test]
    async fn test_top_tier_has_no_suggestion() {
        let users = MemoryUserRepository::new();
        let user = UserId::new();
        users.set_tier(user.0, "enterprise");
        let gate = enforcer(TierPolicyStore::default(), users);

        let verdict = gate
            .admit(&AdmissionRequest::new(user, QuotaType::Search), Utc::now())
            .await
            .unwrap();

        assert!(verdict.allowed);
        assert_eq!(verdict.remaining, None);
        assert_eq!(verdict.suggested_tier, None);
    }
}
