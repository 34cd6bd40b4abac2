//! Upgrade prompt engine

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tally_db::{CreatePrompt, PromptRepository};
use tally_types::{Limit, PromptId, QuotaType, Tier, UpgradePrompt, UserId, Verdict};
use tracing::instrument;

use crate::ledger::UsageLedger;
use crate::policy::TierPolicyStore;
use crate::tier::TierResolver;
use crate::QuotaError;

/// Counts from one [`UpgradePromptEngine::sweep`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepSummary {
    /// Live records looked at
    pub evaluated: u64,
    /// Prompts newly created
    pub created: u64,
    /// Records skipped because tier, policy or storage failed
    pub failed: u64,
}

/// Creates and transitions upgrade prompts
#[derive(Clone)]
pub struct UpgradePromptEngine {
    repo: Arc<dyn PromptRepository>,
    threshold: f64,
}

impl UpgradePromptEngine {
    /// Create an engine prompting at `threshold` usage ratio
    pub fn new(repo: Arc<dyn PromptRepository>, threshold: f64) -> Self {
        Self { repo, threshold }
    }

    /// Usage ratio at which prompts are created
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Create a prompt if `usage` has crossed the threshold for a non-top
    /// tier and no open prompt exists for the pair.
    ///
    /// Returns the prompt only when this call created it.
    #[instrument(skip(self), fields(user_id = %user_id, quota_type = %quota_type))]
    pub async fn evaluate(
        &self,
        user_id: &UserId,
        quota_type: QuotaType,
        tier: Tier,
        usage: u64,
        limit: Limit,
        now: DateTime<Utc>,
    ) -> Result<Option<UpgradePrompt>, QuotaError> {
        let Some(suggested) = tier.next() else {
            return Ok(None);
        };
        match limit.usage_ratio(usage) {
            Some(ratio) if ratio >= self.threshold => {}
            _ => return Ok(None),
        }

        let created = self
            .repo
            .create_if_absent(CreatePrompt {
                id: PromptId::new().0,
                user_id: user_id.0,
                quota_type: quota_type.as_str().to_string(),
                current_tier: tier.as_str().to_string(),
                suggested_tier: suggested.as_str().to_string(),
                shown_at: now,
            })
            .await?;

        match created {
            Some(row) => {
                metrics::counter!("quota_prompts_created_total", "quota_type" => quota_type.as_str())
                    .increment(1);
                tracing::info!(tier = %tier, suggested = %suggested, usage, "Upgrade prompt created");
                Ok(Some(row.to_prompt()?))
            }
            None => Ok(None),
        }
    }

    /// [`evaluate`](Self::evaluate) against the figures in an admission verdict
    pub async fn evaluate_verdict(
        &self,
        user_id: &UserId,
        verdict: &Verdict,
        now: DateTime<Utc>,
    ) -> Result<Option<UpgradePrompt>, QuotaError> {
        self.evaluate(
            user_id,
            verdict.quota_type,
            verdict.tier,
            verdict.usage_count,
            verdict.limit,
            now,
        )
        .await
    }

    /// Evaluate every live current-period record. Per-record failures are
    /// logged and counted, never propagated.
    pub async fn sweep(
        &self,
        ledger: &UsageLedger,
        policies: &TierPolicyStore,
        tiers: &dyn TierResolver,
        now: DateTime<Utc>,
    ) -> Result<SweepSummary, QuotaError> {
        let records = ledger.live_records(now).await?;
        let mut summary = SweepSummary::default();

        for record in records {
            summary.evaluated += 1;

            let result = async {
                let tier = tiers.resolve_tier(&record.user_id).await?;
                let limit = policies.lookup(tier, record.quota_type)?;
                self.evaluate(
                    &record.user_id,
                    record.quota_type,
                    tier,
                    record.usage_count,
                    limit,
                    now,
                )
                .await
            }
            .await;

            match result {
                Ok(Some(_)) => summary.created += 1,
                Ok(None) => {}
                Err(e) => {
                    summary.failed += 1;
                    tracing::warn!(
                        user_id = %record.user_id,
                        quota_type = %record.quota_type,
                        error = %e,
                        "Prompt evaluation failed"
                    );
                }
            }
        }

        tracing::debug!(
            evaluated = summary.evaluated,
            created = summary.created,
            failed = summary.failed,
            "Prompt sweep complete"
        );
        Ok(summary)
    }

    /// Prompts for a user, newest first. Dismissed prompts are omitted
    /// unless `include_dismissed` is set.
    pub async fn list_prompts(
        &self,
        user_id: &UserId,
        include_dismissed: bool,
    ) -> Result<Vec<UpgradePrompt>, QuotaError> {
        let rows = self.repo.find_by_user(user_id.0, include_dismissed).await?;
        rows.iter()
            .map(|row| row.to_prompt().map_err(QuotaError::from))
            .collect()
    }

    /// Dismiss a prompt. Already-terminal prompts are returned unchanged.
    pub async fn dismiss(
        &self,
        id: PromptId,
        now: DateTime<Utc>,
    ) -> Result<UpgradePrompt, QuotaError> {
        let changed = self.repo.dismiss(id.0, now).await?;
        self.load_after_transition(id, changed, "dismiss").await
    }

    /// Record that the user upgraded from a prompt. Already-terminal prompts
    /// are returned unchanged.
    pub async fn mark_converted(
        &self,
        id: PromptId,
        now: DateTime<Utc>,
    ) -> Result<UpgradePrompt, QuotaError> {
        let changed = self.repo.mark_converted(id.0, now).await?;
        self.load_after_transition(id, changed, "convert").await
    }

    async fn load_after_transition(
        &self,
        id: PromptId,
        changed: bool,
        action: &'static str,
    ) -> Result<UpgradePrompt, QuotaError> {
        let row = self
            .repo
            .find_by_id(id.0)
            .await?
            .ok_or(QuotaError::PromptNotFound(id))?;

        if !changed {
            tracing::debug!(prompt_id = %id, action, "Prompt already terminal, ignoring");
        }
        Ok(row.to_prompt()?)
    }
}

impl std::fmt::Debug for UpgradePromptEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpgradePromptEngine")
            .field("threshold", &self.threshold)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_db::memory::MemoryPromptRepository;

    fn engine() -> UpgradePromptEngine {
        UpgradePromptEngine::new(Arc::new(MemoryPromptRepository::new()), 0.75)
    }

    #[tokio::test]
    async fn test_below_threshold_creates_nothing() {
        let engine = engine();
        let user = UserId::new();

        let prompt = engine
            .evaluate(&user, QuotaType::Search, Tier::Free, 14, Limit::Limited(20), Utc::now())
            .await
            .unwrap();

        assert!(prompt.is_none());
        assert!(engine.list_prompts(&user, true).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_threshold_crossing_creates_single_prompt() {
        let engine = engine();
        let user = UserId::new();
        let now = Utc::now();

        let first = engine
            .evaluate(&user, QuotaType::Search, Tier::Free, 15, Limit::Limited(20), now)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.suggested_tier, Tier::Pro);

        for usage in 16..=20 {
            let again = engine
                .evaluate(&user, QuotaType::Search, Tier::Free, usage, Limit::Limited(20), now)
                .await
                .unwrap();
            assert!(again.is_none());
        }
        assert_eq!(engine.list_prompts(&user, false).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_top_tier_and_unlimited_never_prompt() {
        let engine = engine();
        let user = UserId::new();
        let now = Utc::now();

        let top = engine
            .evaluate(&user, QuotaType::Export, Tier::Enterprise, 100, Limit::Limited(10), now)
            .await
            .unwrap();
        let unlimited = engine
            .evaluate(&user, QuotaType::Export, Tier::Pro, 1_000_000, Limit::Unlimited, now)
            .await
            .unwrap();

        assert!(top.is_none());
        assert!(unlimited.is_none());
    }

    #[tokio::test]
    async fn test_terminal_transitions_are_no_ops() {
        let engine = engine();
        let user = UserId::new();
        let now = Utc::now();
        let prompt = engine
            .evaluate(&user, QuotaType::Search, Tier::Pro, 200, Limit::Limited(200), now)
            .await
            .unwrap()
            .unwrap();

        let dismissed = engine.dismiss(prompt.id, now).await.unwrap();
        assert_eq!(dismissed.dismissed_at, Some(now));

        let later = now + chrono::Duration::minutes(5);
        let converted = engine.mark_converted(prompt.id, later).await.unwrap();
        assert_eq!(converted.dismissed_at, Some(now));
        assert_eq!(converted.converted_at, None);

        let again = engine.dismiss(prompt.id, later).await.unwrap();
        assert_eq!(again.dismissed_at, Some(now));
    }

    #[tokio::test]
    async fn test_dismissed_prompt_allows_new_one() {
        let engine = engine();
        let user = UserId::new();
        let now = Utc::now();
        let first = engine
            .evaluate(&user, QuotaType::Search, Tier::Free, 20, Limit::Limited(20), now)
            .await
            .unwrap()
            .unwrap();
        engine.dismiss(first.id, now).await.unwrap();

        let second = engine
            .evaluate(&user, QuotaType::Search, Tier::Free, 20, Limit::Limited(20), now)
            .await
            .unwrap();

        assert!(second.is_some());
        assert_eq!(engine.list_prompts(&user, false).await.unwrap().len(), 1);
        assert_eq!(engine.list_prompts(&user, true).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_prompt_is_not_found() {
        let result = engine().dismiss(PromptId::new(), Utc::now()).await;
        assert!(matches!(result, Err(QuotaError::PromptNotFound(_))));
    }
}
