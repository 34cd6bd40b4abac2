//! Quota service facade
//!
//! Wires the policy table, ledger, tier resolver, enforcer, scheduler,
//! prompt engine and statistics into one handle for the HTTP layer.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tally_db::memory::MemoryRepositories;
use tally_db::{PromptRepository, Repositories, ResetLogRepository, UsageRepository, UserRepository};
use tally_types::{
    DailyUsage, PromptId, QuotaType, ResetLog, SchedulerStatus, StatsSummary, UpgradePrompt,
    UsageRecord, UserId, Verdict,
};

use crate::config::QuotaConfig;
use crate::enforcer::{AdmissionRequest, QuotaEnforcer};
use crate::ledger::UsageLedger;
use crate::policy::TierPolicyStore;
use crate::prompt::{SweepSummary, UpgradePromptEngine};
use crate::scheduler::ResetScheduler;
use crate::stats::StatisticsAggregator;
use crate::tier::{CachedTierResolver, TierResolver};
use crate::QuotaError;

/// Quota engine entry point
#[derive(Clone)]
pub struct QuotaService {
    policies: Arc<TierPolicyStore>,
    ledger: Arc<UsageLedger>,
    tiers: Arc<dyn TierResolver>,
    enforcer: QuotaEnforcer,
    scheduler: Arc<ResetScheduler>,
    prompts: UpgradePromptEngine,
    stats: StatisticsAggregator,
}

impl QuotaService {
    /// Create a service over explicit repositories
    pub fn new(
        config: QuotaConfig,
        usage: Arc<dyn UsageRepository>,
        prompts: Arc<dyn PromptRepository>,
        reset_logs: Arc<dyn ResetLogRepository>,
        users: Arc<dyn UserRepository>,
    ) -> Self {
        let tiers: Arc<dyn TierResolver> = Arc::new(CachedTierResolver::with_cache(
            users,
            config.tier_cache_ttl,
            config.tier_cache_capacity,
        ));
        Self::with_tier_resolver(config, usage, prompts, reset_logs, tiers)
    }

    /// Create a service with a custom tier resolver
    pub fn with_tier_resolver(
        config: QuotaConfig,
        usage: Arc<dyn UsageRepository>,
        prompts: Arc<dyn PromptRepository>,
        reset_logs: Arc<dyn ResetLogRepository>,
        tiers: Arc<dyn TierResolver>,
    ) -> Self {
        let policies = Arc::new(config.policies);
        let ledger = Arc::new(UsageLedger::new(usage));

        Self {
            enforcer: QuotaEnforcer::new(policies.clone(), ledger.clone(), tiers.clone()),
            scheduler: Arc::new(ResetScheduler::new(
                ledger.clone(),
                reset_logs,
                config.reset_batch_size,
                config.admission_retention,
            )),
            prompts: UpgradePromptEngine::new(prompts, config.prompt_threshold),
            stats: StatisticsAggregator::new(ledger.clone()),
            policies,
            ledger,
            tiers,
        }
    }

    /// Create a service backed by PostgreSQL
    pub fn from_repositories(config: QuotaConfig, repos: Repositories) -> Self {
        Self::new(
            config,
            Arc::new(repos.usage),
            Arc::new(repos.prompts),
            Arc::new(repos.reset_logs),
            Arc::new(repos.users),
        )
    }

    /// Create a service backed by in-memory repositories. The repositories
    /// are shared, so the caller keeps access to them.
    pub fn in_memory(config: QuotaConfig, repos: &MemoryRepositories) -> Self {
        Self::new(
            config,
            Arc::new(repos.usage.clone()),
            Arc::new(repos.prompts.clone()),
            Arc::new(repos.reset_logs.clone()),
            Arc::new(repos.users.clone()),
        )
    }

    /// Admit or deny an action now. The upgrade prompt engine is run on a
    /// spawned task afterwards; its failures are only logged.
    pub async fn admit(&self, req: &AdmissionRequest) -> Result<Verdict, QuotaError> {
        let now = Utc::now();
        let verdict = self.enforcer.admit(req, now).await?;

        if !verdict.replayed && verdict.suggested_tier.is_some() {
            let engine = self.prompts.clone();
            let user_id = req.user_id;
            let snapshot = verdict.clone();
            tokio::spawn(async move {
                if let Err(e) = engine.evaluate_verdict(&user_id, &snapshot, now).await {
                    tracing::warn!(user_id = %user_id, error = %e, "Prompt evaluation failed");
                }
            });
        }

        Ok(verdict)
    }

    /// Admit or deny at an explicit time without prompt evaluation
    pub async fn admit_at(
        &self,
        req: &AdmissionRequest,
        now: DateTime<Utc>,
    ) -> Result<Verdict, QuotaError> {
        self.enforcer.admit(req, now).await
    }

    /// Current period usage
    pub async fn usage(
        &self,
        user_id: &UserId,
        quota_type: QuotaType,
    ) -> Result<UsageRecord, QuotaError> {
        self.ledger.get_usage(user_id, quota_type, Utc::now()).await
    }

    /// Usage of the period containing `now`
    pub async fn usage_at(
        &self,
        user_id: &UserId,
        quota_type: QuotaType,
        now: DateTime<Utc>,
    ) -> Result<UsageRecord, QuotaError> {
        self.ledger.get_usage(user_id, quota_type, now).await
    }

    /// Trailing-window statistics measured against the user's current limit
    pub async fn statistics(
        &self,
        user_id: &UserId,
        quota_type: QuotaType,
        days: u32,
    ) -> Result<StatsSummary, QuotaError> {
        self.statistics_at(user_id, quota_type, days, Utc::now()).await
    }

    /// [`statistics`](Self::statistics) for a window ending on `now`'s date
    pub async fn statistics_at(
        &self,
        user_id: &UserId,
        quota_type: QuotaType,
        days: u32,
        now: DateTime<Utc>,
    ) -> Result<StatsSummary, QuotaError> {
        let tier = self.enforcer.tier_for(user_id).await;
        let limit = self.policies.lookup(tier, quota_type)?;
        self.stats
            .statistics(user_id, quota_type, days, limit, now)
            .await
    }

    /// Zero-filled per-day usage for every quota type
    pub async fn daily_usage(
        &self,
        user_id: &UserId,
        days: u32,
    ) -> Result<Vec<DailyUsage>, QuotaError> {
        self.stats.daily_usage(user_id, days, Utc::now()).await
    }

    /// Prompts for a user, newest first
    pub async fn list_prompts(
        &self,
        user_id: &UserId,
        include_dismissed: bool,
    ) -> Result<Vec<UpgradePrompt>, QuotaError> {
        self.prompts.list_prompts(user_id, include_dismissed).await
    }

    /// Dismiss a prompt
    pub async fn dismiss_prompt(&self, id: PromptId) -> Result<UpgradePrompt, QuotaError> {
        self.prompts.dismiss(id, Utc::now()).await
    }

    /// Mark a prompt converted. The user's cached tier is dropped so the
    /// upgrade takes effect on the next admission.
    pub async fn convert_prompt(&self, id: PromptId) -> Result<UpgradePrompt, QuotaError> {
        let prompt = self.prompts.mark_converted(id, Utc::now()).await?;
        self.tiers.invalidate(&prompt.user_id).await;
        Ok(prompt)
    }

    /// Evaluate prompt creation for an admission verdict
    pub async fn evaluate_prompt(
        &self,
        user_id: &UserId,
        verdict: &Verdict,
        now: DateTime<Utc>,
    ) -> Result<Option<UpgradePrompt>, QuotaError> {
        self.prompts.evaluate_verdict(user_id, verdict, now).await
    }

    /// Evaluate prompts for all live usage
    pub async fn sweep_prompts(&self, now: DateTime<Utc>) -> Result<SweepSummary, QuotaError> {
        self.prompts
            .sweep(&self.ledger, &self.policies, self.tiers.as_ref(), now)
            .await
    }

    /// Trigger an immediate reset run
    pub async fn reset_now(&self) -> Result<ResetLog, QuotaError> {
        self.scheduler.trigger().await
    }

    /// Zero the current period for one pair
    pub async fn reset_user(&self, user_id: &UserId, quota_type: QuotaType) -> Result<(), QuotaError> {
        tracing::info!(user_id = %user_id, quota_type = %quota_type, "Manual quota reset");
        self.ledger.reset_period(user_id, quota_type, Utc::now()).await
    }

    /// Scheduler state and last run
    pub async fn scheduler_status(&self) -> SchedulerStatus {
        self.scheduler.status().await
    }

    /// Most recent reset runs
    pub async fn recent_reset_logs(&self, limit: i64) -> Result<Vec<ResetLog>, QuotaError> {
        self.scheduler.recent_logs(limit).await
    }

    /// Shared scheduler handle for the background loop
    pub fn scheduler(&self) -> Arc<ResetScheduler> {
        self.scheduler.clone()
    }

    /// Configured policy table
    pub fn policies(&self) -> &TierPolicyStore {
        &self.policies
    }
}

impl std::fmt::Debug for QuotaService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuotaService")
            .field("policies", &self.policies)
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}
