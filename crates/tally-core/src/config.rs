//! Quota engine configuration

use std::time::Duration;

use crate::policy::TierPolicyStore;
use crate::QuotaError;

/// Quota engine configuration
#[derive(Debug, Clone)]
pub struct QuotaConfig {
    /// Tier policy table
    pub policies: TierPolicyStore,
    /// Usage ratio at which an upgrade prompt is created
    pub prompt_threshold: f64,
    /// How long resolved tiers are cached
    pub tier_cache_ttl: Duration,
    /// Maximum cached tiers
    pub tier_cache_capacity: u64,
    /// Maximum pairs rolled forward per scheduler run
    pub reset_batch_size: i64,
    /// How long idempotent admission outcomes are kept
    pub admission_retention: Duration,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            policies: TierPolicyStore::default(),
            prompt_threshold: 0.75,
            tier_cache_ttl: Duration::from_secs(60),
            tier_cache_capacity: 10_000,
            reset_batch_size: 10_000,
            admission_retention: Duration::from_secs(48 * 60 * 60),
        }
    }
}

impl QuotaConfig {
    /// Create a config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the policy table
    #[must_use]
    pub fn with_policies(mut self, policies: TierPolicyStore) -> Self {
        self.policies = policies;
        self
    }

    /// Set the upgrade prompt threshold
    #[must_use]
    pub fn with_prompt_threshold(mut self, threshold: f64) -> Self {
        self.prompt_threshold = threshold;
        self
    }

    /// Set the tier cache TTL
    #[must_use]
    pub fn with_tier_cache_ttl(mut self, ttl: Duration) -> Self {
        self.tier_cache_ttl = ttl;
        self
    }

    /// Set the scheduler batch size
    #[must_use]
    pub fn with_reset_batch_size(mut self, batch_size: i64) -> Self {
        self.reset_batch_size = batch_size;
        self
    }

    /// Set how long idempotency keys are honoured
    #[must_use]
    pub fn with_admission_retention(mut self, retention: Duration) -> Self {
        self.admission_retention = retention;
        self
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), QuotaError> {
        if !(self.prompt_threshold > 0.0 && self.prompt_threshold <= 1.0) {
            return Err(QuotaError::Config(format!(
                "prompt threshold must be in (0, 1], got {}",
                self.prompt_threshold
            )));
        }
        if self.reset_batch_size <= 0 {
            return Err(QuotaError::Config("reset batch size must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(QuotaConfig::default().validate().is_ok());
    }

    #[test]
    fn test_threshold_bounds() {
        assert!(QuotaConfig::new().with_prompt_threshold(1.0).validate().is_ok());
        assert!(QuotaConfig::new().with_prompt_threshold(0.0).validate().is_err());
        assert!(QuotaConfig::new().with_prompt_threshold(1.5).validate().is_err());
        assert!(QuotaConfig::new().with_prompt_threshold(f64::NAN).validate().is_err());
    }
}
