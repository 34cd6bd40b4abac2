//! Tier policy table
//!
//! A single lookup table from `(tier, quota type)` to a limit. Enforcement
//! code never branches on tier names; it asks this store.

use std::collections::HashMap;
use std::path::Path;

use tally_types::{Limit, QuotaType, Tier, TierLimit};

use crate::QuotaError;

/// Static `(tier, quota type) -> limit` lookup, immutable once built
#[derive(Debug, Clone)]
pub struct TierPolicyStore {
    limits: HashMap<(Tier, QuotaType), Limit>,
}

impl Default for TierPolicyStore {
    fn default() -> Self {
        let entries = [
            (Tier::Free, QuotaType::Search, Limit::Limited(20)),
            (Tier::Free, QuotaType::Export, Limit::Limited(5)),
            (Tier::Free, QuotaType::ApiCall, Limit::Limited(100)),
            (Tier::Pro, QuotaType::Search, Limit::Limited(200)),
            (Tier::Pro, QuotaType::Export, Limit::Limited(50)),
            (Tier::Pro, QuotaType::ApiCall, Limit::Limited(5_000)),
            (Tier::Enterprise, QuotaType::Search, Limit::Unlimited),
            (Tier::Enterprise, QuotaType::Export, Limit::Unlimited),
            (Tier::Enterprise, QuotaType::ApiCall, Limit::Unlimited),
        ];

        Self {
            limits: entries
                .into_iter()
                .map(|(tier, quota_type, limit)| ((tier, quota_type), limit))
                .collect(),
        }
    }
}

impl TierPolicyStore {
    /// Build a store from explicit entries. Duplicate pairs are rejected.
    pub fn from_entries(entries: impl IntoIterator<Item = TierLimit>) -> Result<Self, QuotaError> {
        let mut limits = HashMap::new();
        for entry in entries {
            if limits
                .insert((entry.tier, entry.quota_type), entry.limit)
                .is_some()
            {
                return Err(QuotaError::Config(format!(
                    "duplicate policy for tier {} and quota {}",
                    entry.tier, entry.quota_type
                )));
            }
        }
        Ok(Self { limits })
    }

    /// Load entries from a JSON file containing a list of `TierLimit`
    pub fn load_file(path: impl AsRef<Path>) -> Result<Self, QuotaError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| QuotaError::Config(format!("reading {}: {e}", path.display())))?;
        let entries: Vec<TierLimit> = serde_json::from_str(&raw)
            .map_err(|e| QuotaError::Config(format!("parsing {}: {e}", path.display())))?;
        Self::from_entries(entries)
    }

    /// Limit for a tier and quota type.
    ///
    /// Unconfigured pairs fail with [`QuotaError::PolicyNotFound`]; callers
    /// must deny rather than fall back to unlimited.
    pub fn lookup(&self, tier: Tier, quota_type: QuotaType) -> Result<Limit, QuotaError> {
        self.limits
            .get(&(tier, quota_type))
            .copied()
            .ok_or(QuotaError::PolicyNotFound { tier, quota_type })
    }

    /// Tier to suggest to a user on `tier`
    pub fn next_tier(&self, tier: Tier) -> Option<Tier> {
        tier.next()
    }

    /// Tiers that have at least one configured limit, ascending
    pub fn tiers(&self) -> Vec<Tier> {
        let mut tiers: Vec<Tier> = self.limits.keys().map(|(tier, _)| *tier).collect();
        tiers.sort();
        tiers.dedup();
        tiers
    }

    /// All entries, sorted by tier then quota type
    pub fn entries(&self) -> Vec<TierLimit> {
        let mut entries: Vec<TierLimit> = self
            .limits
            .iter()
            .map(|(&(tier, quota_type), &limit)| TierLimit {
                tier,
                quota_type,
                limit,
            })
            .collect();
        entries.sort_by_key(|e| (e.tier, e.quota_type));
        entries
    }
}
