//! Tier resolution with caching

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use tally_db::UserRepository;
use tally_types::{Tier, UserId};

use crate::QuotaError;

/// Resolves a user's subscription tier from the profile system
#[async_trait]
pub trait TierResolver: Send + Sync {
    /// Tier for the user. Errors mean the profile system could not answer.
    async fn resolve_tier(&self, user_id: &UserId) -> Result<Tier, QuotaError>;

    /// Drop any cached answer for the user (e.g., after an upgrade)
    async fn invalidate(&self, _user_id: &UserId) {}
}

/// Repository-backed tier resolver with caching
#[derive(Clone)]
pub struct CachedTierResolver {
    repo: Arc<dyn UserRepository>,
    /// Cache of user_id -> tier
    tier_cache: Cache<UserId, Tier>,
}

impl CachedTierResolver {
    /// Create a resolver caching tiers for one minute
    pub fn new(repo: Arc<dyn UserRepository>) -> Self {
        Self::with_cache(repo, Duration::from_secs(60), 10_000)
    }

    /// Create with custom cache duration and capacity
    pub fn with_cache(repo: Arc<dyn UserRepository>, ttl: Duration, capacity: u64) -> Self {
        Self {
            repo,
            tier_cache: Cache::builder()
                .time_to_live(ttl)
                .max_capacity(capacity)
                .build(),
        }
    }
}

#[async_trait]
impl TierResolver for CachedTierResolver {
    async fn resolve_tier(&self, user_id: &UserId) -> Result<Tier, QuotaError> {
        if let Some(tier) = self.tier_cache.get(user_id).await {
            return Ok(tier);
        }

        // Lookup failures are not cached so the next request retries
        let stored = self.repo.find_tier(user_id.0).await?;

        let tier = match stored {
            Some(name) => name.parse().unwrap_or_else(|_| {
                tracing::warn!(user_id = %user_id, tier = %name, "Unknown tier name, using most restrictive");
                Tier::most_restrictive()
            }),
            None => Tier::most_restrictive(),
        };

        self.tier_cache.insert(*user_id, tier).await;
        Ok(tier)
    }

    async fn invalidate(&self, user_id: &UserId) {
        self.tier_cache.invalidate(user_id).await;
    }
}

impl std::fmt::Debug for CachedTierResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedTierResolver").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_db::memory::MemoryUserRepository;

    #[tokio::test]
    async fn test_known_and_unknown_tiers() {
        let users = MemoryUserRepository::new();
        let pro = UserId::new();
        let odd = UserId::new();
        users.set_tier(pro.0, "professional");
        users.set_tier(odd.0, "platinum");

        let resolver = CachedTierResolver::new(Arc::new(users));

        assert_eq!(resolver.resolve_tier(&pro).await.unwrap(), Tier::Pro);
        assert_eq!(resolver.resolve_tier(&odd).await.unwrap(), Tier::Free);
        assert_eq!(resolver.resolve_tier(&UserId::new()).await.unwrap(), Tier::Free);
    }

    #[tokio::test]
    async fn test_cached_until_invalidated() {
        let users = MemoryUserRepository::new();
        let user = UserId::new();
        users.set_tier(user.0, "free");
        let resolver = CachedTierResolver::new(Arc::new(users.clone()));

        assert_eq!(resolver.resolve_tier(&user).await.unwrap(), Tier::Free);
        users.set_tier(user.0, "enterprise");
        assert_eq!(resolver.resolve_tier(&user).await.unwrap(), Tier::Free);

        resolver.invalidate(&user).await;
        assert_eq!(resolver.resolve_tier(&user).await.unwrap(), Tier::Enterprise);
    }

    #[tokio::test]
    async fn test_lookup_failure_is_an_error() {
        let users = MemoryUserRepository::new();
        users.set_unavailable(true);
        let resolver = CachedTierResolver::new(Arc::new(users));

        assert!(resolver.resolve_tier(&UserId::new()).await.is_err());
    }
}
