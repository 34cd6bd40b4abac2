//! In-memory user profile lookup

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repo::UserRepository;

/// In-memory user repository
#[derive(Default, Clone)]
pub struct MemoryUserRepository {
    tiers: Arc<DashMap<Uuid, String>>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the stored tier name for a user
    pub fn set_tier(&self, id: Uuid, tier: impl Into<String>) {
        self.tiers.insert(id, tier.into());
    }

    /// Make lookups fail with [`DbError::Unavailable`]
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn find_tier(&self, id: Uuid) -> DbResult<Option<String>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DbError::Unavailable("profile store offline".into()));
        }
        Ok(self.tiers.get(&id).map(|r| r.value().clone()))
    }
}
