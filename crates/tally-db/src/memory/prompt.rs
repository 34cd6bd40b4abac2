//! In-memory upgrade prompt repository

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::DbResult;
use crate::models::PromptRow;
use crate::repo::{CreatePrompt, PromptRepository};

/// In-memory upgrade prompt repository
#[derive(Default, Clone)]
pub struct MemoryPromptRepository {
    prompts: Arc<DashMap<Uuid, PromptRow>>,
    /// (user, quota type) -> open prompt ID
    open: Arc<DashMap<(Uuid, String), Uuid>>,
}

impl MemoryPromptRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn close(&self, id: Uuid, at: DateTime<Utc>, converted: bool) -> bool {
        let closed = match self.prompts.get_mut(&id) {
            Some(mut row) if !row.is_terminal() => {
                if converted {
                    row.converted_at = Some(at);
                } else {
                    row.dismissed_at = Some(at);
                }
                Some((row.user_id, row.quota_type.clone()))
            }
            _ => None,
        };

        match closed {
            Some(slot) => {
                self.open.remove_if(&slot, |_, open_id| *open_id == id);
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl PromptRepository for MemoryPromptRepository {
    async fn create_if_absent(&self, prompt: CreatePrompt) -> DbResult<Option<PromptRow>> {
        match self.open.entry((prompt.user_id, prompt.quota_type.clone())) {
            Entry::Occupied(_) => Ok(None),
            Entry::Vacant(slot) => {
                let row = PromptRow {
                    id: prompt.id,
                    user_id: prompt.user_id,
                    quota_type: prompt.quota_type,
                    current_tier: prompt.current_tier,
                    suggested_tier: prompt.suggested_tier,
                    shown_at: prompt.shown_at,
                    dismissed_at: None,
                    converted_at: None,
                };
                self.prompts.insert(row.id, row.clone());
                slot.insert(row.id);
                Ok(Some(row))
            }
        }
    }

    async fn find_by_id(&self, id: Uuid) -> DbResult<Option<PromptRow>> {
        Ok(self.prompts.get(&id).map(|r| r.value().clone()))
    }

    async fn find_by_user(
        &self,
        user_id: Uuid,
        include_dismissed: bool,
    ) -> DbResult<Vec<PromptRow>> {
        let mut rows: Vec<PromptRow> = self
            .prompts
            .iter()
            .map(|r| r.value().clone())
            .filter(|row| row.user_id == user_id && (include_dismissed || row.dismissed_at.is_none()))
            .collect();
        rows.sort_by(|a, b| b.shown_at.cmp(&a.shown_at));
        Ok(rows)
    }

    async fn dismiss(&self, id: Uuid, at: DateTime<Utc>) -> DbResult<bool> {
        Ok(self.close(id, at, false))
    }

    async fn mark_converted(&self, id: Uuid, at: DateTime<Utc>) -> DbResult<bool> {
        Ok(self.close(id, at, true))
    }
}
