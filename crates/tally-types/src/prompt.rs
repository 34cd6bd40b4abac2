//! Upgrade prompt types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{QuotaType, Tier, UserId};

/// Upgrade prompt ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PromptId(pub Uuid);

impl PromptId {
    /// Create a new prompt ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a prompt ID from a string
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for PromptId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PromptId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Suggestion shown to a user approaching a quota ceiling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradePrompt {
    /// Prompt ID
    pub id: PromptId,
    /// User the prompt is for
    pub user_id: UserId,
    /// Quota that triggered the prompt
    pub quota_type: QuotaType,
    /// Tier at the time the prompt was created
    pub current_tier: Tier,
    /// Tier being suggested
    pub suggested_tier: Tier,
    /// When the prompt was created
    pub shown_at: DateTime<Utc>,
    /// Set once when the user dismisses the prompt
    pub dismissed_at: Option<DateTime<Utc>>,
    /// Set once when the user upgrades from the prompt
    pub converted_at: Option<DateTime<Utc>>,
}

impl UpgradePrompt {
    /// Whether the prompt has been dismissed or converted
    pub fn is_terminal(&self) -> bool {
        self.dismissed_at.is_some() || self.converted_at.is_some()
    }
}
