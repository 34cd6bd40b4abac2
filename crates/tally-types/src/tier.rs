//! Subscription tier types

use serde::{Deserialize, Serialize};

use crate::TierParseError;

/// Subscription tier levels, ordered from most to least restrictive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Free tier
    Free,
    /// Paid individual tier
    Pro,
    /// Organisation tier
    Enterprise,
}

impl Tier {
    /// All tiers in ascending order
    pub const ALL: [Tier; 3] = [Self::Free, Self::Pro, Self::Enterprise];

    /// The most restrictive tier, used whenever a user's tier is unknown
    pub const fn most_restrictive() -> Self {
        Self::Free
    }

    /// The next higher tier, or `None` for the top tier
    pub const fn next(&self) -> Option<Self> {
        match self {
            Self::Free => Some(Self::Pro),
            Self::Pro => Some(Self::Enterprise),
            Self::Enterprise => None,
        }
    }

    /// Whether this is the highest tier
    pub const fn is_top(&self) -> bool {
        self.next().is_none()
    }

    /// Lowercase name as stored and serialized
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Pro => "pro",
            Self::Enterprise => "enterprise",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Tier {
    type Err = TierParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "free" => Ok(Self::Free),
            "pro" | "professional" => Ok(Self::Pro),
            "enterprise" => Ok(Self::Enterprise),
            _ => Err(TierParseError(s.to_string())),
        }
    }
}
