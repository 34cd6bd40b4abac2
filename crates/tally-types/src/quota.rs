//! Quota categories and limits

use serde::{Deserialize, Serialize};

use crate::{QuotaTypeParseError, Tier};

/// Category of rate-limited action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaType {
    /// Document search
    Search,
    /// PDF/CSV export
    Export,
    /// Programmatic API call
    ApiCall,
}

impl QuotaType {
    /// All quota types
    pub const ALL: [QuotaType; 3] = [Self::Search, Self::Export, Self::ApiCall];

    /// Snake-case name as stored and serialized
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::Export => "export",
            Self::ApiCall => "api_call",
        }
    }
}

impl std::fmt::Display for QuotaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for QuotaType {
    type Err = QuotaTypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "search" => Ok(Self::Search),
            "export" => Ok(Self::Export),
            "api_call" | "api-call" | "apicall" => Ok(Self::ApiCall),
            _ => Err(QuotaTypeParseError(s.to_string())),
        }
    }
}

/// Hard ceiling for a quota within one period.
///
/// Serialized as a plain number, or the string `"unlimited"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "LimitRepr", into = "LimitRepr")]
pub enum Limit {
    /// At most `n` units per period
    Limited(u64),
    /// No ceiling; usage is still recorded
    Unlimited,
}

impl Limit {
    /// Whether `usage + increment` fits under this limit
    pub fn admits(&self, usage: u64, increment: u64) -> bool {
        match self {
            Self::Limited(max) => usage
                .checked_add(increment)
                .is_some_and(|total| total <= *max),
            Self::Unlimited => true,
        }
    }

    /// Units left after `usage`, `None` when unlimited
    pub fn remaining(&self, usage: u64) -> Option<u64> {
        match self {
            Self::Limited(max) => Some(max.saturating_sub(usage)),
            Self::Unlimited => None,
        }
    }

    /// The numeric ceiling, `None` when unlimited
    pub fn ceiling(&self) -> Option<u64> {
        match self {
            Self::Limited(max) => Some(*max),
            Self::Unlimited => None,
        }
    }

    /// Whether `usage` has reached the ceiling. Never true for unlimited.
    pub fn is_reached_by(&self, usage: u64) -> bool {
        matches!(self, Self::Limited(max) if usage >= *max)
    }

    /// Ratio of `usage` to the ceiling. `None` when unlimited or zero.
    #[allow(clippy::cast_precision_loss)]
    pub fn usage_ratio(&self, usage: u64) -> Option<f64> {
        match self {
            Self::Limited(0) | Self::Unlimited => None,
            Self::Limited(max) => Some(usage as f64 / *max as f64),
        }
    }
}

impl std::fmt::Display for Limit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Limited(max) => write!(f, "{max}"),
            Self::Unlimited => f.write_str("unlimited"),
        }
    }
}

/// One row of the tier policy table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierLimit {
    /// Subscription tier
    pub tier: Tier,
    /// Quota category
    pub quota_type: QuotaType,
    /// Ceiling per period
    pub limit: Limit,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum LimitRepr {
    Count(u64),
    Keyword(UnlimitedKeyword),
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum UnlimitedKeyword {
    Unlimited,
}

impl From<LimitRepr> for Limit {
    fn from(repr: LimitRepr) -> Self {
        match repr {
            LimitRepr::Count(n) => Self::Limited(n),
            LimitRepr::Keyword(UnlimitedKeyword::Unlimited) => Self::Unlimited,
        }
    }
}

impl From<Limit> for LimitRepr {
    fn from(limit: Limit) -> Self {
        match limit {
            Limit::Limited(n) => Self::Count(n),
            Limit::Unlimited => Self::Keyword(UnlimitedKeyword::Unlimited),
        }
    }
}
