//! Parse errors for domain types

use thiserror::Error;

/// Error parsing a tier string
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid tier: {0}")]
pub struct TierParseError(pub String);

/// Error parsing a quota type string
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid quota type: {0}")]
pub struct QuotaTypeParseError(pub String);
