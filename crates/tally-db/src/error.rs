//! Database errors

use thiserror::Error;

/// Database errors
#[derive(Error, Debug)]
pub enum DbError {
    /// SQLx error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Migration error
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// Record not found
    #[error("record not found")]
    NotFound,

    /// Stored value could not be mapped to a domain type
    #[error("invalid stored value: {0}")]
    Decode(String),

    /// Backend refused the operation
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Result alias for repository operations
pub type DbResult<T> = Result<T, DbError>;
