//! Tally DB - Persistence for the quota engine
//!
//! SQLx-based PostgreSQL repositories plus an in-memory backend for tests
//! and single-process development.
//!
//! # Example
//!
//! ```rust,ignore
//! use tally_db::{create_pool, run_migrations, Repositories};
//!
//! let pool = create_pool("postgres://localhost/tally").await?;
//! run_migrations(&pool).await?;
//! let repos = Repositories::new(pool);
//!
//! let history = repos.usage.history(user_id, Some("search"), from, to).await?;
//! ```

pub mod error;
pub mod memory;
pub mod models;
pub mod pg;
pub mod pool;
pub mod repo;

pub use error::{DbError, DbResult};
pub use models::*;
pub use pg::Repositories;
pub use pool::{create_pool, create_pool_with_options, run_migrations, DbPool, PoolOptions};
pub use repo::*;
