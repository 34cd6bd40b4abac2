//! In-memory repository implementations
//!
//! Backed by `DashMap`; every mutation of a usage counter happens while the
//! map entry for that counter is locked, giving the same all-or-nothing
//! semantics as the PostgreSQL implementation within a single process.
//! Intended for tests and local development, not for multi-instance
//! deployments.

mod prompt;
mod reset_log;
mod usage;
mod user;

pub use prompt::MemoryPromptRepository;
pub use reset_log::MemoryResetLogRepository;
pub use usage::MemoryUsageRepository;
pub use user::MemoryUserRepository;

/// All in-memory repositories bundled together
#[derive(Clone, Default)]
pub struct MemoryRepositories {
    pub usage: MemoryUsageRepository,
    pub prompts: MemoryPromptRepository,
    pub reset_logs: MemoryResetLogRepository,
    pub users: MemoryUserRepository,
}

impl MemoryRepositories {
    /// Create an empty set of repositories
    pub fn new() -> Self {
        Self::default()
    }
}
