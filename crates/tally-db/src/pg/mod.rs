//! PostgreSQL repository implementations

mod prompt;
mod reset_log;
mod usage;
mod user;

pub use prompt::PgPromptRepository;
pub use reset_log::PgResetLogRepository;
pub use usage::PgUsageRepository;
pub use user::PgUserRepository;

use crate::DbPool;

/// All repositories bundled together
#[derive(Clone)]
pub struct Repositories {
    pub usage: PgUsageRepository,
    pub prompts: PgPromptRepository,
    pub reset_logs: PgResetLogRepository,
    pub users: PgUserRepository,
}

impl Repositories {
    /// Create all repositories from a database pool
    pub fn new(pool: DbPool) -> Self {
        Self {
            usage: PgUsageRepository::new(pool.clone()),
            prompts: PgPromptRepository::new(pool.clone()),
            reset_logs: PgResetLogRepository::new(pool.clone()),
            users: PgUserRepository::new(pool),
        }
    }
}
