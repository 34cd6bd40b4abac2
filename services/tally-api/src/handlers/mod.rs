//! REST API handlers

pub mod admin;
pub mod admit;
pub mod health;
pub mod prompts;
pub mod shared;
pub mod usage;

pub use admin::*;
pub use admit::*;
pub use health::*;
pub use prompts::*;
pub use usage::*;
