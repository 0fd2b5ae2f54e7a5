//! Configuration, paths, errors and logging bootstrap shared by the
//! Studydash crates.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    Config, DEFAULT_AI_KEY, DEFAULT_LOG_LEVEL, DEFAULT_SESSION_TTL_SECS, DEFAULT_SUPABASE_PUBLISHABLE_KEY,
    DEFAULT_SUPABASE_URL, DEFAULT_SWEEP_INTERVAL_SECS, DEFAULT_VERIFICATION_COOLDOWN_SECS,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, init_logging_for_service, parse_level};
pub use paths::Paths;
