//! # Observability
//!
//! Centralized logging layer for the Studydash workspace.
//!
//! Components are **log producers** only. They call `observability::init()`
//! once at startup and use the standard `tracing` macros everywhere else.
//! They never know where logs end up.
//!
//! ## File mode
//!
//! When a log path is configured (or the default one can be resolved), every
//! process appends structured JSONL to `~/.studydash/logs/dev.jsonl`:
//!
//! - `tail -f ~/.studydash/logs/dev.jsonl | jq` for pretty JSON
//! - `lnav ~/.studydash/logs/dev.jsonl` for interactive exploration
//!
//! Fields whose names look like credentials (`password`, `access_token`,
//! `api_key`, ...) are redacted before they are written.
//!
//! ## Usage
//!
//! ```rust,ignore
//! fn main() {
//!     observability::init_with_config(observability::LogConfig {
//!         service_name: "dashboard".into(),
//!         default_level: "debug".into(),
//!         also_stderr: true,
//!         ..Default::default()
//!     });
//!     tracing::info!("ready");
//! }
//! ```

mod dev;
mod json_layer;

use std::path::PathBuf;

pub use json_layer::{is_sensitive_field, LogEntry, REDACTED};

/// Where log lines are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogSink {
    /// JSONL file plus optional stderr mirror.
    #[default]
    JsonFile,
    /// Compact human-readable stderr only.
    Stderr,
}

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service (e.g., "dashboard", "sweep").
    /// Included in every log line for filtering.
    pub service_name: String,

    /// Default log level filter (e.g., "debug", "info", "warn").
    /// Can be overridden by `RUST_LOG` environment variable.
    pub default_level: String,

    /// Optional custom log file path.
    /// Defaults to `~/.studydash/logs/dev.jsonl`.
    pub log_path: Option<PathBuf>,

    /// Also emit logs to stderr for immediate feedback.
    pub also_stderr: bool,

    /// Output sink.
    pub sink: LogSink,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: false,
            sink: LogSink::JsonFile,
        }
    }
}

/// Initialize logging with default settings for the given service.
pub fn init(service_name: &str) {
    init_with_config(LogConfig {
        service_name: service_name.into(),
        ..Default::default()
    });
}

/// Initialize logging with custom configuration.
///
/// Falls back to stderr-only output when the JSONL file cannot be opened,
/// so a read-only home directory never prevents the process from starting.
pub fn init_with_config(config: LogConfig) {
    match config.sink {
        LogSink::JsonFile => {
            if let Err(e) = dev::init_file_subscriber(&config) {
                eprintln!("observability: falling back to stderr logging: {}", e);
                dev::init_stderr_subscriber(&config);
            }
        }
        LogSink::Stderr => dev::init_stderr_subscriber(&config),
    }
}

/// Re-export tracing macros for convenience.
pub use tracing::{debug, error, info, instrument, trace, warn};

/// Re-export Level for advanced filtering.
pub use tracing::Level;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LogConfig::default();
        assert_eq!(config.service_name, "unknown");
        assert_eq!(config.default_level, "info");
        assert!(config.log_path.is_none());
        assert!(!config.also_stderr);
        assert_eq!(config.sink, LogSink::JsonFile);
    }
}
