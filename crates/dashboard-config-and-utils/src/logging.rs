//! Logging initialization.
//!
//! Thin wrapper over the observability crate so binaries configure logging
//! the same way. Structured JSONL goes to `~/.studydash/logs/dev.jsonl`.

use observability::{LogConfig, LogSink};

/// Initialize the logging system for the dashboard CLI.
///
/// # Example
///
/// ```ignore
/// init_logging("info");
/// tracing::info!("dashboard started");
/// ```
pub fn init_logging(level: &str) {
    init_logging_for_service("dashboard", level);
}

/// Initialize logging with a custom service name.
///
/// `DASHBOARD_LOG_SINK=stderr` switches to human-readable stderr output.
pub fn init_logging_for_service(service_name: &str, level: &str) {
    let sink = match std::env::var("DASHBOARD_LOG_SINK")
        .unwrap_or_default()
        .to_ascii_lowercase()
        .as_str()
    {
        "stderr" => LogSink::Stderr,
        _ => LogSink::JsonFile,
    };

    observability::init_with_config(LogConfig {
        service_name: service_name.into(),
        default_level: parse_level(level).to_string().to_lowercase(),
        also_stderr: false,
        sink,
        ..Default::default()
    });
}

/// Parse a log level string into a tracing Level.
pub fn parse_level(level: &str) -> tracing::Level {
    match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" | "warning" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}
