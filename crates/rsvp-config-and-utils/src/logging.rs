//! Logging initialization.
//!
//! Wraps the observability crate so binaries only pick a level. Environment:
//!
//! - `RSVP_OBS_MODE`: `prod`/`production` masks emails in JSONL output
//! - `RSVP_LOG_FILE`: append JSONL logs to this file (stderr stays on)

use observability::{LogConfig, ObservabilityMode};
use std::path::PathBuf;

/// Initialize the logging system.
///
/// `RUST_LOG` takes precedence over `level` when set.
pub fn init_logging(level: &str) {
    let mode = match std::env::var("RSVP_OBS_MODE")
        .unwrap_or_else(|_| "dev".to_string())
        .to_ascii_lowercase()
        .as_str()
    {
        "prod" | "production" => ObservabilityMode::ProdMetadataOnly,
        _ => ObservabilityMode::DevVerbose,
    };

    let log_path = std::env::var("RSVP_LOG_FILE")
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
        .map(PathBuf::from);

    observability::init_with_config(LogConfig {
        service_name: "rsvp".into(),
        default_level: parse_level(level).as_str().to_ascii_lowercase(),
        log_path,
        also_stderr: true,
        mode,
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
