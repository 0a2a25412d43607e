//! # Observability
//!
//! Centralized logging setup for the RSVP services.
//!
//! Services call [`init`] or [`init_with_config`] once at startup and then use
//! the standard `tracing` macros. Where the output goes is decided here:
//!
//! - compact human-readable lines on stderr (default)
//! - structured JSONL appended to a file when `log_path` is set
//!
//! In [`ObservabilityMode::ProdMetadataOnly`] the JSONL output masks email
//! addresses found in field values, so attendee contact data does not end up
//! in shipped log files.
//!
//! ```rust,ignore
//! observability::init_with_config(observability::LogConfig {
//!     service_name: "rsvp".into(),
//!     default_level: "debug".into(),
//!     also_stderr: true,
//!     ..Default::default()
//! });
//! tracing::info!("ready");
//! ```

mod json_layer;
mod writer;

use std::path::PathBuf;

pub use json_layer::{redact_emails, JsonLayer, LogEntry};
pub use writer::{AppendWriter, WriterFactory};

/// Runtime export policy mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ObservabilityMode {
    /// Development mode: field values are written as-is.
    #[default]
    DevVerbose,
    /// Production mode: email addresses in field values are masked.
    ProdMetadataOnly,
}

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service, included in every JSONL line.
    pub service_name: String,

    /// Default log level filter (e.g., "debug", "info", "warn").
    /// Can be overridden by `RUST_LOG` environment variable.
    pub default_level: String,

    /// Optional JSONL log file. When unset, logs go to stderr only.
    pub log_path: Option<PathBuf>,

    /// Also emit compact logs to stderr when a log file is configured.
    pub also_stderr: bool,

    /// Runtime observability mode.
    pub mode: ObservabilityMode,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: false,
            mode: ObservabilityMode::DevVerbose,
        }
    }
}

/// Initialize logging with default settings for the named service.
pub fn init(service_name: &str) {
    init_with_config(LogConfig {
        service_name: service_name.into(),
        ..Default::default()
    });
}

/// Initialize logging with custom configuration.
///
/// Safe to call more than once; only the first call installs a subscriber.
/// If the log file cannot be opened, logging falls back to stderr.
pub fn init_with_config(config: LogConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::Layer;

    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.default_level))
    };

    let file_writer = config.log_path.as_ref().and_then(|path| {
        AppendWriter::open(path)
            .map_err(|e| eprintln!("failed to open log file {}: {}", path.display(), e))
            .ok()
    });

    let installed = match file_writer {
        Some(writer) => {
            let json = JsonLayer::new(
                config.service_name.clone(),
                WriterFactory::new(writer),
                config.mode,
            )
            .with_filter(filter());
            let stderr = config.also_stderr.then(|| {
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .compact()
                    .with_filter(filter())
            });
            tracing_subscriber::registry()
                .with(json)
                .with(stderr)
                .try_init()
                .is_ok()
        }
        None => tracing_subscriber::fmt()
            .with_env_filter(filter())
            .with_writer(std::io::stderr)
            .with_target(true)
            .compact()
            .try_init()
            .is_ok(),
    };

    if !installed {
        tracing::debug!("global subscriber already installed");
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
        assert_eq!(config.mode, ObservabilityMode::DevVerbose);
    }

    #[test]
    fn init_twice_does_not_panic() {
        init("first");
        init("second");
    }
}
