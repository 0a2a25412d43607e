//! Configuration management.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Retry policy settings for in-request gateway calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySettings {
    /// Attempts per gateway call, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles per attempt.
    pub base_delay_ms: u64,
    /// Cap on the computed delay before jitter.
    pub max_delay_ms: u64,
    /// HTTP request timeout.
    pub request_timeout_secs: u64,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 10_000,
            request_timeout_secs: 30,
        }
    }
}

impl GatewaySettings {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Background sync processor settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Seconds between sweeps.
    pub interval_secs: u64,
    /// Ledger entries replayed per sweep.
    pub batch_size: usize,
    /// Failed replays after which an entry is abandoned.
    pub max_retries: u32,
    /// Outer backoff base: delay after the N-th failure is `base * 2^N`.
    pub base_delay_secs: u64,
    /// Delay before a freshly recorded entry becomes due.
    pub initial_delay_secs: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            batch_size: 10,
            max_retries: 10,
            base_delay_secs: 60,
            initial_delay_secs: 60,
        }
    }
}

impl SyncSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_secs(self.base_delay_secs)
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_secs)
    }
}

/// Service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Database file; defaults to `Paths::database_file()`.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    /// Loops API key (contact sync and lifecycle events).
    #[serde(default)]
    pub loops_api_key: Option<String>,
    /// Gemini API key (personalization).
    #[serde(default)]
    pub gemini_api_key: Option<String>,
    /// Resend API key (confirmation email). Email is skipped when unset.
    #[serde(default)]
    pub resend_api_key: Option<String>,
    /// Sender address for confirmation email.
    #[serde(default)]
    pub resend_from_email: Option<String>,
    #[serde(default)]
    pub gateways: GatewaySettings,
    #[serde(default)]
    pub sync: SyncSettings,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            database_path: None,
            loops_api_key: None,
            gemini_api_key: None,
            resend_api_key: None,
            resend_from_email: None,
            gateways: GatewaySettings::default(),
            sync: SyncSettings::default(),
        }
    }
}

impl Config {
    /// Load configuration from the config file if present, then apply
    /// environment overrides.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Resolve the database path against the runtime paths.
    pub fn database_file(&self, paths: &Paths) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| paths.database_file())
    }

    /// Reject settings the gateways and sync processor cannot run with.
    pub fn validate(&self) -> CoreResult<()> {
        if self.gateways.max_attempts == 0 {
            return Err(CoreError::Config(
                "gateways.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.sync.batch_size == 0 {
            return Err(CoreError::Config(
                "sync.batch_size must be at least 1".to_string(),
            ));
        }
        if self.sync.max_retries == 0 {
            return Err(CoreError::Config(
                "sync.max_retries must be at least 1".to_string(),
            ));
        }
        if self.sync.interval_secs == 0 {
            return Err(CoreError::Config(
                "sync.interval_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    fn load_from_env(&mut self) {
        if let Some(level) = env_value("RSVP_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(path) = env_value("RSVP_DATABASE_PATH") {
            self.database_path = Some(PathBuf::from(path));
        }
        if let Some(key) = env_value("LOOPS_API_KEY") {
            self.loops_api_key = Some(key);
        }
        if let Some(key) = env_value("GEMINI_API_KEY") {
            self.gemini_api_key = Some(key);
        }
        if let Some(key) = env_value("RESEND_API_KEY") {
            self.resend_api_key = Some(key);
        }
        if let Some(from) = env_value("RESEND_FROM_EMAIL") {
            self.resend_from_email = Some(from);
        }
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|value| !value.is_empty())
}
