//! Service configuration loaded from environment variables.

use std::time::Duration;

use checkout::ReclaimerConfig;
use domain::DEFAULT_MAX_ATTEMPTS;

/// Output format of the log layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "text" | "pretty" => Some(LogFormat::Text),
            "json" => Some(LogFormat::Json),
            _ => None,
        }
    }
}

/// Service configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default: `text`)
/// - `DATABASE_URL`: PostgreSQL URL; in-memory stores when unset
/// - `RECLAIM_INTERVAL_SECS`: seconds between reclaimer sweeps (default: `120`)
/// - `CHECKOUT_TIMEOUT_SECS`: checkout window in seconds (default: `300`)
/// - `STOCK_MAX_ATTEMPTS`: stock decrement retry budget (default: `3`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub reclaim_interval: Duration,
    pub checkout_timeout: Duration,
    pub stock_max_attempts: u32,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    ///
    /// Unparseable values fall back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let secs = |key: &str, default: Duration| {
            lookup(key)
                .and_then(|v| v.parse::<u64>().ok())
                .filter(|&s| s > 0)
                .map(Duration::from_secs)
                .unwrap_or(default)
        };

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: lookup("LOG_FORMAT")
                .and_then(|f| LogFormat::parse(&f))
                .unwrap_or_default(),
            database_url: lookup("DATABASE_URL").filter(|url| !url.is_empty()),
            reclaim_interval: secs("RECLAIM_INTERVAL_SECS", defaults.reclaim_interval),
            checkout_timeout: secs("CHECKOUT_TIMEOUT_SECS", defaults.checkout_timeout),
            stock_max_attempts: lookup("STOCK_MAX_ATTEMPTS")
                .and_then(|n| n.parse().ok())
                .filter(|&n| n > 0)
                .unwrap_or(defaults.stock_max_attempts),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn reclaimer(&self) -> ReclaimerConfig {
        ReclaimerConfig {
            interval: self.reclaim_interval,
            checkout_timeout: self.checkout_timeout,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let reclaimer = ReclaimerConfig::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            reclaim_interval: reclaimer.interval,
            checkout_timeout: reclaimer.checkout_timeout,
            stock_max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}
