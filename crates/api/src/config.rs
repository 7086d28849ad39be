//! Application configuration loaded from environment variables.

use std::time::Duration;

use fulfillment::FulfillmentConfig;

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT` — `pretty` or `json` (default: `pretty`)
/// - `DATABASE_URL` — Postgres URL; unset runs on the in-memory store
/// - `PAYMENT_WEBHOOK_SECRET` — signing secret for payment events; unset
///   rejects every delivery
/// - `SWEEP_SECRET` — bearer token for the sweep trigger; unset leaves it open
/// - `SWEEP_INTERVAL_SECS` — in-process sweep period, `0` disables (default: `3600`)
/// - `CART_IDLE_THRESHOLD_SECS` — idle time before a cart is abandoned (default: `3600`)
/// - `UPSTREAM_TIMEOUT_MS` — payment and notification timeout (default: `5000`)
/// - `RECOVERY_BASE_URL` — storefront base for recovery links
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub payment_webhook_secret: Option<String>,
    pub sweep_secret: Option<String>,
    pub sweep_interval_secs: u64,
    pub cart_idle_threshold_secs: u64,
    pub upstream_timeout_ms: u64,
    pub recovery_base_url: String,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let number = |key: &str, default: u64| non_empty(key).and_then(|v| v.parse().ok()).unwrap_or(default);

        Self {
            host: non_empty("HOST").unwrap_or(defaults.host),
            port: non_empty("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: non_empty("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: non_empty("LOG_FORMAT")
                .map(|v| LogFormat::parse(&v))
                .unwrap_or_default(),
            database_url: non_empty("DATABASE_URL"),
            payment_webhook_secret: non_empty("PAYMENT_WEBHOOK_SECRET"),
            sweep_secret: non_empty("SWEEP_SECRET"),
            sweep_interval_secs: number("SWEEP_INTERVAL_SECS", defaults.sweep_interval_secs),
            cart_idle_threshold_secs: number("CART_IDLE_THRESHOLD_SECS", defaults.cart_idle_threshold_secs),
            upstream_timeout_ms: number("UPSTREAM_TIMEOUT_MS", defaults.upstream_timeout_ms),
            recovery_base_url: non_empty("RECOVERY_BASE_URL").unwrap_or(defaults.recovery_base_url),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Period of the in-process sweep, or `None` when disabled.
    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }

    /// Operator-facing warnings about what this configuration leaves unwired.
    ///
    /// The binary always runs with the in-memory payment gateway, so that
    /// warning is unconditional.
    pub fn startup_warnings(&self) -> Vec<&'static str> {
        let mut warnings = vec![
            "no payment provider client configured, sessions resolve against an empty in-memory gateway and stay pending",
        ];
        if self.payment_webhook_secret.is_none() {
            warnings.push("PAYMENT_WEBHOOK_SECRET not set, payment events will be rejected");
        }
        if self.sweep_secret.is_none() {
            warnings.push("SWEEP_SECRET not set, the sweep endpoint is unauthenticated");
        }
        warnings
    }

    pub fn fulfillment(&self) -> FulfillmentConfig {
        FulfillmentConfig {
            idle_threshold: Duration::from_secs(self.cart_idle_threshold_secs),
            upstream_timeout: Duration::from_millis(self.upstream_timeout_ms),
            recovery_base_url: self.recovery_base_url.clone(),
            ..FulfillmentConfig::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            database_url: None,
            payment_webhook_secret: None,
            sweep_secret: None,
            sweep_interval_secs: 3600,
            cart_idle_threshold_secs: 3600,
            upstream_timeout_ms: 5000,
            recovery_base_url: "http://localhost:3000".to_string(),
        }
    }
}
