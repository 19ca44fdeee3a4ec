use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub kafka: KafkaConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub business_rules: BusinessRules,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    /// Single ticket price in minor units.
    #[serde(default = "default_ticket_price")]
    pub ticket_price: i64,
    #[serde(default = "default_recent_window")]
    pub recent_window: usize,
    #[serde(default = "default_notice_feed_limit")]
    pub notice_feed_limit: usize,
    #[serde(default = "default_max_notice_chars")]
    pub max_notice_chars: usize,
    #[serde(default = "default_token_window_secs")]
    pub token_window_secs: i64,
    #[serde(default = "default_token_refresh_secs")]
    pub token_refresh_secs: u64,
    /// When set, verification rejects tokens older than this many windows.
    #[serde(default)]
    pub token_max_age_windows: Option<i64>,
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,
    #[serde(default = "default_pulse_millis")]
    pub pulse_millis: u64,
}

fn default_ticket_price() -> i64 { 499 }
fn default_recent_window() -> usize { 10 }
fn default_notice_feed_limit() -> usize { 3 }
fn default_max_notice_chars() -> usize { 280 }
fn default_token_window_secs() -> i64 { 60 }
fn default_token_refresh_secs() -> u64 { 10 }
fn default_store_timeout_ms() -> u64 { 5000 }
fn default_pulse_millis() -> u64 { 4000 }

impl Default for BusinessRules {
    fn default() -> Self {
        Self {
            ticket_price: default_ticket_price(),
            recent_window: default_recent_window(),
            notice_feed_limit: default_notice_feed_limit(),
            max_notice_chars: default_max_notice_chars(),
            token_window_secs: default_token_window_secs(),
            token_refresh_secs: default_token_refresh_secs(),
            token_max_age_windows: None,
            store_timeout_ms: default_store_timeout_ms(),
            pulse_millis: default_pulse_millis(),
        }
    }
}

impl BusinessRules {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn pulse_duration(&self) -> Duration {
        Duration::from_millis(self.pulse_millis)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_expiration_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

/// No URL means the in-memory store.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct DatabaseConfig {
    pub url: Option<String>,
}

/// No URL disables rate limiting.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct RedisConfig {
    pub url: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct KafkaConfig {
    pub brokers: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RateLimitConfig {
    pub requests: i64,
    pub window_seconds: i64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { requests: 100, window_seconds: 60 }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides are optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local, uncommitted overrides
            .add_source(config::File::with_name("config/local").required(false))
            // Eg.. `GATEPASS_SERVER__PORT=8080` sets `server.port`
            .add_source(config::Environment::with_prefix("GATEPASS").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
