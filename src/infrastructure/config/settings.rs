use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub realtime: RealtimeConfig,
    #[serde(default)]
    pub notification: NotificationConfig,
    #[serde(default)]
    pub sweep: SweepConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub secret: String,
    pub issuer: Option<String>,
    pub audience: Option<String>,
}

/// Settings for the session/signaling side
#[derive(Debug, Clone, Deserialize)]
pub struct RealtimeConfig {
    /// Buffer size of the per-connection outbound channel
    #[serde(default = "default_channel_buffer")]
    pub channel_buffer: usize,
    /// Chat history window returned on join
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

/// Settings for the notification pipeline
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    /// Interval between queue drain ticks in milliseconds
    #[serde(default = "default_drain_interval_ms")]
    pub drain_interval_ms: u64,
    /// Default notification expiry in seconds
    #[serde(default = "default_expiry_seconds")]
    pub default_expiry_seconds: u64,
}

/// Intervals and thresholds for the periodic sweep jobs
#[derive(Debug, Clone, Deserialize)]
pub struct SweepConfig {
    #[serde(default = "default_overdue_interval")]
    pub overdue_interval_secs: u64,
    /// Minutes after placement before an undelivered order counts as overdue
    #[serde(default = "default_overdue_after")]
    pub overdue_after_mins: i64,

    #[serde(default = "default_pickup_interval")]
    pub pickup_interval_secs: u64,
    /// Minutes an order may sit ready before a pickup reminder goes out
    #[serde(default = "default_pickup_after")]
    pub pickup_after_mins: i64,

    #[serde(default = "default_tracking_interval")]
    pub tracking_interval_secs: u64,
    /// Minutes before an in-flight delivery's tracking counts as stale
    #[serde(default = "default_tracking_stale")]
    pub tracking_stale_mins: i64,

    #[serde(default = "default_completion_interval")]
    pub completion_interval_secs: u64,
    /// Minutes after delivery before asking the customer to confirm completion
    #[serde(default = "default_completion_after")]
    pub completion_after_mins: i64,

    #[serde(default = "default_feedback_interval")]
    pub feedback_interval_secs: u64,
    /// Minutes after completion before requesting feedback
    #[serde(default = "default_feedback_after")]
    pub feedback_after_mins: i64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8082
}

fn default_channel_buffer() -> usize {
    32
}

fn default_history_limit() -> usize {
    100
}

fn default_drain_interval_ms() -> u64 {
    250
}

fn default_expiry_seconds() -> u64 {
    86400 // 24 hours
}

fn default_overdue_interval() -> u64 {
    300 // 5 minutes
}

fn default_overdue_after() -> i64 {
    120 // 2 hours
}

fn default_pickup_interval() -> u64 {
    600 // 10 minutes
}

fn default_pickup_after() -> i64 {
    60 // 1 hour
}

fn default_tracking_interval() -> u64 {
    120 // 2 minutes
}

fn default_tracking_stale() -> i64 {
    10
}

fn default_completion_interval() -> u64 {
    900 // 15 minutes
}

fn default_completion_after() -> i64 {
    30
}

fn default_feedback_interval() -> u64 {
    3600 // 1 hour
}

fn default_feedback_after() -> i64 {
    1440 // 1 day
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            // Start with default values
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8082)?
            .set_default("realtime.channel_buffer", 32)?
            .set_default("realtime.history_limit", 100)?
            .set_default("notification.drain_interval_ms", 250)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Load from environment variables
            // SERVER_HOST, SERVER_PORT, AUTH_SECRET, etc.
            .add_source(
                Environment::default()
                    .separator("_")
                    .try_parsing(true)
                    .list_separator(","),
            );

        builder.build()?.try_deserialize()
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: vec![],
        }
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            channel_buffer: default_channel_buffer(),
            history_limit: default_history_limit(),
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            drain_interval_ms: default_drain_interval_ms(),
            default_expiry_seconds: default_expiry_seconds(),
        }
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            overdue_interval_secs: default_overdue_interval(),
            overdue_after_mins: default_overdue_after(),
            pickup_interval_secs: default_pickup_interval(),
            pickup_after_mins: default_pickup_after(),
            tracking_interval_secs: default_tracking_interval(),
            tracking_stale_mins: default_tracking_stale(),
            completion_interval_secs: default_completion_interval(),
            completion_after_mins: default_completion_after(),
            feedback_interval_secs: default_feedback_interval(),
            feedback_after_mins: default_feedback_after(),
        }
    }
}
