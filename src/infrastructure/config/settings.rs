use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub otel: OtelConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// `sqlite` or `postgres`
    #[serde(default = "default_db_kind")]
    pub kind: String,
    #[serde(default = "default_db_host")]
    pub host: String,
    #[serde(default = "default_db_port")]
    pub port: u16,
    #[serde(default = "default_db_user")]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_db_name")]
    pub name: String,
    /// SQLite database file
    #[serde(default = "default_db_path")]
    pub path: String,
    /// PostgreSQL session time zone
    #[serde(default = "default_timezone")]
    pub timezone: Option<String>,
    /// Insert sample articles into an empty store after connecting
    #[serde(default)]
    pub seed_sample_data: bool,
    #[serde(default)]
    pub pool: PoolSettings,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub monitor: MonitorSettings,
}

/// Pool limits; unset values fall back to the store kind's defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PoolSettings {
    pub max_open: Option<u32>,
    pub max_idle: Option<u32>,
    pub max_lifetime_seconds: Option<u64>,
    pub max_idle_lifetime_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_base")]
    pub backoff_base_seconds: u64,
    #[serde(default = "default_backoff_cap")]
    pub backoff_cap_seconds: u64,
    /// 0.0 disables jitter
    #[serde(default)]
    pub jitter_factor: f64,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_seconds: u64,
    #[serde(default = "default_schema_timeout")]
    pub schema_timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorSettings {
    #[serde(default = "default_monitor_interval")]
    pub interval_seconds: u64,
    #[serde(default = "default_recovery_pause")]
    pub recovery_pause_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OtelConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_otel_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_sampling_ratio")]
    pub sampling_ratio: f64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    9999
}

fn default_db_kind() -> String {
    "sqlite".to_string()
}

fn default_db_host() -> String {
    "localhost".to_string()
}

fn default_db_port() -> u16 {
    5432
}

fn default_db_user() -> String {
    "postgres".to_string()
}

fn default_db_name() -> String {
    "news_portal".to_string()
}

fn default_db_path() -> String {
    "./news.db".to_string()
}

fn default_timezone() -> Option<String> {
    Some("Asia/Dhaka".to_string())
}

fn default_max_attempts() -> u32 {
    10
}

fn default_backoff_base() -> u64 {
    2
}

fn default_backoff_cap() -> u64 {
    60
}

fn default_probe_timeout() -> u64 {
    5
}

fn default_schema_timeout() -> u64 {
    10
}

fn default_monitor_interval() -> u64 {
    30
}

fn default_recovery_pause() -> u64 {
    1000 // 1 second
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_service_name() -> String {
    "news-portal-store".to_string()
}

fn default_sampling_ratio() -> f64 {
    1.0
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            // Start with default values
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 9999)?
            .set_default("database.kind", "sqlite")?
            .set_default("database.retry.max_attempts", 10)?
            .set_default("database.monitor.interval_seconds", 30)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Nested keys: DATABASE__POOL__MAX_OPEN, SERVER__PORT, OTEL__ENABLED, ...
            .add_source(
                Environment::default()
                    .separator("__")
                    .try_parsing(true),
            )
            // Flat variables used by existing deployments win over everything
            .set_override_option("database.kind", env::var("DB_TYPE").ok())?
            .set_override_option("database.host", env::var("DB_HOST").ok())?
            .set_override_option("database.port", env::var("DB_PORT").ok())?
            .set_override_option("database.user", env::var("DB_USER").ok())?
            .set_override_option("database.password", env::var("DB_PASSWORD").ok())?
            .set_override_option("database.name", env::var("DB_NAME").ok())?
            .set_override_option("database.path", env::var("DB_PATH").ok())?
            .set_override_option("server.port", env::var("APP_PORT").ok())?;

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
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            kind: default_db_kind(),
            host: default_db_host(),
            port: default_db_port(),
            user: default_db_user(),
            password: String::new(),
            name: default_db_name(),
            path: default_db_path(),
            timezone: default_timezone(),
            seed_sample_data: false,
            pool: PoolSettings::default(),
            retry: RetrySettings::default(),
            monitor: MonitorSettings::default(),
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base_seconds: default_backoff_base(),
            backoff_cap_seconds: default_backoff_cap(),
            jitter_factor: 0.0,
            probe_timeout_seconds: default_probe_timeout(),
            schema_timeout_seconds: default_schema_timeout(),
        }
    }
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            interval_seconds: default_monitor_interval(),
            recovery_pause_ms: default_recovery_pause(),
        }
    }
}

impl Default for OtelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_otel_endpoint(),
            service_name: default_service_name(),
            sampling_ratio: default_sampling_ratio(),
        }
    }
}
