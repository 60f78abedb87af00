mod settings;

pub use settings::{
    DatabaseConfig, MonitorSettings, OtelConfig, PoolSettings, RetrySettings, ServerConfig,
    Settings,
};
