//! Startup connect loop and handle publication.

use std::path::PathBuf;
use std::time::Duration;

use crate::config::DatabaseConfig;
use crate::metrics::DatabaseMetrics;

use super::{
    ensure_schema, with_deadline, BackoffConfig, ConnectTarget, ConnectionHandle,
    ConnectionMonitor, Connector, DatabaseError, ExponentialBackoff, ManagedPool, MonitorConfig,
    MonitorHandle, PoolLimits, SqlxConnector, StoreKind,
};

/// Everything the manager needs to bring a store online.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub target: ConnectTarget,
    pub limits: PoolLimits,
    /// Total connect attempts before startup is aborted
    pub max_attempts: u32,
    pub backoff: BackoffConfig,
    /// Deadline for each liveness probe
    pub probe_timeout: Duration,
    /// Deadline for each schema statement
    pub schema_timeout: Duration,
    pub monitor: MonitorConfig,
}

impl ConnectionConfig {
    /// Defaults for `target`: 10 attempts, 2s..60s backoff, 5s probes.
    pub fn new(target: ConnectTarget) -> Self {
        let limits = target.kind().default_limits();
        Self {
            target,
            limits,
            max_attempts: 10,
            backoff: BackoffConfig::default(),
            probe_timeout: Duration::from_secs(5),
            schema_timeout: Duration::from_secs(10),
            monitor: MonitorConfig::default(),
        }
    }

    pub fn from_settings(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        let kind: StoreKind = config.kind.parse()?;

        let target = match kind {
            StoreKind::Postgres => ConnectTarget::Postgres {
                host: config.host.clone(),
                port: config.port,
                user: config.user.clone(),
                password: config.password.clone(),
                database: config.name.clone(),
                timezone: config.timezone.clone().filter(|tz| !tz.is_empty()),
            },
            StoreKind::Sqlite => ConnectTarget::Sqlite {
                path: PathBuf::from(&config.path),
            },
        };

        let defaults = kind.default_limits();
        let limits = PoolLimits {
            max_open: config.pool.max_open.unwrap_or(defaults.max_open),
            max_idle: config.pool.max_idle.unwrap_or(defaults.max_idle),
            max_lifetime: config
                .pool
                .max_lifetime_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.max_lifetime),
            max_idle_lifetime: config
                .pool
                .max_idle_lifetime_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.max_idle_lifetime),
        };

        if limits.max_open == 0 {
            return Err(DatabaseError::InvalidTarget(
                "pool max_open must be at least 1".to_string(),
            ));
        }

        let probe_timeout = Duration::from_secs(config.retry.probe_timeout_seconds.max(1));

        Ok(Self {
            target,
            limits,
            max_attempts: config.retry.max_attempts.max(1),
            backoff: BackoffConfig {
                base_delay: Duration::from_secs(config.retry.backoff_base_seconds),
                max_delay: Duration::from_secs(config.retry.backoff_cap_seconds),
                jitter_factor: config.retry.jitter_factor,
            },
            probe_timeout,
            schema_timeout: Duration::from_secs(config.retry.schema_timeout_seconds.max(1)),
            monitor: MonitorConfig {
                interval: Duration::from_secs(config.monitor.interval_seconds.max(1)),
                probe_timeout,
                recovery_pause: Duration::from_millis(config.monitor.recovery_pause_ms),
            },
        })
    }
}

/// Owns the connect-with-retry lifecycle for one store.
pub struct ConnectionManager<C: Connector = SqlxConnector> {
    connector: C,
    config: ConnectionConfig,
}

impl ConnectionManager<SqlxConnector> {
    /// Manager over the production sqlx driver.
    pub fn from_settings(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        Ok(Self::new(SqlxConnector, ConnectionConfig::from_settings(config)?))
    }
}

impl<C: Connector> ConnectionManager<C> {
    pub fn new(connector: C, config: ConnectionConfig) -> Self {
        Self { connector, config }
    }

    /// Connect, retrying with exponential backoff.
    ///
    /// On success the pool limits are applied, the schema is ensured and the
    /// handle is returned. Exhausting every attempt yields
    /// [`DatabaseError::ConnectFailed`]; callers should abort startup.
    #[tracing::instrument(
        name = "database_connect",
        skip(self),
        fields(
            kind = %self.config.target.kind(),
            target = %self.config.target.masked()
        )
    )]
    pub async fn connect(&self) -> Result<ConnectionHandle<C::Pool>, DatabaseError> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut backoff = ExponentialBackoff::with_config(self.config.backoff.clone());
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            tracing::info!(attempt, max_attempts, "Attempting database connection");

            match self.try_connect().await {
                Ok(pool) => {
                    DatabaseMetrics::record_connect_attempt(true);
                    tracing::info!(attempt, max_attempts, "Database connection established");
                    return Ok(self.publish(pool).await);
                }
                Err(e) => {
                    DatabaseMetrics::record_connect_attempt(false);
                    last_error = e.to_string();

                    // No wait after the final attempt, nothing follows it
                    if attempt == max_attempts {
                        tracing::warn!(
                            attempt,
                            max_attempts,
                            error = %e,
                            "Failed to connect to database"
                        );
                        break;
                    }

                    let wait = backoff.next_delay();
                    tracing::warn!(
                        attempt,
                        max_attempts,
                        error = %e,
                        wait_secs = wait.as_secs_f64(),
                        "Failed to connect to database, retrying"
                    );
                    tokio::time::sleep(wait).await;
                }
            }
        }

        DatabaseMetrics::set_connected(false);
        tracing::error!(
            attempts = max_attempts,
            error = %last_error,
            "Failed to connect to database, giving up"
        );

        Err(DatabaseError::ConnectFailed {
            attempts: max_attempts,
            last_error,
        })
    }

    /// [`connect`](Self::connect), then start the background monitor.
    pub async fn connect_and_monitor(
        &self,
    ) -> Result<(ConnectionHandle<C::Pool>, MonitorHandle), DatabaseError> {
        let handle = self.connect().await?;
        let monitor = ConnectionMonitor::spawn(handle.clone(), self.config.monitor.clone());
        Ok((handle, monitor))
    }

    /// One attempt: open the pool and verify it with a bounded probe.
    async fn try_connect(&self) -> Result<C::Pool, DatabaseError> {
        let timeout = self.config.probe_timeout;
        let pool = with_deadline(
            "pool open",
            timeout,
            self.connector.open(&self.config.target, &self.config.limits, timeout),
        )
        .await?;

        match with_deadline("liveness probe", timeout, pool.ping()).await {
            Ok(()) => Ok(pool),
            Err(e) => {
                // Discard the half-open pool; the next attempt starts fresh
                let _ = tokio::time::timeout(timeout, pool.close()).await;
                Err(e)
            }
        }
    }

    async fn publish(&self, pool: C::Pool) -> ConnectionHandle<C::Pool> {
        let limits = self.config.limits;
        let kind = self.config.target.kind();

        pool.set_max_idle(limits.max_idle).await;
        tracing::info!(
            max_open = limits.max_open,
            max_idle = limits.max_idle,
            max_lifetime_secs = limits.max_lifetime.as_secs(),
            max_idle_lifetime_secs = limits.max_idle_lifetime.as_secs(),
            "Database connection pool configured"
        );

        ensure_schema(&pool, kind, self.config.schema_timeout).await;

        let handle = ConnectionHandle::new(pool, kind, limits, self.config.target.masked());
        handle.health().set_healthy();
        DatabaseMetrics::set_connected(true);
        handle
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use tokio::time::Instant;

    use super::*;
    use crate::config::{DatabaseConfig, PoolSettings};
    use crate::database::testing::{AttemptFailure, ScriptedConnector};

    fn test_config() -> ConnectionConfig {
        ConnectionConfig::new(ConnectTarget::Sqlite {
            path: PathBuf::from("unused.db"),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_connects_on_first_attempt_without_waiting() {
        let connector = ScriptedConnector::new(0, AttemptFailure::Probe);
        let attempts = connector.attempts();
        let manager = ConnectionManager::new(connector, test_config());

        let start = Instant::now();
        let handle = manager.connect().await.expect("should connect");

        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert!(handle.health().is_healthy());
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_k_failures_with_exact_waits() {
        for failure in [AttemptFailure::Open, AttemptFailure::Probe] {
            let connector = ScriptedConnector::new(3, failure);
            let attempts = connector.attempts();
            let manager = ConnectionManager::new(connector, test_config());

            let start = Instant::now();
            manager.connect().await.expect("should connect on 4th attempt");

            assert_eq!(attempts.load(Ordering::SeqCst), 4);
            // 2s + 4s + 8s, then no further waits
            assert_eq!(start.elapsed(), Duration::from_secs(14));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_store_is_fatal_after_ten_attempts() {
        let connector = ScriptedConnector::unreachable();
        let attempts = connector.attempts();
        let manager = ConnectionManager::new(connector, test_config());

        let start = Instant::now();
        let err = match manager.connect().await {
            Ok(_) => panic!("no handle should be published"),
            Err(e) => e,
        };

        assert!(err.is_fatal());
        assert!(err.to_string().contains("10"));
        assert!(matches!(err, DatabaseError::ConnectFailed { attempts: 10, .. }));
        assert_eq!(attempts.load(Ordering::SeqCst), 10);
        // 2 + 4 + 8 + 16 + 32 + 60 * 4 between the ten attempts
        assert_eq!(start.elapsed(), Duration::from_secs(302));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_probe_is_bounded_by_timeout() {
        let connector = ScriptedConnector::new(1, AttemptFailure::HangingProbe);
        let attempts = connector.attempts();
        let manager = ConnectionManager::new(connector, test_config());

        let start = Instant::now();
        manager.connect().await.expect("second attempt should succeed");

        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        // 5s probe timeout + 2s backoff
        assert_eq!(start.elapsed(), Duration::from_secs(7));
    }

    #[tokio::test]
    async fn test_publish_configures_pool_and_schema() {
        let manager = ConnectionManager::new(
            ScriptedConnector::new(0, AttemptFailure::Probe),
            test_config(),
        );

        let handle = manager.connect().await.unwrap();
        let pool = handle.pool();

        assert_eq!(pool.idle_limits(), vec![2]);
        assert_eq!(
            pool.executed().len(),
            StoreKind::Sqlite.schema_statements().len()
        );
        assert_eq!(handle.kind(), StoreKind::Sqlite);
        assert_eq!(handle.limits().max_open, 10);

        handle.close().await;
        assert!(handle.pool().is_closed());
    }

    #[tokio::test]
    async fn test_schema_failures_do_not_block_startup() {
        let manager = ConnectionManager::new(
            ScriptedConnector::new(0, AttemptFailure::Probe),
            test_config(),
        );
        let handle = manager.connect().await.unwrap();

        handle.pool().fail_executes(true);
        let report = ensure_schema(handle.pool(), handle.kind(), Duration::from_secs(1)).await;
        assert!(!report.is_clean());
        assert!(handle.probe(Duration::from_secs(1)).await.is_ok());
    }

    #[test]
    fn test_config_from_settings_uses_kind_defaults() {
        let mut settings = DatabaseConfig::default();
        settings.kind = "postgres".to_string();
        settings.password = "hunter2".to_string();
        settings.pool = PoolSettings {
            max_idle: Some(7),
            ..Default::default()
        };

        let config = ConnectionConfig::from_settings(&settings).unwrap();
        assert_eq!(config.target.kind(), StoreKind::Postgres);
        assert_eq!(config.limits.max_open, 50);
        assert_eq!(config.limits.max_idle, 7);
        assert_eq!(config.max_attempts, 10);
        assert_eq!(config.backoff.base_delay, Duration::from_secs(2));
        assert_eq!(config.backoff.max_delay, Duration::from_secs(60));
        assert!(!config.target.masked().contains("hunter2"));
    }

    #[test]
    fn test_config_rejects_unknown_kind() {
        let mut settings = DatabaseConfig::default();
        settings.kind = "oracle".to_string();
        assert!(ConnectionConfig::from_settings(&settings).is_err());
    }
}
