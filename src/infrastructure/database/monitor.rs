use std::time::Duration;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::metrics::DatabaseMetrics;

use super::{ConnectionHandle, ManagedPool};

/// Background monitor timing.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Time between ticks
    pub interval: Duration,
    /// Deadline for each probe within a tick
    pub probe_timeout: Duration,
    /// Pause between dropping idle connections and restoring the idle limit
    pub recovery_pause: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(5),
            recovery_pause: Duration::from_secs(1),
        }
    }
}

/// Result of a single monitor tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Healthy,
    /// First probe failed, the probe after recovery succeeded
    Recovered,
    /// Probe failed again after recovery
    StillFailing,
}

impl TickOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            TickOutcome::Healthy => "healthy",
            TickOutcome::Recovered => "recovered",
            TickOutcome::StillFailing => "still_failing",
        }
    }
}

/// Periodic liveness check with in-place pool recovery.
///
/// Failures are reported through logs, metrics and the handle's
/// [`DatabaseHealth`](super::DatabaseHealth); they never stop the loop.
pub struct ConnectionMonitor<P> {
    handle: ConnectionHandle<P>,
    config: MonitorConfig,
    shutdown: broadcast::Receiver<()>,
}

impl<P: ManagedPool> ConnectionMonitor<P> {
    pub fn new(
        handle: ConnectionHandle<P>,
        config: MonitorConfig,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            handle,
            config,
            shutdown,
        }
    }

    /// Spawn the monitor on its own task.
    pub fn spawn(handle: ConnectionHandle<P>, config: MonitorConfig) -> MonitorHandle {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let monitor = Self::new(handle, config, shutdown_rx);
        let task = tokio::spawn(async move {
            monitor.run().await;
        });

        MonitorHandle { shutdown_tx, task }
    }

    /// Run until shutdown is signalled.
    ///
    /// Dropping every sender detaches the monitor; it then runs for the
    /// rest of the process.
    pub async fn run(mut self) {
        let mut timer = tokio::time::interval(self.config.interval);
        // A slow tick delays the next one instead of bunching ticks up
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // Skip immediate first tick
        timer.tick().await;

        tracing::info!(
            interval_secs = self.config.interval.as_secs_f64(),
            probe_timeout_secs = self.config.probe_timeout.as_secs_f64(),
            target = %self.handle.target_masked(),
            "Connection monitor started"
        );

        let mut detached = false;

        loop {
            tokio::select! {
                signal = self.shutdown.recv(), if !detached => {
                    if let Err(RecvError::Closed) = signal {
                        tracing::debug!("Connection monitor handle dropped, running detached");
                        detached = true;
                        continue;
                    }
                    tracing::info!("Connection monitor received shutdown signal");
                    break;
                }
                _ = timer.tick() => {
                    self.tick().await;
                }
            }
        }

        tracing::info!("Connection monitor stopped");
    }

    /// Probe once and, on failure, run the recovery sequence.
    pub async fn tick(&self) -> TickOutcome {
        let health = self.handle.health();
        health.record_check();

        let outcome = match self.timed_probe().await {
            Ok(()) => {
                tracing::debug!("Connection monitor: database ping succeeded");
                health.set_healthy();
                TickOutcome::Healthy
            }
            Err(e) => {
                tracing::warn!(error = %e, "Connection monitor: database ping failed");
                tracing::info!("Connection monitor: attempting to recover connection");
                self.recover().await
            }
        };

        DatabaseMetrics::record_tick(outcome);
        DatabaseMetrics::record_pool_stats(&self.handle.pool_stats());
        outcome
    }

    async fn recover(&self) -> TickOutcome {
        let pool = self.handle.pool();
        let max_idle = self.handle.limits().max_idle;

        let dropped = pool.set_max_idle(0).await;
        tokio::time::sleep(self.config.recovery_pause).await;
        pool.set_max_idle(max_idle).await;

        match self.timed_probe().await {
            Ok(()) => {
                tracing::info!(dropped_idle = dropped, "Connection monitor: connection recovered");
                self.handle.health().set_recovered();
                DatabaseMetrics::set_connected(true);
                TickOutcome::Recovered
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    dropped_idle = dropped,
                    "Connection monitor: connection recovery failed"
                );
                self.handle.health().set_unhealthy();
                DatabaseMetrics::set_connected(false);
                TickOutcome::StillFailing
            }
        }
    }

    async fn timed_probe(&self) -> Result<(), super::DatabaseError> {
        let start = std::time::Instant::now();
        let result = self.handle.probe(self.config.probe_timeout).await;
        DatabaseMetrics::record_probe_latency(start.elapsed());
        result
    }
}

/// Owner of a spawned monitor task.
///
/// The monitor only stops through [`stop`](Self::stop); dropping the handle
/// leaves it running with no way to stop it.
#[must_use = "dropping the handle detaches the monitor; call `stop` on shutdown"]
pub struct MonitorHandle {
    shutdown_tx: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Signal the monitor and wait for it to exit.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Connection monitor task failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::database::testing::{Ping, ScriptedPool};
    use crate::database::{DatabaseHealthStatus, StoreKind};

    fn handle_with(pool: ScriptedPool) -> ConnectionHandle<ScriptedPool> {
        let kind = StoreKind::Sqlite;
        let handle = ConnectionHandle::new(
            pool,
            kind,
            kind.default_limits(),
            format!("sqlite://{}", PathBuf::from("test.db").display()),
        );
        handle.health().set_healthy();
        handle
    }

    fn monitor_for(handle: ConnectionHandle<ScriptedPool>) -> ConnectionMonitor<ScriptedPool> {
        let (_tx, rx) = broadcast::channel(1);
        ConnectionMonitor::new(handle, MonitorConfig::default(), rx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_healthy_tick_takes_no_action() {
        let handle = handle_with(ScriptedPool::healthy());
        let monitor = monitor_for(handle.clone());

        assert_eq!(monitor.tick().await, TickOutcome::Healthy);
        assert_eq!(handle.pool().pings(), 1);
        assert!(handle.pool().idle_limits().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fail_then_recover_within_tick() {
        let handle = handle_with(ScriptedPool::healthy().script([Ping::Fail, Ping::Ok]));
        let monitor = monitor_for(handle.clone());

        let start = tokio::time::Instant::now();
        assert_eq!(monitor.tick().await, TickOutcome::Recovered);

        // Idle limit dropped to zero, then restored to the configured value
        assert_eq!(handle.pool().idle_limits(), vec![0, 2]);
        assert_eq!(handle.pool().pings(), 2);
        assert!(start.elapsed() >= Duration::from_secs(1));

        let stats = handle.health().stats();
        assert_eq!(stats.status, DatabaseHealthStatus::Healthy);
        assert_eq!(stats.total_recoveries, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_still_failing_marks_unhealthy() {
        let handle = handle_with(ScriptedPool::new(Ping::Fail));
        let monitor = monitor_for(handle.clone());

        assert_eq!(monitor.tick().await, TickOutcome::StillFailing);
        assert_eq!(handle.health().status(), DatabaseHealthStatus::Unhealthy);

        handle.pool().set_fallback(Ping::Ok);
        assert_eq!(monitor.tick().await, TickOutcome::Healthy);
        assert!(handle.health().is_healthy());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_probe_is_bounded() {
        let handle = handle_with(ScriptedPool::new(Ping::Hang));
        let monitor = monitor_for(handle.clone());

        let start = tokio::time::Instant::now();
        assert_eq!(monitor.tick().await, TickOutcome::StillFailing);
        // probe timeout + recovery pause + probe timeout
        assert_eq!(start.elapsed(), Duration::from_secs(11));
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_keeps_ticking_while_failing() {
        let handle = handle_with(ScriptedPool::new(Ping::Fail));
        let monitor = ConnectionMonitor::spawn(handle.clone(), MonitorConfig::default());

        tokio::time::sleep(Duration::from_secs(125)).await;

        let stats = handle.health().stats();
        assert!(stats.total_checks >= 3, "ticks: {}", stats.total_checks);
        assert_eq!(stats.consecutive_failures as u64, stats.total_checks);
        assert!(monitor.is_running());

        tokio::time::timeout(Duration::from_secs(2), monitor.stop())
            .await
            .expect("Monitor should stop");
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_handle_keeps_monitor_running() {
        let handle = handle_with(ScriptedPool::healthy());
        let monitor = ConnectionMonitor::spawn(handle.clone(), MonitorConfig::default());
        drop(monitor);

        tokio::time::sleep(Duration::from_secs(95)).await;

        let stats = handle.health().stats();
        assert!(stats.total_checks >= 3, "ticks: {}", stats.total_checks);
        assert_eq!(handle.pool().pings() as u64, stats.total_checks);
    }

    #[tokio::test]
    async fn test_monitor_shutdown() {
        let handle = handle_with(ScriptedPool::healthy());
        let monitor = ConnectionMonitor::spawn(handle, MonitorConfig::default());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(monitor.is_running());

        tokio::time::timeout(Duration::from_secs(2), monitor.stop())
            .await
            .expect("Monitor should stop");
    }
}
