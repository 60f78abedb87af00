//! Database connection health tracking

use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU64, AtomicU8, Ordering};

use super::current_time_ms;

/// Database connection health status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DatabaseHealthStatus {
    /// Startup has not published a handle yet
    Connecting = 0,
    /// Last probe succeeded (possibly after recovery)
    Healthy = 1,
    /// Probe still failing after the recovery sequence
    Unhealthy = 2,
}

impl DatabaseHealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseHealthStatus::Connecting => "connecting",
            DatabaseHealthStatus::Healthy => "healthy",
            DatabaseHealthStatus::Unhealthy => "unhealthy",
        }
    }
}

impl From<u8> for DatabaseHealthStatus {
    fn from(value: u8) -> Self {
        match value {
            1 => DatabaseHealthStatus::Healthy,
            2 => DatabaseHealthStatus::Unhealthy,
            _ => DatabaseHealthStatus::Connecting,
        }
    }
}

/// Database health tracker, shared between the handle and the monitor
pub struct DatabaseHealth {
    status: AtomicU8,
    last_checked: AtomicI64,
    last_healthy: AtomicI64,
    consecutive_failures: AtomicU32,
    total_recoveries: AtomicU64,
    total_checks: AtomicU64,
}

impl DatabaseHealth {
    pub fn new() -> Self {
        Self {
            status: AtomicU8::new(DatabaseHealthStatus::Connecting as u8),
            last_checked: AtomicI64::new(0),
            last_healthy: AtomicI64::new(0),
            consecutive_failures: AtomicU32::new(0),
            total_recoveries: AtomicU64::new(0),
            total_checks: AtomicU64::new(0),
        }
    }

    /// Mark a successful probe
    pub fn set_healthy(&self) {
        let now = current_time_ms();
        self.status
            .store(DatabaseHealthStatus::Healthy as u8, Ordering::Release);
        self.last_checked.store(now, Ordering::Release);
        self.last_healthy.store(now, Ordering::Release);
        self.consecutive_failures.store(0, Ordering::Release);
    }

    /// Mark a probe that only succeeded after the recovery sequence
    pub fn set_recovered(&self) {
        self.set_healthy();
        self.total_recoveries.fetch_add(1, Ordering::AcqRel);
    }

    /// Mark a probe that kept failing after recovery
    pub fn set_unhealthy(&self) {
        self.status
            .store(DatabaseHealthStatus::Unhealthy as u8, Ordering::Release);
        self.last_checked.store(current_time_ms(), Ordering::Release);
        self.consecutive_failures.fetch_add(1, Ordering::AcqRel);
    }

    /// Count one monitor tick
    pub fn record_check(&self) {
        self.total_checks.fetch_add(1, Ordering::AcqRel);
    }

    /// Get current status
    pub fn status(&self) -> DatabaseHealthStatus {
        DatabaseHealthStatus::from(self.status.load(Ordering::Acquire))
    }

    /// Check if the database is healthy
    pub fn is_healthy(&self) -> bool {
        self.status() == DatabaseHealthStatus::Healthy
    }

    /// Get statistics snapshot
    pub fn stats(&self) -> DatabaseHealthStats {
        DatabaseHealthStats {
            status: self.status(),
            last_checked_ms: self.last_checked.load(Ordering::Acquire),
            last_healthy_ms: self.last_healthy.load(Ordering::Acquire),
            consecutive_failures: self.consecutive_failures.load(Ordering::Acquire),
            total_recoveries: self.total_recoveries.load(Ordering::Acquire),
            total_checks: self.total_checks.load(Ordering::Acquire),
        }
    }
}

impl Default for DatabaseHealth {
    fn default() -> Self {
        Self::new()
    }
}

/// Database health statistics
#[derive(Debug, Clone)]
pub struct DatabaseHealthStats {
    pub status: DatabaseHealthStatus,
    pub last_checked_ms: i64,
    pub last_healthy_ms: i64,
    pub consecutive_failures: u32,
    pub total_recoveries: u64,
    pub total_checks: u64,
}
