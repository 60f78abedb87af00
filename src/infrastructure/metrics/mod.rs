//! Prometheus metrics for the store connection lifecycle.
//!
//! - Connect attempts by outcome
//! - Connection status as seen by the monitor
//! - Monitor tick outcomes, recoveries and probe latency
//! - Pool occupancy

mod helpers;

pub use helpers::{encode_metrics, DatabaseMetrics};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "news_db";

lazy_static! {
    // ============================================================================
    // Connection Metrics
    // ============================================================================

    /// Startup connect attempts by outcome
    pub static ref CONNECT_ATTEMPTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_connect_attempts_total", METRIC_PREFIX),
        "Total database connect attempts",
        &["outcome"]
    ).unwrap();

    /// Database connection status (1 = reachable, 0 = unreachable)
    pub static ref CONNECTION_STATUS: IntGauge = register_int_gauge!(
        format!("{}_connection_status", METRIC_PREFIX),
        "Database connection status (1=reachable, 0=unreachable)"
    ).unwrap();

    // ============================================================================
    // Monitor Metrics
    // ============================================================================

    /// Monitor ticks by outcome
    pub static ref MONITOR_TICKS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_monitor_ticks_total", METRIC_PREFIX),
        "Total connection monitor ticks",
        &["outcome"]
    ).unwrap();

    /// Successful in-place recoveries
    pub static ref RECOVERIES_TOTAL: IntCounter = register_int_counter!(
        format!("{}_recoveries_total", METRIC_PREFIX),
        "Total successful connection recoveries"
    ).unwrap();

    /// Liveness probe latency
    pub static ref PROBE_LATENCY: Histogram = register_histogram!(
        format!("{}_probe_latency_seconds", METRIC_PREFIX),
        "Database liveness probe latency in seconds",
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0]
    ).unwrap();

    // ============================================================================
    // Pool Metrics
    // ============================================================================

    /// Open connections in the pool
    pub static ref POOL_SIZE: IntGauge = register_int_gauge!(
        format!("{}_pool_size", METRIC_PREFIX),
        "Open connections in the pool"
    ).unwrap();

    /// Idle connections in the pool
    pub static ref POOL_IDLE: IntGauge = register_int_gauge!(
        format!("{}_pool_idle", METRIC_PREFIX),
        "Idle connections in the pool"
    ).unwrap();
}
