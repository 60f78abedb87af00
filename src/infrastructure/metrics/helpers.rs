//! Metrics helper structs for convenient metric recording

use std::time::Duration;

use prometheus::{Encoder, TextEncoder};

use crate::database::{PoolStats, TickOutcome};

use super::{
    CONNECTION_STATUS, CONNECT_ATTEMPTS_TOTAL, MONITOR_TICKS_TOTAL, POOL_IDLE, POOL_SIZE,
    PROBE_LATENCY, RECOVERIES_TOTAL,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for recording database metrics
pub struct DatabaseMetrics;

impl DatabaseMetrics {
    /// Record one startup connect attempt
    pub fn record_connect_attempt(success: bool) {
        let outcome = if success { "success" } else { "failure" };
        CONNECT_ATTEMPTS_TOTAL.with_label_values(&[outcome]).inc();
    }

    /// Set the reachability gauge
    pub fn set_connected(connected: bool) {
        CONNECTION_STATUS.set(if connected { 1 } else { 0 });
    }

    /// Record a monitor tick
    pub fn record_tick(outcome: TickOutcome) {
        MONITOR_TICKS_TOTAL
            .with_label_values(&[outcome.as_str()])
            .inc();
        if outcome == TickOutcome::Recovered {
            RECOVERIES_TOTAL.inc();
        }
    }

    /// Record liveness probe latency
    pub fn record_probe_latency(elapsed: Duration) {
        PROBE_LATENCY.observe(elapsed.as_secs_f64());
    }

    /// Update pool occupancy gauges
    pub fn record_pool_stats(stats: &PoolStats) {
        POOL_SIZE.set(stats.size as i64);
        POOL_IDLE.set(stats.idle as i64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorded_metrics_are_encoded() {
        DatabaseMetrics::record_connect_attempt(false);
        DatabaseMetrics::record_tick(TickOutcome::Recovered);
        DatabaseMetrics::record_pool_stats(&PoolStats {
            size: 3,
            idle: 1,
            max_open: 10,
            max_idle: 2,
        });

        let output = encode_metrics().unwrap();
        assert!(output.contains("news_db_connect_attempts_total"));
        assert!(output.contains("news_db_monitor_ticks_total"));
        assert!(output.contains("news_db_recoveries_total"));
        assert!(output.contains("news_db_pool_size"));
    }
}
