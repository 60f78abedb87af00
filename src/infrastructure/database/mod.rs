//! Relational store connection lifecycle.
//!
//! Connects with bounded exponential backoff, provisions the schema, and
//! keeps the pool healthy through a cancellable background monitor. Both
//! PostgreSQL and SQLite are supported through [`StoreKind`].

mod backoff;
mod error;
mod handle;
mod health;
mod manager;
mod monitor;
mod pool;
mod schema;
mod seed;
mod target;

#[cfg(test)]
pub(crate) mod testing;

pub use backoff::{BackoffConfig, ExponentialBackoff};
pub use error::DatabaseError;
pub(crate) use error::with_deadline;
pub use handle::{ConnectionHandle, Database};
pub use health::{DatabaseHealth, DatabaseHealthStats, DatabaseHealthStatus};
pub use manager::{ConnectionConfig, ConnectionManager};
pub use monitor::{ConnectionMonitor, MonitorConfig, MonitorHandle, TickOutcome};
pub use pool::{Connector, ManagedPool, PoolBackend, PoolStats, SqlxConnector, SqlxPool};
pub use schema::{ensure_schema, SchemaReport};
pub use seed::{seed_sample_articles, SampleArticle, SAMPLE_ARTICLES};
pub use target::{ConnectTarget, PoolLimits, StoreKind};

pub(crate) fn current_time_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
