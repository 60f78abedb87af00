use std::sync::Arc;
use std::time::Duration;

use super::{
    with_deadline, DatabaseError, DatabaseHealth, ManagedPool, PoolLimits, PoolStats, SqlxPool,
    StoreKind,
};

/// Published handle to the connected store.
///
/// Cheap to clone; every clone shares the same pool and health tracker. The
/// configuration is fixed at construction, only the pool's live connections
/// change afterwards.
pub struct ConnectionHandle<P> {
    pool: Arc<P>,
    kind: StoreKind,
    limits: PoolLimits,
    target: String,
    health: Arc<DatabaseHealth>,
}

/// Handle over the production sqlx pool.
pub type Database = ConnectionHandle<SqlxPool>;

impl<P: ManagedPool> ConnectionHandle<P> {
    pub(crate) fn new(pool: P, kind: StoreKind, limits: PoolLimits, target: String) -> Self {
        Self {
            pool: Arc::new(pool),
            kind,
            limits,
            target,
            health: Arc::new(DatabaseHealth::new()),
        }
    }

    /// Get a reference to the underlying pool.
    pub fn pool(&self) -> &P {
        &self.pool
    }

    pub fn kind(&self) -> StoreKind {
        self.kind
    }

    pub fn limits(&self) -> &PoolLimits {
        &self.limits
    }

    /// Connection target with the credential masked.
    pub fn target_masked(&self) -> &str {
        &self.target
    }

    pub fn health(&self) -> &Arc<DatabaseHealth> {
        &self.health
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Liveness probe bounded by `timeout`.
    pub async fn probe(&self, timeout: Duration) -> Result<(), DatabaseError> {
        with_deadline("liveness probe", timeout, self.pool.ping()).await
    }

    /// Close the pool gracefully.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

impl<P> Clone for ConnectionHandle<P> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            kind: self.kind,
            limits: self.limits,
            target: self.target.clone(),
            health: self.health.clone(),
        }
    }
}
