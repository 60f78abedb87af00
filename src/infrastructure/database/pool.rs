//! Pooled store access: the driver seam and its sqlx implementation.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use sqlx::pool::PoolOptions;
use sqlx::postgres::{PgConnectOptions, PgPool, PgSslMode};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};
use sqlx::{Connection, Pool};

use super::{with_deadline, ConnectTarget, DatabaseError, PoolLimits, StoreKind};

/// Delay between the release-settling trim passes
const SETTLE_DELAY: Duration = Duration::from_millis(50);

/// Snapshot of pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Connections currently open (idle + in use)
    pub size: u32,
    /// Connections sitting idle in the pool
    pub idle: u32,
    pub max_open: u32,
    pub max_idle: u32,
}

/// A pooled set of connections the manager can probe and reconfigure.
///
/// Implementations must be safe for concurrent use by request tasks while
/// the monitor reconfigures them.
#[async_trait]
pub trait ManagedPool: Send + Sync + 'static {
    /// Round-trip liveness check on one pooled connection.
    async fn ping(&self) -> Result<(), DatabaseError>;

    /// Execute a single statement, returning affected rows.
    async fn execute(&self, statement: &str) -> Result<u64, DatabaseError>;

    /// Set the idle limit, closing idle connections above it.
    ///
    /// Returns the number of connections closed.
    async fn set_max_idle(&self, max_idle: u32) -> usize;

    fn stats(&self) -> PoolStats;

    /// Close every connection; further use fails.
    async fn close(&self);
}

/// Opens pools for a connection target.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Pool: ManagedPool;

    /// Create a pool honoring `limits`. The pool is not probed here.
    async fn open(
        &self,
        target: &ConnectTarget,
        limits: &PoolLimits,
        acquire_timeout: Duration,
    ) -> Result<Self::Pool, DatabaseError>;
}

/// Backend-specific sqlx pool.
#[derive(Debug, Clone)]
pub enum PoolBackend {
    Postgres(PgPool),
    Sqlite(SqlitePool),
}

impl PoolBackend {
    fn size(&self) -> u32 {
        match self {
            PoolBackend::Postgres(pool) => pool.size(),
            PoolBackend::Sqlite(pool) => pool.size(),
        }
    }

    fn num_idle(&self) -> usize {
        match self {
            PoolBackend::Postgres(pool) => pool.num_idle(),
            PoolBackend::Sqlite(pool) => pool.num_idle(),
        }
    }

    async fn trim_idle(&self, keep: u32, close_timeout: Duration) -> usize {
        match self {
            PoolBackend::Postgres(pool) => trim_idle(pool, keep, close_timeout).await,
            PoolBackend::Sqlite(pool) => trim_idle(pool, keep, close_timeout).await,
        }
    }
}

/// Idle limit shared between [`SqlxPool`] and the pool's release hook.
///
/// sqlx has no runtime idle cap, so every released connection is checked
/// against it and closed instead of parked once the cap is reached. The
/// driver pings a released connection after the hook has run, so releases
/// landing together can all pass the check; a settling task trims the
/// overshoot once they are parked.
#[derive(Debug, Clone)]
struct IdleCap {
    limit: Arc<AtomicU32>,
    // Detached on close and drop; the hook lives inside the pool it reads
    pool: Arc<RwLock<Option<PoolBackend>>>,
    /// Releases admitted to the idle set so far
    admitted: Arc<AtomicU64>,
    settling: Arc<AtomicBool>,
    close_timeout: Duration,
}

impl IdleCap {
    fn new(limit: u32, close_timeout: Duration) -> Self {
        Self {
            limit: Arc::new(AtomicU32::new(limit)),
            pool: Arc::new(RwLock::new(None)),
            admitted: Arc::new(AtomicU64::new(0)),
            settling: Arc::new(AtomicBool::new(false)),
            close_timeout,
        }
    }

    fn limit(&self) -> u32 {
        self.limit.load(Ordering::Acquire)
    }

    fn set_limit(&self, limit: u32) {
        self.limit.store(limit, Ordering::Release);
    }

    fn attach(&self, backend: &PoolBackend) {
        if let Ok(mut slot) = self.pool.write() {
            *slot = Some(backend.clone());
        }
    }

    fn detach(&self) {
        if let Ok(mut slot) = self.pool.write() {
            slot.take();
        }
    }

    fn backend(&self) -> Option<PoolBackend> {
        self.pool.read().ok().and_then(|slot| slot.clone())
    }

    /// Whether a connection being released may stay idle.
    fn admits_release(&self) -> bool {
        match self.backend() {
            Some(backend) => (backend.num_idle() as u32) < self.limit(),
            None => true,
        }
    }

    /// Called from the release hook; decides and schedules settling.
    fn on_release(&self) -> bool {
        if !self.admits_release() {
            return false;
        }

        self.admitted.fetch_add(1, Ordering::AcqRel);
        if !self.settling.swap(true, Ordering::AcqRel) {
            let cap = self.clone();
            tokio::spawn(async move { cap.settle().await });
        }
        true
    }

    /// Trim to the limit until a full pass sees no new admitted release.
    async fn settle(self) {
        loop {
            let mut seen = self.admitted.load(Ordering::Acquire);
            loop {
                tokio::time::sleep(SETTLE_DELAY).await;
                let Some(backend) = self.backend() else {
                    break;
                };

                let closed = backend.trim_idle(self.limit(), self.close_timeout).await;
                if closed > 0 {
                    tracing::debug!(closed, max_idle = self.limit(), "Closed surplus idle connections");
                }

                let now = self.admitted.load(Ordering::Acquire);
                if now == seen {
                    break;
                }
                seen = now;
            }

            self.settling.store(false, Ordering::Release);

            // A release admitted after the last pass found the flag still set
            if self.admitted.load(Ordering::Acquire) == seen
                || self.settling.swap(true, Ordering::AcqRel)
            {
                break;
            }
        }
    }
}

/// sqlx-backed pool for either store kind.
#[derive(Debug)]
pub struct SqlxPool {
    backend: PoolBackend,
    max_open: u32,
    idle_cap: IdleCap,
}

impl SqlxPool {
    fn new(backend: PoolBackend, max_open: u32, idle_cap: IdleCap) -> Self {
        idle_cap.attach(&backend);
        Self {
            backend,
            max_open,
            idle_cap,
        }
    }

    /// Underlying sqlx pool, for issuing queries.
    pub fn backend(&self) -> &PoolBackend {
        &self.backend
    }

    pub fn kind(&self) -> StoreKind {
        match self.backend {
            PoolBackend::Postgres(_) => StoreKind::Postgres,
            PoolBackend::Sqlite(_) => StoreKind::Sqlite,
        }
    }
}

#[async_trait]
impl ManagedPool for SqlxPool {
    async fn ping(&self) -> Result<(), DatabaseError> {
        match &self.backend {
            PoolBackend::Postgres(pool) => ping_pool(pool).await?,
            PoolBackend::Sqlite(pool) => ping_pool(pool).await?,
        }
        Ok(())
    }

    async fn execute(&self, statement: &str) -> Result<u64, DatabaseError> {
        let rows = match &self.backend {
            PoolBackend::Postgres(pool) => sqlx::query(statement).execute(pool).await?.rows_affected(),
            PoolBackend::Sqlite(pool) => sqlx::query(statement).execute(pool).await?.rows_affected(),
        };
        Ok(rows)
    }

    async fn set_max_idle(&self, max_idle: u32) -> usize {
        self.idle_cap.set_limit(max_idle);
        self.backend
            .trim_idle(max_idle, self.idle_cap.close_timeout)
            .await
    }

    fn stats(&self) -> PoolStats {
        PoolStats {
            size: self.backend.size(),
            idle: self.backend.num_idle() as u32,
            max_open: self.max_open,
            max_idle: self.idle_cap.limit(),
        }
    }

    async fn close(&self) {
        match &self.backend {
            PoolBackend::Postgres(pool) => pool.close().await,
            PoolBackend::Sqlite(pool) => pool.close().await,
        }
        self.idle_cap.detach();
        tracing::info!(kind = %self.kind(), "Database connection pool closed");
    }
}

impl Drop for SqlxPool {
    fn drop(&mut self) {
        self.idle_cap.detach();
    }
}

async fn ping_pool<DB: sqlx::Database>(pool: &Pool<DB>) -> Result<(), sqlx::Error> {
    let mut conn = pool.acquire().await?;
    conn.ping().await
}

/// Close idle connections until at most `keep` remain idle.
///
/// Each close is bounded by `close_timeout`.
async fn trim_idle<DB: sqlx::Database>(pool: &Pool<DB>, keep: u32, close_timeout: Duration) -> usize {
    let excess = (pool.num_idle() as u32).saturating_sub(keep);
    let mut closed = 0;

    for _ in 0..excess {
        // None when nothing is idle or callers are already waiting
        let Some(conn) = pool.try_acquire() else {
            break;
        };
        let close = async { conn.close().await.map_err(DatabaseError::from) };
        if let Err(e) = with_deadline("idle connection close", close_timeout, close).await {
            tracing::debug!(error = %e, "Error closing idle connection");
        }
        closed += 1;
    }

    closed
}

fn pool_options<DB: sqlx::Database>(
    limits: &PoolLimits,
    acquire_timeout: Duration,
    idle_cap: &IdleCap,
) -> PoolOptions<DB> {
    let idle_cap = idle_cap.clone();

    PoolOptions::<DB>::new()
        .max_connections(limits.max_open)
        .min_connections(0)
        .max_lifetime(limits.max_lifetime)
        .idle_timeout(limits.max_idle_lifetime)
        .acquire_timeout(acquire_timeout)
        .test_before_acquire(true)
        .after_release(move |_conn, _meta| {
            // Ok(false) closes the connection instead of returning it to the idle set
            let keep = idle_cap.on_release();
            Box::pin(async move { Ok::<_, sqlx::Error>(keep) })
        })
}

/// Production connector backed by sqlx.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlxConnector;

#[async_trait]
impl Connector for SqlxConnector {
    type Pool = SqlxPool;

    async fn open(
        &self,
        target: &ConnectTarget,
        limits: &PoolLimits,
        acquire_timeout: Duration,
    ) -> Result<Self::Pool, DatabaseError> {
        let idle_cap = IdleCap::new(limits.max_idle, acquire_timeout);

        let backend = match target {
            ConnectTarget::Postgres {
                host,
                port,
                user,
                password,
                database,
                timezone,
            } => {
                let mut options = PgConnectOptions::new()
                    .host(host)
                    .port(*port)
                    .username(user)
                    .password(password)
                    .database(database)
                    .ssl_mode(PgSslMode::Disable);
                if let Some(tz) = timezone {
                    options = options.options([("TimeZone", tz.as_str())]);
                }

                PoolBackend::Postgres(
                    pool_options(limits, acquire_timeout, &idle_cap).connect_lazy_with(options),
                )
            }
            ConnectTarget::Sqlite { path } => {
                if path.as_os_str().is_empty() {
                    return Err(DatabaseError::InvalidTarget(
                        "SQLite path must not be empty".to_string(),
                    ));
                }
                let options = SqliteConnectOptions::new()
                    .filename(path)
                    .create_if_missing(true);

                PoolBackend::Sqlite(
                    pool_options(limits, acquire_timeout, &idle_cap).connect_lazy_with(options),
                )
            }
        };

        Ok(SqlxPool::new(backend, limits.max_open, idle_cap))
    }
}
