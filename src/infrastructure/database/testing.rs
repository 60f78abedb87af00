//! Scripted pool and connector used by the unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::{ConnectTarget, Connector, DatabaseError, ManagedPool, PoolLimits, PoolStats};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ping {
    Ok,
    Fail,
    Hang,
}

/// Pool whose probe results follow a script, then a default.
pub struct ScriptedPool {
    script: Mutex<VecDeque<Ping>>,
    fallback: Mutex<Ping>,
    pings: AtomicUsize,
    idle_limits: Mutex<Vec<u32>>,
    executed: Mutex<Vec<String>>,
    fail_executes: AtomicBool,
    closed: AtomicBool,
    max_idle: AtomicU32,
}

impl ScriptedPool {
    pub fn new(fallback: Ping) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(fallback),
            pings: AtomicUsize::new(0),
            idle_limits: Mutex::new(Vec::new()),
            executed: Mutex::new(Vec::new()),
            fail_executes: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            max_idle: AtomicU32::new(5),
        }
    }

    pub fn healthy() -> Self {
        Self::new(Ping::Ok)
    }

    /// Queue probe results consumed before the fallback applies.
    pub fn script(self, pings: impl IntoIterator<Item = Ping>) -> Self {
        self.script.lock().unwrap().extend(pings);
        self
    }

    pub fn set_fallback(&self, ping: Ping) {
        *self.fallback.lock().unwrap() = ping;
    }

    pub fn fail_executes(&self, fail: bool) {
        self.fail_executes.store(fail, Ordering::SeqCst);
    }

    pub fn pings(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }

    pub fn idle_limits(&self) -> Vec<u32> {
        self.idle_limits.lock().unwrap().clone()
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ManagedPool for ScriptedPool {
    async fn ping(&self) -> Result<(), DatabaseError> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        let next = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(*self.fallback.lock().unwrap());

        match next {
            Ping::Ok => Ok(()),
            Ping::Fail => Err(DatabaseError::Sqlx(sqlx::Error::PoolTimedOut)),
            Ping::Hang => {
                std::future::pending::<()>().await;
                Ok(())
            }
        }
    }

    async fn execute(&self, statement: &str) -> Result<u64, DatabaseError> {
        if self.fail_executes.load(Ordering::SeqCst) {
            return Err(DatabaseError::Sqlx(sqlx::Error::PoolClosed));
        }
        self.executed.lock().unwrap().push(statement.to_string());
        Ok(0)
    }

    async fn set_max_idle(&self, max_idle: u32) -> usize {
        self.max_idle.store(max_idle, Ordering::SeqCst);
        self.idle_limits.lock().unwrap().push(max_idle);
        0
    }

    fn stats(&self) -> PoolStats {
        PoolStats {
            size: 1,
            idle: 1,
            max_open: 10,
            max_idle: self.max_idle.load(Ordering::SeqCst),
        }
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// How a scripted connect attempt fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptFailure {
    /// `open` itself returns an error
    Open,
    /// `open` succeeds, the probe fails
    Probe,
    /// `open` succeeds, the probe never answers
    HangingProbe,
}

/// Connector failing its first `failing_attempts` attempts.
pub struct ScriptedConnector {
    failing_attempts: u32,
    failure: AttemptFailure,
    attempts: Arc<AtomicU32>,
}

impl ScriptedConnector {
    pub fn new(failing_attempts: u32, failure: AttemptFailure) -> Self {
        Self {
            failing_attempts,
            failure,
            attempts: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn unreachable() -> Self {
        Self::new(u32::MAX, AttemptFailure::Probe)
    }

    /// Shared attempt counter, readable after the connector is moved.
    pub fn attempts(&self) -> Arc<AtomicU32> {
        self.attempts.clone()
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    type Pool = ScriptedPool;

    async fn open(
        &self,
        _target: &ConnectTarget,
        limits: &PoolLimits,
        _acquire_timeout: Duration,
    ) -> Result<Self::Pool, DatabaseError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        let pool = ScriptedPool::healthy();
        pool.max_idle.store(limits.max_idle, Ordering::SeqCst);

        if attempt >= self.failing_attempts {
            return Ok(pool);
        }

        match self.failure {
            AttemptFailure::Open => Err(DatabaseError::Sqlx(sqlx::Error::PoolTimedOut)),
            AttemptFailure::Probe => Ok(pool.script([Ping::Fail])),
            AttemptFailure::HangingProbe => Ok(pool.script([Ping::Hang])),
        }
    }
}
