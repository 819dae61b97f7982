use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

use crate::{
    config::PoolConfig,
    db::{Driver, DriverConnection, QueryResult, Value},
    error::{DriverError, ExecutorError, ExecutorResult},
};

/// Point-in-time view of the pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    /// Configured upper bound on live connections
    pub max_size: usize,
    /// Live connections, idle or checked out
    pub size: usize,
    /// Connections waiting in the idle set
    pub idle: usize,
    /// Connections currently running a query
    pub in_use: usize,
    /// Whether the pool has stopped accepting queries
    pub closed: bool,
    /// Connections opened over the pool's lifetime
    pub connections_created: u64,
    /// Connections dropped because they failed or were cancelled mid-query
    pub connections_discarded: u64,
    /// Acquisitions that gave up waiting
    pub acquire_timeouts: u64,
}

/// Lifetime counters, updated without taking the idle lock
#[derive(Debug, Default)]
struct PoolCounters {
    created: AtomicU64,
    discarded: AtomicU64,
    timeouts: AtomicU64,
}

/// Bounded set of driver connections
///
/// Each live connection is backed by one semaphore permit: a caller must hold
/// a permit before it may take an idle connection or open a new one, so the
/// pool never grows past `max_size`.
pub(crate) struct Pool {
    driver: Arc<dyn Driver>,
    config: PoolConfig,
    semaphore: Arc<Semaphore>,
    // LIFO so the most recently used session is reused first
    idle: Mutex<Vec<Box<dyn DriverConnection>>>,
    size: AtomicUsize,
    counters: PoolCounters,
}

impl Pool {
    pub fn new(driver: Arc<dyn Driver>, config: PoolConfig) -> Self {
        Self {
            driver,
            semaphore: Arc::new(Semaphore::new(config.max_size)),
            idle: Mutex::new(Vec::with_capacity(config.max_size)),
            size: AtomicUsize::new(0),
            counters: PoolCounters::default(),
            config,
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Waits for a free slot until `deadline`
    ///
    /// Cancel-safe: dropping the returned future before it resolves leaves the
    /// pool untouched.
    pub async fn acquire_permit(&self, deadline: Instant) -> ExecutorResult<OwnedSemaphorePermit> {
        match tokio::time::timeout_at(deadline, self.semaphore.clone().acquire_owned()).await {
            Ok(Ok(permit)) => Ok(permit),
            // Semaphore is only closed by shutdown
            Ok(Err(_)) => Err(ExecutorError::PoolClosed),
            Err(_) => {
                self.counters.timeouts.fetch_add(1, Ordering::Relaxed);
                Err(ExecutorError::AcquireTimeout(self.config.acquire_timeout))
            }
        }
    }

    /// Hands out an idle connection, or opens a new one if none is idle
    pub async fn checkout(
        self: &Arc<Self>,
        permit: OwnedSemaphorePermit,
        deadline: Instant,
    ) -> ExecutorResult<PooledConnection> {
        let reused = self.idle.lock().await.pop();

        let conn = match reused {
            Some(conn) => conn,
            None => {
                let conn = tokio::time::timeout_at(deadline, self.driver.connect())
                    .await
                    .map_err(|_| {
                        self.counters.timeouts.fetch_add(1, Ordering::Relaxed);
                        ExecutorError::AcquireTimeout(self.config.acquire_timeout)
                    })??;

                let size = self.size.fetch_add(1, Ordering::AcqRel) + 1;
                self.counters.created.fetch_add(1, Ordering::Relaxed);
                tracing::info!(
                    driver = self.driver.name(),
                    size,
                    max_size = self.config.max_size,
                    "Opened database connection"
                );
                conn
            }
        };

        Ok(PooledConnection {
            conn: Some(conn),
            pool: Arc::clone(self),
            _permit: permit,
        })
    }

    /// Wakes every caller waiting for a slot; they fail with `PoolClosed`
    pub fn close_semaphore(&self) {
        self.semaphore.close();
    }

    /// Closes every idle connection, returning how many were closed
    pub async fn close_idle(&self) -> usize {
        let drained: Vec<_> = std::mem::take(&mut *self.idle.lock().await);
        let count = drained.len();

        for conn in drained {
            if let Err(e) = conn.close().await {
                tracing::warn!(error = %e, "Failed to close database connection cleanly");
            }
            self.size.fetch_sub(1, Ordering::AcqRel);
        }

        count
    }

    pub async fn status(&self) -> PoolStatus {
        let idle = self.idle.lock().await.len();
        let size = self.size.load(Ordering::Acquire);

        PoolStatus {
            max_size: self.config.max_size,
            size,
            idle,
            in_use: size.saturating_sub(idle),
            closed: self.semaphore.is_closed(),
            connections_created: self.counters.created.load(Ordering::Relaxed),
            connections_discarded: self.counters.discarded.load(Ordering::Relaxed),
            acquire_timeouts: self.counters.timeouts.load(Ordering::Relaxed),
        }
    }

    fn forget_connection(&self) {
        self.size.fetch_sub(1, Ordering::AcqRel);
        self.counters.discarded.fetch_add(1, Ordering::Relaxed);
    }
}

/// A connection checked out by exactly one query
///
/// Must end with [`PooledConnection::release`] or [`PooledConnection::discard`].
/// If it is dropped instead (the query task was aborted), the session is
/// dropped with it and its slot is freed.
pub(crate) struct PooledConnection {
    conn: Option<Box<dyn DriverConnection>>,
    pool: Arc<Pool>,
    _permit: OwnedSemaphorePermit,
}

impl PooledConnection {
    pub async fn query(&mut self, sql: &str, params: &[Value]) -> Result<QueryResult, DriverError> {
        match self.conn.as_mut() {
            Some(conn) => conn.query(sql, params).await,
            None => Err(DriverError::connection("connection already returned to the pool")),
        }
    }

    /// Puts the connection back in the idle set, then frees the slot
    pub async fn release(mut self) {
        // Lock first: if the task is aborted while waiting, `Drop` still sees the connection
        let mut idle = self.pool.idle.lock().await;
        if let Some(conn) = self.conn.take() {
            idle.push(conn);
        }
    }

    /// Closes a connection that must not be reused; a later checkout opens a replacement
    pub async fn discard(mut self, cause: &DriverError) {
        if let Some(conn) = self.conn.take() {
            tracing::warn!(error = %cause, "Discarding broken database connection");
            // Counted before the close, which may be aborted or never return
            self.pool.forget_connection();
            if let Err(e) = conn.close().await {
                tracing::debug!(error = %e, "Broken connection did not close cleanly");
            }
        }
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if self.conn.take().is_some() {
            tracing::warn!("Query cancelled mid-flight; dropping its database connection");
            self.pool.forget_connection();
        }
    }
}
