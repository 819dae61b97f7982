//! Pooled, future-based query execution
//!
//! [`QueryExecutor`] owns a bounded pool of driver connections. Every accepted
//! query runs in its own task that holds the pool slot and the connection for
//! the duration of one statement, so a caller that gives up after dispatch
//! does not leak either: the task finishes the driver call and puts the
//! connection back.

use std::sync::Arc;

use tokio::time::Instant;
use tracing::{instrument, Instrument};
use uuid::Uuid;

use crate::{
    config::PoolConfig,
    db::{Driver, QueryRequest, QueryResult, Value},
    error::{DriverError, ExecutorError, ExecutorResult},
};

mod in_flight;
mod pool;

use in_flight::{InFlight, InFlightGuard};
use pool::Pool;

pub use pool::PoolStatus;

/// Statement used to verify connectivity at startup
pub const PING_SQL: &str = "select now()";

/// Connection-pooled query executor
///
/// Cloning is cheap; clones share the same pool.
#[derive(Clone)]
pub struct QueryExecutor {
    pool: Arc<Pool>,
    in_flight: Arc<InFlight>,
}

impl QueryExecutor {
    /// Creates an executor over `driver`. No connection is opened until the first query.
    pub fn new(driver: impl Driver, config: PoolConfig) -> Self {
        Self::with_driver(Arc::new(driver), config)
    }

    /// Creates an executor over a shared driver
    pub fn with_driver(driver: Arc<dyn Driver>, config: PoolConfig) -> Self {
        tracing::debug!(
            driver = driver.name(),
            max_size = config.max_size,
            acquire_timeout_ms = config.acquire_timeout.as_millis() as u64,
            "Creating query executor"
        );

        Self {
            pool: Arc::new(Pool::new(driver, config)),
            in_flight: Arc::new(InFlight::new()),
        }
    }

    /// Runs `sql` with positional `params` on a pooled connection
    pub async fn execute(&self, sql: &str, params: &[Value]) -> ExecutorResult<QueryResult> {
        self.execute_request(QueryRequest::new(sql, params.to_vec()))
            .await
    }

    /// Runs a prepared [`QueryRequest`]
    ///
    /// Waits for a free connection for at most the configured acquisition
    /// timeout. Dropping the returned future while it waits has no effect on
    /// the pool; dropping it after the query was dispatched lets the query
    /// finish in the background.
    #[instrument(skip_all, fields(sql = %request.sql()))]
    pub async fn execute_request(&self, request: QueryRequest) -> ExecutorResult<QueryResult> {
        if self.in_flight.is_closed() {
            return Err(ExecutorError::PoolClosed);
        }

        tracing::debug!(params = request.params().len(), "Executing query");

        let deadline = Instant::now() + self.pool.config().acquire_timeout;
        let outcome = match self.pool.acquire_permit(deadline).await {
            Ok(permit) => {
                let pool = Arc::clone(&self.pool);
                let span = tracing::Span::current();
                let spawned = self.in_flight.spawn(Uuid::new_v4(), move |guard| {
                    run_query(pool, permit, deadline, request, guard).instrument(span)
                });

                match spawned {
                    Ok(handle) => match handle.await {
                        Ok(outcome) => outcome,
                        Err(e) if e.is_cancelled() => Err(ExecutorError::PoolClosed),
                        Err(e) => Err(DriverError::query(format!("query task panicked: {}", e)).into()),
                    },
                    Err(e) => Err(e),
                }
            }
            Err(e) => Err(e),
        };

        match &outcome {
            Ok(result) => {
                tracing::debug!(
                    rows = result.len(),
                    rows_affected = result.rows_affected,
                    "Query resolved"
                );
                tracing::trace!(results = %result.to_json(), "Query results");
            }
            Err(e) => tracing::warn!(error = %e, "Query rejected"),
        }

        outcome
    }

    /// Runs the startup smoke test `select now()`
    pub async fn ping(&self) -> ExecutorResult<QueryResult> {
        self.execute(PING_SQL, &[]).await
    }

    /// Snapshot of pool occupancy and counters
    pub async fn status(&self) -> PoolStatus {
        let mut status = self.pool.status().await;
        status.closed = self.in_flight.is_closed();
        status
    }

    /// Whether [`QueryExecutor::close`] has been called
    pub fn is_closed(&self) -> bool {
        self.in_flight.is_closed()
    }

    /// Shuts the pool down
    ///
    /// New and waiting calls fail with [`ExecutorError::PoolClosed`] at once.
    /// In-flight queries get the configured grace period to finish and are
    /// aborted after it; then every connection is closed. Calling `close`
    /// again waits for the same conditions.
    pub async fn close(&self) {
        if self.in_flight.close() {
            tracing::info!(in_flight = self.in_flight.len(), "Closing query executor");
        }
        self.pool.close_semaphore();

        let grace = self.pool.config().shutdown_grace;
        if tokio::time::timeout(grace, self.in_flight.drained())
            .await
            .is_err()
        {
            let aborted = self.in_flight.abort_all();
            tracing::warn!(
                aborted,
                grace_ms = grace.as_millis() as u64,
                "Grace period elapsed, cancelling in-flight queries"
            );
            self.in_flight.drained().await;
        }

        let closed = self.pool.close_idle().await;
        tracing::info!(closed_connections = closed, "Query executor closed");
    }
}

/// Body of one query task: check out, run, then release or discard
async fn run_query(
    pool: Arc<Pool>,
    permit: tokio::sync::OwnedSemaphorePermit,
    deadline: Instant,
    request: QueryRequest,
    guard: InFlightGuard,
) -> ExecutorResult<QueryResult> {
    let mut conn = pool.checkout(permit, deadline).await?;
    let outcome = conn.query(request.sql(), request.params()).await;

    match &outcome {
        Err(e) if e.is_fatal() => conn.discard(e).await,
        _ => conn.release().await,
    }

    tracing::trace!(query_id = %guard.id(), "Connection returned");
    drop(guard);

    outcome.map_err(ExecutorError::from)
}
