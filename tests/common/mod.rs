#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use query_executor::{Driver, DriverConnection, DriverError, QueryResult, Row, Value};

/// Counters shared by a fake driver and every connection it opened
#[derive(Debug, Default)]
pub struct FakeStats {
    pub connects: AtomicUsize,
    pub closes: AtomicUsize,
    pub queries: AtomicUsize,
    pub active: AtomicUsize,
    pub max_active: AtomicUsize,
}

impl FakeStats {
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

/// In-memory driver understanding a handful of statements:
///
/// - `select 1`, `select now()`, `select ?`
/// - `insert ...` (one affected row)
/// - `sleep <ms>` (holds the connection for that long)
/// - `bad syntax` (syntax error), `drop connection` (fatal connection error)
/// - `panic` (the driver panics mid-query)
pub struct FakeDriver {
    stats: Arc<FakeStats>,
    connect_delay: Duration,
    query_latency: Duration,
    close_delay: Duration,
}

impl FakeDriver {
    pub fn new() -> (Self, Arc<FakeStats>) {
        let stats = Arc::new(FakeStats::default());
        let driver = Self {
            stats: Arc::clone(&stats),
            connect_delay: Duration::ZERO,
            query_latency: Duration::ZERO,
            close_delay: Duration::ZERO,
        };
        (driver, stats)
    }

    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = delay;
        self
    }

    pub fn with_query_latency(mut self, latency: Duration) -> Self {
        self.query_latency = latency;
        self
    }

    /// Makes every graceful close hang for `delay` before it completes
    pub fn with_close_delay(mut self, delay: Duration) -> Self {
        self.close_delay = delay;
        self
    }
}

#[async_trait::async_trait]
impl Driver for FakeDriver {
    async fn connect(&self) -> Result<Box<dyn DriverConnection>, DriverError> {
        if !self.connect_delay.is_zero() {
            tokio::time::sleep(self.connect_delay).await;
        }
        self.stats.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeConnection {
            stats: Arc::clone(&self.stats),
            latency: self.query_latency,
            close_delay: self.close_delay,
        }))
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

struct FakeConnection {
    stats: Arc<FakeStats>,
    latency: Duration,
    close_delay: Duration,
}

/// Tracks how many queries are running at once, even if the query is aborted
struct ActiveQuery(Arc<FakeStats>);

impl ActiveQuery {
    fn start(stats: &Arc<FakeStats>) -> Self {
        let now = stats.active.fetch_add(1, Ordering::SeqCst) + 1;
        stats.max_active.fetch_max(now, Ordering::SeqCst);
        Self(Arc::clone(stats))
    }
}

impl Drop for ActiveQuery {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}

fn single_row(column: &str, value: Value) -> QueryResult {
    let mut row = Row::new();
    row.push(column, value);
    QueryResult::from_rows(vec![row])
}

#[async_trait::async_trait]
impl DriverConnection for FakeConnection {
    async fn query(&mut self, sql: &str, params: &[Value]) -> Result<QueryResult, DriverError> {
        let _active = ActiveQuery::start(&self.stats);
        self.stats.queries.fetch_add(1, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let sql = sql.trim();
        if let Some(ms) = sql.strip_prefix("sleep ") {
            let ms: u64 = ms
                .parse()
                .map_err(|_| DriverError::syntax(format!("bad sleep duration: {}", ms)))?;
            tokio::time::sleep(Duration::from_millis(ms)).await;
            return Ok(QueryResult::default());
        }

        if sql.starts_with("insert") {
            return Ok(QueryResult {
                rows: Vec::new(),
                rows_affected: 1,
                last_insert_id: Some(1),
            });
        }

        match sql {
            "select 1" => Ok(single_row("1", Value::Int(1))),
            "select now()" => {
                let now = NaiveDate::from_ymd_opt(2024, 1, 1)
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
                    .map(Value::DateTime)
                    .unwrap_or(Value::Null);
                Ok(single_row("now()", now))
            }
            "select ?" => match params {
                [value] => Ok(single_row("?", value.clone())),
                _ => Err(DriverError::query(format!(
                    "expected 1 parameter, got {}",
                    params.len()
                ))),
            },
            "bad syntax" => Err(DriverError::syntax("You have an error in your SQL syntax")),
            "drop connection" => Err(DriverError::connection("MySQL server has gone away")),
            "panic" => panic!("driver bug"),
            other => Err(DriverError::query(format!("unsupported statement: {}", other))),
        }
    }

    async fn close(self: Box<Self>) -> Result<(), DriverError> {
        if !self.close_delay.is_zero() {
            tokio::time::sleep(self.close_delay).await;
        }
        self.stats.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
