//! Database driver abstraction
//!
//! The executor only needs three capabilities from a database client: open a
//! session, run one statement on it, and close it. Anything offering those can
//! back a [`crate::QueryExecutor`].

use async_trait::async_trait;

use crate::{
    db::{QueryResult, Value},
    error::DriverError,
};

/// Factory for live database sessions
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Driver: Send + Sync + 'static {
    /// Open a new session
    async fn connect(&self) -> Result<Box<dyn DriverConnection>, DriverError>;

    /// Driver name for logging and debugging
    fn name(&self) -> &'static str;
}

/// One live session. Used by a single caller at a time.
#[async_trait]
pub trait DriverConnection: Send {
    /// Run a statement with positional parameters
    ///
    /// Placeholder count is validated by the driver, not by the caller.
    async fn query(&mut self, sql: &str, params: &[Value]) -> Result<QueryResult, DriverError>;

    /// Gracefully end the session
    async fn close(self: Box<Self>) -> Result<(), DriverError>;
}
