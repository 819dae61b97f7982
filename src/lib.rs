//! Connection-pooled, future-based query execution.
//!
//! ```rust,no_run
//! use query_executor::{config::Config, db::MySqlDriver, params, QueryExecutor};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = Config::from_env()?;
//! let executor = QueryExecutor::new(MySqlDriver::from_config(&config), config.pool_config());
//!
//! let users = executor
//!     .execute("select id, email from users where id = ?", &params![42])
//!     .await?;
//! println!("{}", users.to_json());
//!
//! executor.close().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod executor;

pub use config::{Config, PoolConfig};
pub use db::{Driver, DriverConnection, QueryRequest, QueryResult, Row, Value};
pub use error::{DriverError, DriverErrorKind, ExecutorError, ExecutorResult};
pub use executor::{PoolStatus, QueryExecutor, PING_SQL};
