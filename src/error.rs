use std::fmt::Display;
use std::time::Duration;

/// Category of a driver failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverErrorKind {
    /// The statement could not be parsed
    Syntax,
    /// A unique, foreign key, not-null or check constraint was violated
    Constraint,
    /// The session itself is broken (I/O, TLS, protocol, lost server)
    Connection,
    /// Any other failure reported while running the statement
    Query,
}

impl Display for DriverErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DriverErrorKind::Syntax => write!(f, "syntax error"),
            DriverErrorKind::Constraint => write!(f, "constraint violation"),
            DriverErrorKind::Connection => write!(f, "connection error"),
            DriverErrorKind::Query => write!(f, "query error"),
        }
    }
}

/// Error reported by the underlying database driver
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct DriverError {
    pub kind: DriverErrorKind,
    pub message: String,
}

impl DriverError {
    pub fn new(kind: DriverErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn syntax(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::Syntax, message)
    }

    pub fn constraint(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::Constraint, message)
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::Connection, message)
    }

    pub fn query(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::Query, message)
    }

    /// Whether the connection that produced this error must not be reused
    pub fn is_fatal(&self) -> bool {
        self.kind == DriverErrorKind::Connection
    }
}

/// Errors surfaced by [`crate::QueryExecutor`]
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutorError {
    #[error("Timed out after {}ms waiting for a connection", .0.as_millis())]
    AcquireTimeout(Duration),

    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("Pool is closed")]
    PoolClosed,
}

impl ExecutorError {
    /// The driver failure behind this error, if any
    pub fn driver_error(&self) -> Option<&DriverError> {
        match self {
            ExecutorError::Driver(e) => Some(e),
            _ => None,
        }
    }
}

pub type ExecutorResult<T> = Result<T, ExecutorError>;
