//! Driver error taxonomy.

use std::time::Duration;
use thiserror::Error;

pub type DriverResult<T> = Result<T, DriverError>;

#[derive(Debug, Error)]
pub enum DriverError {
    /// The connection string could not be built or parsed.
    #[error("invalid connection string: {0}")]
    InvalidConfig(String),

    #[error("unsupported database type: {0}")]
    UnsupportedKind(String),

    /// Opening or pinging the datasource failed.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Bad table, field, predicate shape or value format. Never retried.
    #[error("validation error: {0}")]
    Validation(String),

    #[error("query execution failed: {0}")]
    Execution(String),

    /// Deadline exceeded; kept apart from [`DriverError::Execution`] so
    /// callers can tell slow from broken.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// The driver was closed.
    #[error("datasource driver is shut down")]
    Shutdown,
}

impl DriverError {
    pub fn is_validation(&self) -> bool {
        matches!(self, DriverError::Validation(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, DriverError::Timeout { .. })
    }
}

pub(crate) fn map_sqlx_err(err: sqlx::Error) -> DriverError {
    match err {
        sqlx::Error::Configuration(e) => DriverError::InvalidConfig(e.to_string()),
        sqlx::Error::PoolClosed => DriverError::Shutdown,
        sqlx::Error::PoolTimedOut => DriverError::Connection(err.to_string()),
        sqlx::Error::Io(_) | sqlx::Error::Tls(_) => DriverError::Connection(err.to_string()),
        other => DriverError::Execution(other.to_string()),
    }
}

pub(crate) fn map_mongo_err(err: mongodb::error::Error) -> DriverError {
    use mongodb::error::ErrorKind;
    match *err.kind {
        ErrorKind::InvalidArgument { .. } => DriverError::InvalidConfig(err.to_string()),
        ErrorKind::Shutdown => DriverError::Shutdown,
        ErrorKind::Io(_)
        | ErrorKind::DnsResolve { .. }
        | ErrorKind::ServerSelection { .. }
        | ErrorKind::Authentication { .. }
        | ErrorKind::ConnectionPoolCleared { .. } => DriverError::Connection(err.to_string()),
        _ => DriverError::Execution(err.to_string()),
    }
}
