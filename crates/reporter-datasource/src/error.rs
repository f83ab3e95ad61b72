//! Unified error type for datasource operations.

use crate::circuit_breaker::CircuitBreakerError;
use crate::connect::is_fatal;
use crate::driver::DriverError;
use crate::resolver::ResolveError;
use thiserror::Error;

/// Main error type for registry, connection and query operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum DatasourceError {
    /// Target identity was never minted from configuration.
    #[error("datasource '{0}' is not a registered datasource")]
    UnregisteredIdentity(String),

    /// Identity is registered but has no handle in the runtime map.
    #[error("datasource '{0}' is not present in the runtime registry")]
    MissingHandle(String),

    /// The identity allow-list is write-once.
    #[error("registered datasource identities are already initialized")]
    AlreadyInitialized,

    /// A handle was offered under a key that is not its own identity.
    #[error("handle for datasource '{handle}' cannot be stored under '{key}'")]
    IdentityMismatch {
        /// Key passed by the caller
        key: String,
        /// Identity carried by the handle
        handle: String,
    },

    /// No driver exists for the configured kind.
    #[error("unsupported database type: {0}")]
    UnsupportedKind(String),

    /// The handle has no live driver.
    #[error("datasource {0} is currently unavailable (not initialized)")]
    Unavailable(String),

    /// Bring-up failed on every attempt.
    #[error("failed to connect to datasource {identity} after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        identity: String,
        attempts: u32,
        last_error: String,
    },

    /// Bring-up was interrupted by the stop signal.
    #[error("connection attempts for datasource {0} were cancelled")]
    Cancelled(String),

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error(transparent)]
    Circuit(#[from] CircuitBreakerError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

impl DatasourceError {
    /// Errors that must never be retried: identity misuse, unsupported kinds
    /// and anything matching the fatal connection vocabulary.
    pub fn is_fatal(&self) -> bool {
        match self {
            DatasourceError::UnregisteredIdentity(_)
            | DatasourceError::MissingHandle(_)
            | DatasourceError::IdentityMismatch { .. }
            | DatasourceError::UnsupportedKind(_) => true,
            other => is_fatal(&other.to_string()),
        }
    }

    /// True for errors raised because the caller named an unknown datasource.
    pub fn is_identity_error(&self) -> bool {
        matches!(
            self,
            DatasourceError::UnregisteredIdentity(_) | DatasourceError::MissingHandle(_)
        )
    }
}

/// Result type alias for datasource operations.
pub type DatasourceResult<T> = Result<T, DatasourceError>;
