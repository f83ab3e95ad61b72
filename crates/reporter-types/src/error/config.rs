//! Configuration-related errors.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while reading datasource configuration.
///
/// These surface at startup and are never retried.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "details")]
pub enum ConfigError {
    /// A required `DATASOURCE_<NAME>_<FIELD>` key is absent or blank
    #[error("datasource group {group}: missing required field {field}")]
    MissingField {
        /// The `<NAME>` part of the environment keys
        group: String,
        /// The missing field suffix (`HOST`, `PORT`, ...)
        field: String,
    },

    /// A field is present but cannot be parsed
    #[error("datasource group {group}: invalid value for {field}: {message}")]
    InvalidField {
        /// The `<NAME>` part of the environment keys
        group: String,
        /// The offending field suffix
        field: String,
        /// Description of the parse failure
        message: String,
    },

    /// `TYPE` is not one of the recognized kinds
    #[error("datasource {identity}: unsupported database type: {kind}")]
    UnsupportedKind {
        /// Identity of the datasource
        identity: String,
        /// The raw `TYPE` value
        kind: String,
    },

    /// Two groups resolve to the same `CONFIG_NAME`
    #[error("duplicate datasource identity: {identity}")]
    DuplicateIdentity {
        /// The repeated identity
        identity: String,
    },
}
