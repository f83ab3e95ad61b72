//! Datasource configuration and runtime status.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::schema::DEFAULT_SCHEMA;

/// Kind of external database behind a datasource identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasourceKind {
    /// Relational row store (`TYPE=postgresql`)
    Relational,
    /// Document store (`TYPE=mongodb`)
    Document,
    /// Any other `TYPE` value; kept so bring-up can report it as fatal
    Unsupported(String),
}

impl DatasourceKind {
    /// Parse the `DATASOURCE_<NAME>_TYPE` value (case-insensitive).
    pub fn from_type(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "postgresql" => Self::Relational,
            "mongodb" => Self::Document,
            _ => Self::Unsupported(raw.trim().to_string()),
        }
    }

    /// Whether a driver exists for this kind.
    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Unsupported(_))
    }
}

impl fmt::Display for DatasourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Relational => write!(f, "postgresql"),
            Self::Document => write!(f, "mongodb"),
            Self::Unsupported(raw) => write!(f, "{}", raw),
        }
    }
}

/// Runtime status of a datasource handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasourceStatus {
    /// No bring-up attempted yet
    #[default]
    Unknown,
    /// Connected and answering probes
    Available,
    /// Bring-up failed or driver missing
    Unavailable,
    /// Connected, but the last probe failed
    Degraded,
}

impl fmt::Display for DatasourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatasourceStatus::Unknown => write!(f, "unknown"),
            DatasourceStatus::Available => write!(f, "available"),
            DatasourceStatus::Unavailable => write!(f, "unavailable"),
            DatasourceStatus::Degraded => write!(f, "degraded"),
        }
    }
}

/// TLS parameters. Relational datasources use `ssl_mode`/`ssl_root_cert`,
/// document datasources use `ssl`/`ssl_ca`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsSettings {
    /// `sslmode` query parameter (`disable`, `require`, `verify-full`, ...)
    pub ssl_mode: Option<String>,
    /// Path to the root certificate for `verify-ca`/`verify-full`
    pub ssl_root_cert: Option<String>,
    /// Enables TLS for the document driver
    pub ssl: bool,
    /// Path to the CA file for the document driver
    pub ssl_ca: Option<String>,
}

/// Immutable configuration record for one datasource.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasourceConfig {
    /// Stable key used everywhere else (`CONFIG_NAME`)
    pub identity: String,
    pub kind: DatasourceKind,
    pub host: String,
    pub port: u16,
    pub user: String,
    #[serde(skip_serializing, default)]
    pub password: String,
    pub database: String,
    #[serde(default)]
    pub tls: TlsSettings,
    /// Raw driver options appended to the document connection string
    pub options: Option<String>,
    /// Schemas exposed by a relational datasource
    #[serde(default = "default_schemas")]
    pub schemas: Vec<String>,
    /// Optional tenant id (`MIDAZ_ORGANIZATION_ID`)
    pub tenant_id: Option<String>,
}

fn default_schemas() -> Vec<String> {
    vec![DEFAULT_SCHEMA.to_string()]
}

impl DatasourceConfig {
    /// Schemas to probe, never empty.
    pub fn effective_schemas(&self) -> Vec<String> {
        if self.schemas.is_empty() {
            default_schemas()
        } else {
            self.schemas.clone()
        }
    }
}

impl fmt::Debug for DatasourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatasourceConfig")
            .field("identity", &self.identity)
            .field("kind", &self.kind)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("tls", &self.tls)
            .field("options", &self.options)
            .field("schemas", &self.schemas)
            .field("tenant_id", &self.tenant_id)
            .finish()
    }
}
