//! Datasource configuration loaded from the process environment.
//!
//! For every key of the form `DATASOURCE_<NAME>_CONFIG_NAME` the loader reads
//! the sibling keys of that `<NAME>` group:
//!
//! ```text
//! DATASOURCE_N_CONFIG_NAME       (identity, required)
//! DATASOURCE_N_HOST / _PORT / _USER / _PASSWORD / _DATABASE / _TYPE
//! DATASOURCE_N_SSLMODE / _SSLROOTCERT         (relational)
//! DATASOURCE_N_SSL / _SSLCA / _OPTIONS        (document)
//! DATASOURCE_N_MIDAZ_ORGANIZATION_ID          (optional tenant)
//! DATASOURCE_N_SCHEMAS                        (comma-separated, relational)
//! ```
//!
//! `<NAME>` is case-insensitive and only groups keys; the identity is the
//! value of `CONFIG_NAME`.

pub mod connection;
mod settings;


pub use settings::{PoolSettings, RuntimeSettings, Timeouts};

use reporter_types::{
    ConfigError, DatasourceConfig, DatasourceKind, TlsSettings, DEFAULT_SCHEMA,
};
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{error, info, warn};

const KEY_PREFIX: &str = "DATASOURCE_";
const IDENTITY_SUFFIX: &str = "_CONFIG_NAME";

/// Load datasource configs from `std::env::vars()`.
pub fn load_datasource_configs() -> Vec<DatasourceConfig> {
    load_datasource_configs_from(std::env::vars())
}

/// Load datasource configs from an arbitrary set of `(key, value)` pairs.
///
/// Groups are returned in lexical order of their `<NAME>`. Groups with
/// missing or malformed required fields are skipped with a warning, and
/// duplicate identities keep the first group. Unrecognized `TYPE` values are
/// logged as errors but kept as [`DatasourceKind::Unsupported`] so that
/// bring-up reports them as fatal.
pub fn load_datasource_configs_from<I, K, V>(vars: I) -> Vec<DatasourceConfig>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    let env = EnvGroups::new(vars);
    let mut configs = Vec::new();
    let mut seen = HashSet::new();

    for group in env.group_names() {
        match env.parse_group(&group) {
            Ok(config) => {
                if !seen.insert(config.identity.clone()) {
                    let err = ConfigError::DuplicateIdentity { identity: config.identity };
                    warn!(group = %group, "{}", err);
                    continue;
                }
                if let DatasourceKind::Unsupported(kind) = &config.kind {
                    let err = ConfigError::UnsupportedKind {
                        identity: config.identity.clone(),
                        kind: kind.clone(),
                    };
                    error!(group = %group, "{}", err);
                }
                configs.push(config);
            },
            Err(err) => warn!(group = %group, "Skipping datasource: {}", err),
        }
    }

    if configs.is_empty() {
        warn!("No datasources configured (expected DATASOURCE_<NAME>_CONFIG_NAME keys)");
    } else {
        info!(count = configs.len(), "Loaded datasource configurations");
    }

    configs
}

/// Parse `DATASOURCE_<NAME>_SCHEMAS`: comma-separated, trimmed, empties
/// dropped, falling back to `["public"]`.
pub fn parse_schema_list(raw: Option<&str>) -> Vec<String> {
    let schemas: Vec<String> = raw
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    if schemas.is_empty() {
        vec![DEFAULT_SCHEMA.to_string()]
    } else {
        schemas
    }
}

/// Environment keys normalized to upper case.
struct EnvGroups {
    values: HashMap<String, String>,
}

impl EnvGroups {
    fn new<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let values = vars
            .into_iter()
            .map(|(k, v)| (k.into().to_ascii_uppercase(), v.into()))
            .filter(|(k, _)| k.starts_with(KEY_PREFIX))
            .collect();
        Self { values }
    }

    fn group_names(&self) -> BTreeSet<String> {
        self.values
            .keys()
            .filter_map(|key| {
                key.strip_prefix(KEY_PREFIX)?.strip_suffix(IDENTITY_SUFFIX).map(str::to_string)
            })
            .filter(|name| !name.is_empty())
            .collect()
    }

    fn get(&self, group: &str, field: &str) -> Option<&str> {
        self.values
            .get(&format!("{}{}_{}", KEY_PREFIX, group, field))
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    fn require(&self, group: &str, field: &str) -> Result<&str, ConfigError> {
        self.get(group, field).ok_or_else(|| ConfigError::MissingField {
            group: group.to_string(),
            field: field.to_string(),
        })
    }

    fn parse_group(&self, group: &str) -> Result<DatasourceConfig, ConfigError> {
        let identity = self.require(group, "CONFIG_NAME")?.to_string();
        let kind = DatasourceKind::from_type(self.require(group, "TYPE")?);
        let host = self.require(group, "HOST")?.to_string();
        let raw_port = self.require(group, "PORT")?;
        let port = raw_port.parse::<u16>().map_err(|e| ConfigError::InvalidField {
            group: group.to_string(),
            field: "PORT".to_string(),
            message: format!("{}: {}", raw_port, e),
        })?;
        let database = self.require(group, "DATABASE")?.to_string();

        let ssl = match self.get(group, "SSL") {
            None => false,
            Some(raw) => parse_bool(raw).ok_or_else(|| ConfigError::InvalidField {
                group: group.to_string(),
                field: "SSL".to_string(),
                message: format!("expected a boolean, got {}", raw),
            })?,
        };

        let schemas = match kind {
            DatasourceKind::Relational => parse_schema_list(self.get(group, "SCHEMAS")),
            _ => Vec::new(),
        };

        Ok(DatasourceConfig {
            identity,
            kind,
            host,
            port,
            user: self.get(group, "USER").unwrap_or_default().to_string(),
            password: self.get(group, "PASSWORD").unwrap_or_default().to_string(),
            database,
            tls: TlsSettings {
                ssl_mode: self.get(group, "SSLMODE").map(str::to_string),
                ssl_root_cert: self.get(group, "SSLROOTCERT").map(str::to_string),
                ssl,
                ssl_ca: self.get(group, "SSLCA").map(str::to_string),
            },
            options: self.get(group, "OPTIONS").map(str::to_string),
            schemas,
            tenant_id: self.get(group, "MIDAZ_ORGANIZATION_ID").map(str::to_string),
        })
    }
}

pub(crate) fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
