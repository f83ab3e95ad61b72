//! Typed error definitions shared across the workspace.
//!
//! Runtime errors (driver, breaker, resolver) live next to the code that
//! raises them in `reporter-datasource`; only errors that describe static
//! configuration belong here.

mod config;

pub use config::ConfigError;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_error_serialization() {
        let err = ConfigError::MissingField {
            group: "MIDAZ_ONBOARDING".to_string(),
            field: "HOST".to_string(),
        };

        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("MissingField"));
        assert!(json.contains("MIDAZ_ONBOARDING"));

        let deserialized: ConfigError = serde_json::from_str(&json).unwrap();
        assert_eq!(err, deserialized);
    }

    #[test]
    fn test_error_display() {
        let err = ConfigError::UnsupportedKind {
            identity: "legacy".to_string(),
            kind: "oracle".to_string(),
        };

        let msg = format!("{}", err);
        assert!(msg.contains("legacy"));
        assert!(msg.contains("unsupported database type"));
    }
}
