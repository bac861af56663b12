//! ZNR-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::store::StoreError;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, ZnrError>;

/// Top-level error type for znode restore.
#[derive(Debug, Error)]
pub enum ZnrError {
    #[error("[ZNR-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[ZNR-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[ZNR-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[ZNR-2001] malformed snapshot at {location}: {details}")]
    MalformedSnapshot { location: String, details: String },

    #[error("[ZNR-2002] snapshot read failure: {source}")]
    Input {
        #[source]
        source: std::io::Error,
    },

    #[error("[ZNR-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[ZNR-3001] store {operation} failed for {path}: {source}")]
    Store {
        operation: &'static str,
        path: String,
        #[source]
        source: StoreError,
    },

    #[error("[ZNR-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[ZNR-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl ZnrError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "ZNR-1001",
            Self::MissingConfig { .. } => "ZNR-1002",
            Self::ConfigParse { .. } => "ZNR-1003",
            Self::MalformedSnapshot { .. } => "ZNR-2001",
            Self::Input { .. } => "ZNR-2002",
            Self::Serialization { .. } => "ZNR-2101",
            Self::Store { .. } => "ZNR-3001",
            Self::Io { .. } => "ZNR-3002",
            Self::Runtime { .. } => "ZNR-3900",
        }
    }

    /// Whether the failure came from the snapshot stream rather than the store.
    #[must_use]
    pub const fn is_snapshot_error(&self) -> bool {
        matches!(self, Self::MalformedSnapshot { .. } | Self::Input { .. })
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Convenience constructor for snapshot schema violations.
    #[must_use]
    pub fn malformed(location: impl Into<String>, details: impl Into<String>) -> Self {
        Self::MalformedSnapshot {
            location: location.into(),
            details: details.into(),
        }
    }

    /// Wrap a store failure with the operation and node path it hit.
    #[must_use]
    pub fn store(operation: &'static str, path: &str, source: StoreError) -> Self {
        Self::Store {
            operation,
            path: path.to_string(),
            source,
        }
    }
}

impl From<serde_json::Error> for ZnrError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for ZnrError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_variants() -> Vec<ZnrError> {
        vec![
            ZnrError::InvalidConfig {
                details: String::new(),
            },
            ZnrError::MissingConfig {
                path: PathBuf::new(),
            },
            ZnrError::ConfigParse {
                context: "",
                details: String::new(),
            },
            ZnrError::malformed("", ""),
            ZnrError::Input {
                source: std::io::Error::other("test"),
            },
            ZnrError::Serialization {
                context: "",
                details: String::new(),
            },
            ZnrError::store(
                "create",
                "/a",
                StoreError::Unavailable {
                    details: String::new(),
                },
            ),
            ZnrError::Io {
                path: PathBuf::new(),
                source: std::io::Error::other("test"),
            },
            ZnrError::Runtime {
                details: String::new(),
            },
        ]
    }

    #[test]
    fn error_codes_are_unique() {
        let errors = all_variants();
        let codes: Vec<&str> = errors.iter().map(ZnrError::code).collect();
        let unique: std::collections::HashSet<&&str> = codes.iter().collect();
        assert_eq!(
            codes.len(),
            unique.len(),
            "error codes must be unique: {codes:?}"
        );
    }

    #[test]
    fn display_includes_code_and_details() {
        for err in all_variants() {
            let msg = err.to_string();
            assert!(
                msg.contains(err.code()),
                "display should contain error code: {msg}"
            );
        }

        let err = ZnrError::malformed("/a/b", "missing required fields: [\"acls\"]");
        let msg = err.to_string();
        assert!(msg.contains("/a/b"), "{msg}");
        assert!(msg.contains("acls"), "{msg}");
    }

    #[test]
    fn snapshot_errors_are_classified() {
        assert!(ZnrError::malformed("x", "y").is_snapshot_error());
        assert!(
            ZnrError::Input {
                source: std::io::Error::other("eof"),
            }
            .is_snapshot_error()
        );
        assert!(
            !ZnrError::store("exists", "/", StoreError::Closed).is_snapshot_error()
        );
    }

    #[test]
    fn store_error_names_operation_and_path() {
        let err = ZnrError::store(
            "set_data",
            "/config/app",
            StoreError::NoNode {
                path: "/config/app".to_string(),
            },
        );
        let msg = err.to_string();
        assert!(msg.contains("set_data"), "{msg}");
        assert!(msg.contains("/config/app"), "{msg}");
    }

    #[test]
    fn from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: ZnrError = json_err.into();
        assert_eq!(err.code(), "ZNR-2101");
    }

    #[test]
    fn from_toml_error() {
        let toml_err = toml::from_str::<toml::Value>("= invalid").unwrap_err();
        let err: ZnrError = toml_err.into();
        assert_eq!(err.code(), "ZNR-1003");
    }
}
