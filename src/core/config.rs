//! Configuration system: TOML file + env var overrides + defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::errors::{Result, ZnrError};
use crate::core::paths::{ROOT, normalize_root};
use crate::store::Credentials;

/// Log levels accepted by `[logging].level`.
pub const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Full znode restore configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Config {
    pub restore: RestoreConfig,
    pub input: InputConfig,
    pub store: StoreConfig,
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
    /// Where this config was loaded from; never serialized back.
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

/// What gets restored and how conflicts are handled.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RestoreConfig {
    /// Only nodes at or below this path are restored.
    pub root_path: String,
    /// Replace data and ACLs of nodes that already exist.
    pub overwrite_existing: bool,
    /// Create nodes with the open ACL instead of the recorded ACLs.
    pub no_acls: bool,
    /// Full-match path regexes; when non-empty a node must match one.
    pub include: Vec<String>,
    /// Full-match path regexes; a matching node is skipped.
    pub exclude: Vec<String>,
}

/// Snapshot source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct InputConfig {
    /// Snapshot file; `-` reads standard input.
    pub path: PathBuf,
    /// Input is gzip-compressed.
    pub compress: bool,
}

/// Target store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory the node tree is mirrored into.
    pub target_dir: Option<PathBuf>,
}

/// Session credentials (digest scheme).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct AuthConfig {
    pub user: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Append-only JSONL activity log.
    pub activity_log: Option<PathBuf>,
}

impl Default for RestoreConfig {
    fn default() -> Self {
        Self {
            root_path: ROOT.to_string(),
            overwrite_existing: false,
            no_acls: false,
            include: Vec::new(),
            exclude: Vec::new(),
        }
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("-"),
            compress: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            activity_log: None,
        }
    }
}

impl AuthConfig {
    /// Credentials to present, when both halves are configured.
    pub fn credentials(&self) -> Option<Credentials> {
        match (&self.user, &self.password) {
            (Some(user), Some(password)) => Some(Credentials {
                user: user.clone(),
                password: password.clone(),
            }),
            _ => None,
        }
    }
}

impl InputConfig {
    pub fn is_stdin(&self) -> bool {
        self.path.as_os_str() == "-"
    }
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        let home_dir = env::var_os("HOME").map_or_else(|| PathBuf::from("/tmp"), PathBuf::from);
        home_dir.join(".config").join("znr").join("config.toml")
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from default path; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| ZnrError::Io {
                path: path_buf.clone(),
                source,
            })?;
            let mut parsed: Self = toml::from_str(&raw)?;
            parsed.source = Some(path_buf);
            parsed
        } else if path.is_some() {
            return Err(ZnrError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.apply_env_overrides_from(env_var)?;
        cfg.normalize();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Deterministic hash of the effective config for the activity log.
    ///
    /// FNV-1a over the canonical JSON form of the redacted config.
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(&self.redacted())?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    /// Copy with the password blanked, for display.
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.auth.password.is_some() {
            copy.auth.password = Some("********".to_string());
        }
        copy
    }

    pub(crate) fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        // restore
        if let Some(raw) = lookup("ZNR_RESTORE_ROOT_PATH") {
            self.restore.root_path = raw;
        }
        set_env_bool(
            &mut lookup,
            "ZNR_RESTORE_OVERWRITE_EXISTING",
            &mut self.restore.overwrite_existing,
        )?;
        set_env_bool(&mut lookup, "ZNR_RESTORE_NO_ACLS", &mut self.restore.no_acls)?;

        // input / store
        set_env_bool(&mut lookup, "ZNR_INPUT_COMPRESS", &mut self.input.compress)?;
        if let Some(raw) = lookup("ZNR_STORE_TARGET_DIR") {
            self.store.target_dir = Some(PathBuf::from(raw));
        }

        // auth
        if let Some(raw) = lookup("ZNR_AUTH_USER") {
            self.auth.user = Some(raw);
        }
        if let Some(raw) = lookup("ZNR_AUTH_PASSWORD") {
            self.auth.password = Some(raw);
        }

        // logging
        if let Some(raw) = lookup("ZNR_LOG_LEVEL") {
            self.logging.level = raw;
        }
        if let Some(raw) = lookup("ZNR_LOG_ACTIVITY_FILE") {
            self.logging.activity_log = Some(PathBuf::from(raw));
        }

        Ok(())
    }

    /// Trim trailing slashes from the root path and lowercase the level.
    pub fn normalize(&mut self) {
        self.restore.root_path = normalize_root(self.restore.root_path.trim());
        self.logging.level = self.logging.level.trim().to_ascii_lowercase();
    }

    pub fn validate(&self) -> Result<()> {
        let root = &self.restore.root_path;
        if !root.starts_with('/') {
            return Err(ZnrError::InvalidConfig {
                details: format!("restore.root_path must be absolute, got {root:?}"),
            });
        }
        if root != ROOT && (root.ends_with('/') || root.contains("//")) {
            return Err(ZnrError::InvalidConfig {
                details: format!("restore.root_path has an empty segment: {root:?}"),
            });
        }

        for (name, patterns) in [
            ("include", &self.restore.include),
            ("exclude", &self.restore.exclude),
        ] {
            for pattern in patterns {
                if let Err(error) = Regex::new(pattern) {
                    return Err(ZnrError::InvalidConfig {
                        details: format!("restore.{name} pattern {pattern:?}: {error}"),
                    });
                }
            }
        }

        if self.auth.user.is_some() != self.auth.password.is_some() {
            return Err(ZnrError::InvalidConfig {
                details: "auth.user and auth.password must be set together".to_string(),
            });
        }

        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(ZnrError::InvalidConfig {
                details: format!(
                    "logging.level must be one of {}, got {:?}",
                    LOG_LEVELS.join("|"),
                    self.logging.level
                ),
            });
        }

        if self.input.path.as_os_str().is_empty() {
            return Err(ZnrError::InvalidConfig {
                details: "input.path must not be empty (use \"-\" for stdin)".to_string(),
            });
        }

        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn set_env_bool<F>(lookup: &mut F, name: &str, slot: &mut bool) -> Result<()>
where
    F: FnMut(&str) -> Option<String>,
{
    if let Some(raw) = lookup(name) {
        *slot = parse_env_bool(name, &raw)?;
    }
    Ok(())
}

fn parse_env_bool(name: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ZnrError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: expected a boolean"),
        }),
    }
}
