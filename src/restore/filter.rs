//! Record filtering: ephemeral owner, root path, exclusion and inclusion.

use std::fmt;

use regex::Regex;
use tracing::debug;

use crate::core::errors::{Result, ZnrError};
use crate::core::paths::{is_within_root, normalize_root};
use crate::snapshot::record::NodeRecord;

/// Why a record was left out of the restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Node was ephemeral; its owning session is gone.
    Ephemeral,
    /// Node is not under the configured root path.
    OutsideRoot,
    /// Node matched an exclusion pattern.
    Excluded,
    /// Inclusion patterns exist and none matched.
    NotIncluded,
}

impl SkipReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ephemeral => "ephemeral",
            Self::OutsideRoot => "outside_root",
            Self::Excluded => "excluded",
            Self::NotIncluded => "not_included",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compiled path pattern, matched against the whole absolute path.
#[derive(Debug, Clone)]
struct PathPattern {
    original: String,
    compiled: Regex,
}

impl PathPattern {
    fn compile(kind: &str, pattern: &str) -> Result<Self> {
        let compiled = Regex::new(&format!("^(?:{pattern})$")).map_err(|err| {
            ZnrError::InvalidConfig {
                details: format!("invalid {kind} pattern {pattern:?}: {err}"),
            }
        })?;
        Ok(Self {
            original: pattern.to_string(),
            compiled,
        })
    }
}

/// Filters applied to every record before it touches the store.
#[derive(Debug, Clone)]
pub struct PathFilter {
    root: String,
    include: Vec<PathPattern>,
    exclude: Vec<PathPattern>,
}

impl Default for PathFilter {
    fn default() -> Self {
        Self {
            root: crate::core::paths::ROOT.to_string(),
            include: Vec::new(),
            exclude: Vec::new(),
        }
    }
}

impl PathFilter {
    /// Build a filter; patterns are regular expressions that must match the
    /// entire node path.
    pub fn new(root: &str, include: &[String], exclude: &[String]) -> Result<Self> {
        Ok(Self {
            root: normalize_root(root),
            include: include
                .iter()
                .map(|p| PathPattern::compile("include", p))
                .collect::<Result<_>>()?,
            exclude: exclude
                .iter()
                .map(|p| PathPattern::compile("exclude", p))
                .collect::<Result<_>>()?,
        })
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// `None` when the record should be restored.
    pub fn check(&self, record: &NodeRecord) -> Option<SkipReason> {
        if record.is_ephemeral() {
            return Some(SkipReason::Ephemeral);
        }
        self.check_path(&record.path)
    }

    /// Path-only checks: root, then exclusion, then inclusion.
    pub fn check_path(&self, path: &str) -> Option<SkipReason> {
        if !is_within_root(&self.root, path) {
            return Some(SkipReason::OutsideRoot);
        }
        if let Some(pattern) = self.exclude.iter().find(|p| p.compiled.is_match(path)) {
            debug!(path, pattern = %pattern.original, "path excluded");
            return Some(SkipReason::Excluded);
        }
        if !self.include.is_empty() {
            match self.include.iter().find(|p| p.compiled.is_match(path)) {
                Some(pattern) => debug!(path, pattern = %pattern.original, "path included"),
                None => return Some(SkipReason::NotIncluded),
            }
        }
        None
    }
}
