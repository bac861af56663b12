//! Store abstraction: the blocking node operations the restore engine drives.
//!
//! The engine only ever talks to a [`Store`]; the concrete backends are
//! [`memory::MemoryStore`] (in-process, used for dry runs and tests) and
//! [`dir::DirStore`] (mirrors the namespace into a local directory tree).

pub mod acl;
pub mod dir;
pub mod memory;

use std::path::PathBuf;

use thiserror::Error;

use crate::store::acl::Acl;

/// Failures reported by a store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// `create` hit a node that is already there.
    #[error("node already exists: {path}")]
    NodeExists { path: String },

    /// The node (or, for `create`, its parent) does not exist.
    #[error("no such node: {path}")]
    NoNode { path: String },

    /// The backend rejected the ACL list.
    #[error("invalid ACL for {path}: {details}")]
    InvalidAcl { path: String, details: String },

    /// The backend cannot represent this node path.
    #[error("invalid path {path}: {details}")]
    InvalidPath { path: String, details: String },

    /// The session was already closed.
    #[error("session closed")]
    Closed,

    /// Backend cannot serve requests.
    #[error("store unavailable: {details}")]
    Unavailable { details: String },

    #[error("IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    /// Whether this is the "already exists" outcome of a create.
    pub const fn is_node_exists(&self) -> bool {
        matches!(self, Self::NodeExists { .. })
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Credentials attached to a store session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl Credentials {
    /// Scheme used for user/password credentials.
    pub const DIGEST_SCHEME: &'static str = "digest";

    /// `user:password` bytes as sent to the store.
    pub fn digest_auth(&self) -> Vec<u8> {
        format!("{}:{}", self.user, self.password).into_bytes()
    }
}

/// Blocking node operations over a single session.
///
/// `set_data` and `set_acl` ignore the node version (last writer wins).
pub trait Store {
    /// Whether a node exists at `path`.
    fn exists(&mut self, path: &str) -> StoreResult<bool>;

    /// Create a persistent node. Fails with [`StoreError::NodeExists`] when the
    /// node is already present and [`StoreError::NoNode`] when its parent is not.
    fn create(&mut self, path: &str, data: Option<&[u8]>, acls: &[Acl]) -> StoreResult<()>;

    /// Replace a node's payload regardless of its version.
    fn set_data(&mut self, path: &str, data: Option<&[u8]>) -> StoreResult<()>;

    /// Replace a node's ACL regardless of its ACL version.
    fn set_acl(&mut self, path: &str, acls: &[Acl]) -> StoreResult<()>;

    /// Attach authentication to the session.
    fn authenticate(&mut self, scheme: &str, auth: &[u8]) -> StoreResult<()>;

    /// End the session. Further calls fail with [`StoreError::Closed`].
    fn close(&mut self) -> StoreResult<()>;
}

impl<S: Store + ?Sized> Store for &mut S {
    fn exists(&mut self, path: &str) -> StoreResult<bool> {
        (**self).exists(path)
    }

    fn create(&mut self, path: &str, data: Option<&[u8]>, acls: &[Acl]) -> StoreResult<()> {
        (**self).create(path, data, acls)
    }

    fn set_data(&mut self, path: &str, data: Option<&[u8]>) -> StoreResult<()> {
        (**self).set_data(path, data)
    }

    fn set_acl(&mut self, path: &str, acls: &[Acl]) -> StoreResult<()> {
        (**self).set_acl(path, acls)
    }

    fn authenticate(&mut self, scheme: &str, auth: &[u8]) -> StoreResult<()> {
        (**self).authenticate(scheme, auth)
    }

    fn close(&mut self) -> StoreResult<()> {
        (**self).close()
    }
}

/// Reject empty ACL lists the way the coordination service does.
pub(crate) fn check_acls(path: &str, acls: &[Acl]) -> StoreResult<()> {
    if acls.is_empty() {
        return Err(StoreError::InvalidAcl {
            path: path.to_string(),
            details: "ACL list must not be empty".to_string(),
        });
    }
    Ok(())
}
