//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use znode_restore::prelude::*;
//! ```

// Core
pub use crate::core::config::{Config, RestoreConfig};
pub use crate::core::errors::{Result, ZnrError};

// Snapshot
pub use crate::snapshot::decoder::SnapshotDecoder;
pub use crate::snapshot::record::{NodeRecord, SnapshotAcl};

// Store
pub use crate::store::acl::{Acl, Id, Perms};
pub use crate::store::dir::DirStore;
pub use crate::store::memory::MemoryStore;
pub use crate::store::{Credentials, Store, StoreError};

// Restore
pub use crate::restore::engine::{RestoreEngine, RestoreStats};
pub use crate::restore::filter::{PathFilter, SkipReason};
pub use crate::restore::restorer::NodeOutcome;

// Logging
pub use crate::logger::jsonl::{JsonlConfig, JsonlWriter};
