//! Ancestor materialization.
//!
//! [`PathMaterializer::ensure`] guarantees a path exists before it returns,
//! creating missing segments top-down as bare nodes (no payload, open ACL).
//! Every path it learns about goes into the created-paths set, so ancestors
//! shared by many records cost store round-trips only once per run.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::core::errors::{Result, ZnrError};
use crate::core::paths::{ROOT, parent_path};
use crate::store::Store;
use crate::store::acl::OPEN_ACL_UNSAFE;

/// How a known path came to exist during this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathOrigin {
    /// Already present when first checked, or created by another actor.
    Existing,
    /// Created bare by this run to hold descendants.
    Placeholder,
    /// Created or updated from its own snapshot record.
    Restored,
}

/// Ensures ancestor paths exist; owns the created-paths set.
#[derive(Debug, Default)]
pub struct PathMaterializer {
    known: HashMap<String, PathOrigin>,
    created: u64,
    raced: u64,
    fresh: Vec<String>,
}

impl PathMaterializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sure `path` exists in the store, creating missing segments from
    /// the top down. `/` always exists.
    ///
    /// A create that fails because the node appeared in the meantime counts
    /// as success: the path exists, which is all this guarantees.
    pub fn ensure<S: Store + ?Sized>(&mut self, store: &mut S, path: &str) -> Result<()> {
        let mut missing: Vec<&str> = Vec::new();
        let mut cursor = path;
        while cursor != ROOT && !self.known.contains_key(cursor) {
            let present = store
                .exists(cursor)
                .map_err(|err| ZnrError::store("exists", cursor, err))?;
            if present {
                self.known.insert(cursor.to_string(), PathOrigin::Existing);
                break;
            }
            missing.push(cursor);
            cursor = parent_path(cursor);
        }

        for target in missing.into_iter().rev() {
            match store.create(target, None, OPEN_ACL_UNSAFE) {
                Ok(()) => {
                    info!(path = target, "created path");
                    self.created += 1;
                    self.known.insert(target.to_string(), PathOrigin::Placeholder);
                    self.fresh.push(target.to_string());
                }
                Err(err) if err.is_node_exists() => {
                    debug!(path = target, "path created concurrently, treating as present");
                    self.raced += 1;
                    self.known.insert(target.to_string(), PathOrigin::Existing);
                }
                Err(err) => return Err(ZnrError::store("create", target, err)),
            }
        }
        Ok(())
    }

    /// What this run knows about `path`, if anything.
    pub fn origin(&self, path: &str) -> Option<PathOrigin> {
        self.known.get(path).copied()
    }

    /// Record that `path` exists with the given origin.
    pub fn mark(&mut self, path: &str, origin: PathOrigin) {
        self.known.insert(path.to_string(), origin);
    }

    /// Placeholders created so far.
    pub fn created_count(&self) -> u64 {
        self.created
    }

    /// Creates that lost a race to another writer.
    pub fn raced_count(&self) -> u64 {
        self.raced
    }

    /// Placeholders created since the last call, top-down.
    pub fn take_fresh(&mut self) -> Vec<String> {
        std::mem::take(&mut self.fresh)
    }

    /// Size of the created-paths set.
    pub fn known_len(&self) -> usize {
        self.known.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::acl::Acl;
    use crate::store::memory::{MemoryStore, StoreOp};

    #[test]
    fn root_is_a_no_op() {
        let mut store = MemoryStore::new();
        let mut materializer = PathMaterializer::new();
        materializer.ensure(&mut store, "/").unwrap();
        assert!(store.journal().is_empty());
    }

    #[test]
    fn creates_missing_segments_top_down() {
        let mut store = MemoryStore::new();
        let mut materializer = PathMaterializer::new();
        materializer.ensure(&mut store, "/a/b/c").unwrap();

        let creates: Vec<&str> = store
            .journal()
            .iter()
            .filter_map(|op| match op {
                StoreOp::Create(p) => Some(p.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(creates, ["/a", "/a/b", "/a/b/c"]);
        let node = store.get("/a/b/c").unwrap();
        assert_eq!(node.data, None);
        assert_eq!(node.acls, Acl::open_unsafe());
        assert_eq!(materializer.created_count(), 3);
        assert_eq!(materializer.origin("/a/b"), Some(PathOrigin::Placeholder));
    }

    #[test]
    fn stops_at_first_existing_ancestor() {
        let mut store = MemoryStore::new();
        store.seed("/a/b", Some(b"keep"), &Acl::open_unsafe());
        let mut materializer = PathMaterializer::new();
        materializer.ensure(&mut store, "/a/b/c/d").unwrap();

        assert_eq!(store.mutations_of("/a/b"), 0);
        assert_eq!(store.touches_of("/a"), 0);
        assert_eq!(store.get("/a/b").unwrap().data.as_deref(), Some(&b"keep"[..]));
        assert!(store.contains("/a/b/c/d"));
        assert_eq!(materializer.origin("/a/b"), Some(PathOrigin::Existing));
    }

    #[test]
    fn second_call_performs_no_store_calls() {
        let mut store = MemoryStore::new();
        let mut materializer = PathMaterializer::new();
        materializer.ensure(&mut store, "/a/b").unwrap();
        let before = store.journal().len();
        materializer.ensure(&mut store, "/a/b").unwrap();
        materializer.ensure(&mut store, "/a").unwrap();
        assert_eq!(store.journal().len(), before);
        assert_eq!(materializer.created_count(), 2);
        assert_eq!(materializer.take_fresh(), ["/a", "/a/b"]);
        assert!(materializer.take_fresh().is_empty());
    }

    #[test]
    fn concurrent_creator_is_tolerated() {
        let mut store = MemoryStore::new();
        store.race_on("/a");
        let mut materializer = PathMaterializer::new();
        materializer.ensure(&mut store, "/a/b").unwrap();
        assert!(store.contains("/a/b"));
        assert_eq!(materializer.raced_count(), 1);
        assert_eq!(materializer.created_count(), 1);
        assert_eq!(materializer.origin("/a"), Some(PathOrigin::Existing));
    }

    #[test]
    fn store_failure_is_fatal() {
        let mut store = MemoryStore::new();
        store.fail_on("/a/b");
        let mut materializer = PathMaterializer::new();
        let err = materializer.ensure(&mut store, "/a/b/c").unwrap_err();
        assert!(matches!(err, ZnrError::Store { operation: "create", .. }));
        assert!(!store.contains("/a/b/c"));
    }
}
