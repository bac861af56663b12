//! Ancestor chain: the lineage of the record currently being restored.
//!
//! Snapshots list nodes in the order the backup walked the tree, so a node's
//! ancestors (when present at all) show up before it. The chain keeps just the
//! records on the path from the top of the tree down to the current record:
//! each push pops entries that are not ancestors of the new record, then
//! appends it. Memory is bounded by tree depth.

use crate::core::paths::is_strict_ancestor;
use crate::snapshot::record::NodeRecord;

/// A record held in the chain with the filter verdict it received.
#[derive(Debug)]
pub struct ChainEntry {
    pub record: NodeRecord,
    /// Whether the record passed the filters and was restored itself.
    pub kept: bool,
}

/// Bounded stack of records from the top of the tree to the current one.
#[derive(Debug, Default)]
pub struct AncestorChain {
    entries: Vec<ChainEntry>,
    max_depth: usize,
}

impl AncestorChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the next record from the stream, dropping entries it does not
    /// descend from. Returns the ancestors still on the chain (top-down) and
    /// the new entry.
    pub fn push(&mut self, record: NodeRecord, kept: bool) -> (&[ChainEntry], &ChainEntry) {
        while self
            .entries
            .last()
            .is_some_and(|tail| !is_strict_ancestor(&tail.record.path, &record.path))
        {
            self.entries.pop();
        }
        self.entries.push(ChainEntry { record, kept });
        self.max_depth = self.max_depth.max(self.entries.len());

        let (ancestors, current) = self.entries.split_at(self.entries.len() - 1);
        (ancestors, &current[0])
    }

    /// Current chain length.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Longest the chain has been during this run.
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Paths on the chain, top-down.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.record.path.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(path: &str) -> NodeRecord {
        NodeRecord {
            path: path.to_string(),
            ephemeral_owner: 0,
            data: None,
            acls: Vec::new(),
        }
    }

    fn push_paths(chain: &mut AncestorChain, path: &str) -> Vec<String> {
        let (ancestors, _) = chain.push(record(path), true);
        ancestors.iter().map(|e| e.record.path.clone()).collect()
    }

    #[test]
    fn first_record_starts_chain_at_any_depth() {
        let mut chain = AncestorChain::new();
        assert!(push_paths(&mut chain, "/deep/down/node").is_empty());
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn descendants_extend_and_siblings_replace() {
        let mut chain = AncestorChain::new();
        push_paths(&mut chain, "/a");
        assert_eq!(push_paths(&mut chain, "/a/b"), ["/a"]);
        assert_eq!(push_paths(&mut chain, "/a/b/c"), ["/a", "/a/b"]);
        assert_eq!(push_paths(&mut chain, "/a/d"), ["/a"]);
        assert!(push_paths(&mut chain, "/e").is_empty());
        assert_eq!(chain.paths().collect::<Vec<_>>(), ["/e"]);
        assert_eq!(chain.max_depth(), 3);
    }

    #[test]
    fn string_prefix_without_boundary_is_not_an_ancestor() {
        let mut chain = AncestorChain::new();
        push_paths(&mut chain, "/a");
        assert!(push_paths(&mut chain, "/ab").is_empty());
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn repeated_path_replaces_itself() {
        let mut chain = AncestorChain::new();
        push_paths(&mut chain, "/a");
        push_paths(&mut chain, "/a/b");
        assert_eq!(push_paths(&mut chain, "/a/b"), ["/a"]);
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn skipped_levels_are_allowed() {
        let mut chain = AncestorChain::new();
        push_paths(&mut chain, "/a");
        assert_eq!(push_paths(&mut chain, "/a/x/y/z"), ["/a"]);
    }

    #[test]
    fn keeps_filter_verdict() {
        let mut chain = AncestorChain::new();
        chain.push(record("/a"), false);
        let (ancestors, current) = chain.push(record("/a/b"), true);
        assert!(!ancestors[0].kept);
        assert!(current.kept);
    }
}
