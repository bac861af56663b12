//! Decoded snapshot records.

use serde::{Deserialize, Serialize};

/// One ACL entry exactly as the snapshot stores it.
///
/// Unknown fields are rejected: the ACL schema is strict, unlike the node schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SnapshotAcl {
    pub scheme: String,
    pub id: String,
    pub perms: i32,
}

/// A single node decoded from the snapshot stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRecord {
    /// Absolute node path (the top-level key).
    pub path: String,
    /// Owning session id; zero for durable nodes.
    pub ephemeral_owner: i64,
    /// Payload; `None` when the snapshot holds `null`.
    pub data: Option<Vec<u8>>,
    pub acls: Vec<SnapshotAcl>,
}

impl NodeRecord {
    /// Whether the node was ephemeral when the snapshot was taken.
    pub const fn is_ephemeral(&self) -> bool {
        self.ephemeral_owner != 0
    }

    /// Payload length, treating a missing payload as zero.
    pub fn data_len(&self) -> usize {
        self.data.as_ref().map_or(0, Vec::len)
    }
}
