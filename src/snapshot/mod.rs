//! Snapshot format: path-keyed JSON records and the streaming decoder.

pub mod decoder;
pub mod record;

/// Field holding the owning session id of an ephemeral node.
pub const FIELD_EPHEMERAL_OWNER: &str = "ephemeralOwner";
/// Field holding the base64 payload (or `null`).
pub const FIELD_DATA: &str = "data";
/// Field holding the ACL array.
pub const FIELD_ACLS: &str = "acls";
/// ACL entry field: authentication scheme.
pub const FIELD_ACL_SCHEME: &str = "scheme";
/// ACL entry field: identity within the scheme.
pub const FIELD_ACL_ID: &str = "id";
/// ACL entry field: permission bitmask.
pub const FIELD_ACL_PERMS: &str = "perms";

/// Fields every node object must carry.
pub const REQUIRED_NODE_FIELDS: [&str; 3] = [FIELD_EPHEMERAL_OWNER, FIELD_DATA, FIELD_ACLS];
