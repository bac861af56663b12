//! Store-side ACL model and translation from snapshot ACL entries.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::snapshot::record::SnapshotAcl;

/// Permission bitmask carried by an ACL entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Perms(pub i32);

impl Perms {
    pub const READ: Self = Self(1);
    pub const WRITE: Self = Self(1 << 1);
    pub const CREATE: Self = Self(1 << 2);
    pub const DELETE: Self = Self(1 << 3);
    pub const ADMIN: Self = Self(1 << 4);
    pub const ALL: Self = Self(0x1f);

    /// Whether every bit in `other` is set in `self`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

/// Authentication identity an ACL entry applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Id {
    pub scheme: Cow<'static, str>,
    pub id: Cow<'static, str>,
}

impl Id {
    /// The well-known identity matching every client.
    pub const ANYONE_UNSAFE: Self = Self {
        scheme: Cow::Borrowed("world"),
        id: Cow::Borrowed("anyone"),
    };

    /// Build an identity, reusing [`Id::ANYONE_UNSAFE`] for `world:anyone`.
    #[must_use]
    pub fn new(scheme: &str, id: &str) -> Self {
        if scheme == Self::ANYONE_UNSAFE.scheme && id == Self::ANYONE_UNSAFE.id {
            Self::ANYONE_UNSAFE
        } else {
            Self {
                scheme: Cow::Owned(scheme.to_string()),
                id: Cow::Owned(id.to_string()),
            }
        }
    }

    /// Whether this is the canonical `world:anyone` constant (no allocation).
    #[must_use]
    pub fn is_canonical_anyone(&self) -> bool {
        matches!(
            (&self.scheme, &self.id),
            (Cow::Borrowed("world"), Cow::Borrowed("anyone"))
        )
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scheme, self.id)
    }
}

/// One access-control entry as the store understands it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Acl {
    pub perms: Perms,
    pub id: Id,
}

/// Fully open ACL: every permission for `world:anyone`.
pub const OPEN_ACL_UNSAFE: &[Acl] = &[Acl {
    perms: Perms::ALL,
    id: Id::ANYONE_UNSAFE,
}];

impl Acl {
    /// Permissive default ACL used for placeholders and when ACLs are disabled.
    #[must_use]
    pub fn open_unsafe() -> Vec<Self> {
        OPEN_ACL_UNSAFE.to_vec()
    }
}

impl From<&SnapshotAcl> for Acl {
    fn from(entry: &SnapshotAcl) -> Self {
        Self {
            perms: Perms(entry.perms),
            id: Id::new(&entry.scheme, &entry.id),
        }
    }
}

/// Translate a snapshot ACL list into store ACLs, preserving order.
pub fn translate_acls(entries: &[SnapshotAcl]) -> Vec<Acl> {
    entries.iter().map(Acl::from).collect()
}
