//! In-process store backend.
//!
//! Holds the namespace in a `BTreeMap` and journals every call, which makes it
//! the backend for `--dry-run` and for asserting exactly which operations a
//! restore issued. It can also inject a concurrent creator or a hard failure
//! at a chosen path.

use std::collections::{BTreeMap, HashSet};

use crate::core::paths::{ROOT, parent_path};
use crate::store::acl::Acl;
use crate::store::{Store, StoreError, StoreResult, check_acls};

/// A node as held by [`MemoryStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredNode {
    pub data: Option<Vec<u8>>,
    pub acls: Vec<Acl>,
    /// Bumped on every `set_data`.
    pub version: i32,
    /// Bumped on every `set_acl`.
    pub acl_version: i32,
}

impl StoredNode {
    fn new(data: Option<&[u8]>, acls: &[Acl]) -> Self {
        Self {
            data: data.map(<[u8]>::to_vec),
            acls: acls.to_vec(),
            version: 0,
            acl_version: 0,
        }
    }
}

/// One journaled store call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    Exists(String),
    Create(String),
    SetData(String),
    SetAcl(String),
    Authenticate(String),
    Close,
}

impl StoreOp {
    /// Node path the call targeted, if any.
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::Exists(p) | Self::Create(p) | Self::SetData(p) | Self::SetAcl(p) => Some(p),
            Self::Authenticate(_) | Self::Close => None,
        }
    }

    /// Whether the call can change the namespace.
    pub const fn is_mutation(&self) -> bool {
        matches!(self, Self::Create(_) | Self::SetData(_) | Self::SetAcl(_))
    }
}

/// Namespace kept entirely in memory.
#[derive(Debug)]
pub struct MemoryStore {
    nodes: BTreeMap<String, StoredNode>,
    journal: Vec<StoreOp>,
    auth: Vec<(String, Vec<u8>)>,
    closed: bool,
    racing: HashSet<String>,
    failing: HashSet<String>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Empty namespace holding only the root node.
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(ROOT.to_string(), StoredNode::new(None, &Acl::open_unsafe()));
        Self {
            nodes,
            journal: Vec::new(),
            auth: Vec::new(),
            closed: false,
            racing: HashSet::new(),
            failing: HashSet::new(),
        }
    }

    /// Seed a node directly, creating missing ancestors as bare nodes.
    /// Seeding is not journaled.
    pub fn seed(&mut self, path: &str, data: Option<&[u8]>, acls: &[Acl]) {
        let parent = parent_path(path);
        if parent != path && !self.nodes.contains_key(parent) {
            self.seed(parent, None, &Acl::open_unsafe());
        }
        self.nodes
            .insert(path.to_string(), StoredNode::new(data, acls));
    }

    /// Make another actor win the race for `path`: the next `exists` reports
    /// it missing, and the next `create` finds it already created.
    pub fn race_on(&mut self, path: &str) {
        self.racing.insert(path.to_string());
    }

    /// Fail every mutation of `path` with [`StoreError::Unavailable`].
    pub fn fail_on(&mut self, path: &str) {
        self.failing.insert(path.to_string());
    }

    pub fn get(&self, path: &str) -> Option<&StoredNode> {
        self.nodes.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.nodes.contains_key(path)
    }

    /// All node paths in lexical order, root included.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Every call made so far, in order.
    pub fn journal(&self) -> &[StoreOp] {
        &self.journal
    }

    /// Mutating calls that targeted `path`.
    pub fn mutations_of(&self, path: &str) -> usize {
        self.journal
            .iter()
            .filter(|op| op.is_mutation() && op.path() == Some(path))
            .count()
    }

    /// Any calls at all (reads included) that targeted `path`.
    pub fn touches_of(&self, path: &str) -> usize {
        self.journal
            .iter()
            .filter(|op| op.path() == Some(path))
            .count()
    }

    pub fn auth_info(&self) -> &[(String, Vec<u8>)] {
        &self.auth
    }

    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Data and ACLs of every node, for whole-namespace comparisons.
    pub fn snapshot(&self) -> BTreeMap<String, (Option<Vec<u8>>, Vec<Acl>)> {
        self.nodes
            .iter()
            .map(|(path, node)| (path.clone(), (node.data.clone(), node.acls.clone())))
            .collect()
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.closed {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }

    fn check_failure(&self, path: &str) -> StoreResult<()> {
        if self.failing.contains(path) {
            return Err(StoreError::Unavailable {
                details: format!("injected failure at {path}"),
            });
        }
        Ok(())
    }

    fn node_mut(&mut self, path: &str) -> StoreResult<&mut StoredNode> {
        self.nodes.get_mut(path).ok_or_else(|| StoreError::NoNode {
            path: path.to_string(),
        })
    }
}

impl Store for MemoryStore {
    fn exists(&mut self, path: &str) -> StoreResult<bool> {
        self.ensure_open()?;
        self.journal.push(StoreOp::Exists(path.to_string()));
        if self.racing.contains(path) {
            return Ok(false);
        }
        Ok(self.nodes.contains_key(path))
    }

    fn create(&mut self, path: &str, data: Option<&[u8]>, acls: &[Acl]) -> StoreResult<()> {
        self.ensure_open()?;
        self.journal.push(StoreOp::Create(path.to_string()));
        self.check_failure(path)?;
        if self.racing.remove(path) {
            self.seed(path, None, &Acl::open_unsafe());
        }
        if self.nodes.contains_key(path) {
            return Err(StoreError::NodeExists {
                path: path.to_string(),
            });
        }
        let parent = parent_path(path);
        if !self.nodes.contains_key(parent) {
            return Err(StoreError::NoNode {
                path: parent.to_string(),
            });
        }
        check_acls(path, acls)?;
        self.nodes
            .insert(path.to_string(), StoredNode::new(data, acls));
        Ok(())
    }

    fn set_data(&mut self, path: &str, data: Option<&[u8]>) -> StoreResult<()> {
        self.ensure_open()?;
        self.journal.push(StoreOp::SetData(path.to_string()));
        self.check_failure(path)?;
        let node = self.node_mut(path)?;
        node.data = data.map(<[u8]>::to_vec);
        node.version += 1;
        Ok(())
    }

    fn set_acl(&mut self, path: &str, acls: &[Acl]) -> StoreResult<()> {
        self.ensure_open()?;
        self.journal.push(StoreOp::SetAcl(path.to_string()));
        self.check_failure(path)?;
        check_acls(path, acls)?;
        let node = self.node_mut(path)?;
        node.acls = acls.to_vec();
        node.acl_version += 1;
        Ok(())
    }

    fn authenticate(&mut self, scheme: &str, auth: &[u8]) -> StoreResult<()> {
        self.ensure_open()?;
        self.journal.push(StoreOp::Authenticate(scheme.to_string()));
        self.auth.push((scheme.to_string(), auth.to_vec()));
        Ok(())
    }

    fn close(&mut self) -> StoreResult<()> {
        self.ensure_open()?;
        self.journal.push(StoreOp::Close);
        self.closed = true;
        Ok(())
    }
}
