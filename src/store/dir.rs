//! Directory-mirror store backend.
//!
//! Each node becomes a directory under the target root, with its payload and
//! ACL kept in a `.znode` JSON file inside that directory. A directory without
//! the metadata file is not a node. The namespace root maps to the target root
//! itself and always exists.
//!
//! Creation uses `create_new` on the metadata file, so two writers racing on
//! the same node see exactly one success and one [`StoreError::NodeExists`].
//! Node paths are mapped segment by segment; a segment that is not a plain
//! file name is rejected with [`StoreError::InvalidPath`].

use std::fs::{self, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Component, Path, PathBuf};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::paths::{ROOT, node_name, parent_path};
use crate::store::acl::{Acl, OPEN_ACL_UNSAFE};
use crate::store::{Store, StoreError, StoreResult, check_acls};

/// Name of the per-node metadata file.
pub const METADATA_FILE: &str = ".znode";

/// Scratch file for metadata updates, renamed over [`METADATA_FILE`].
pub const TEMP_FILE: &str = ".znode.tmp";

/// On-disk metadata of one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeMetadata {
    /// Base64 payload; `None` for a node without data.
    pub data: Option<String>,
    pub acls: Vec<Acl>,
    #[serde(default)]
    pub version: i32,
    #[serde(default)]
    pub acl_version: i32,
}

impl NodeMetadata {
    fn new(data: Option<&[u8]>, acls: &[Acl]) -> Self {
        Self {
            data: data.map(|bytes| BASE64_STANDARD.encode(bytes)),
            acls: acls.to_vec(),
            version: 0,
            acl_version: 0,
        }
    }

    /// Decoded payload.
    pub fn payload(&self) -> Option<Vec<u8>> {
        self.data
            .as_deref()
            .and_then(|text| BASE64_STANDARD.decode(text).ok())
    }
}

/// Store that mirrors the namespace into a directory tree.
#[derive(Debug)]
pub struct DirStore {
    root: PathBuf,
    closed: bool,
}

impl DirStore {
    /// Open (creating if needed) a mirror rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| StoreError::Io {
            path: root.clone(),
            source,
        })?;
        Ok(Self {
            root,
            closed: false,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory backing a node path.
    pub fn node_dir(&self, path: &str) -> PathBuf {
        let mut dir = self.root.clone();
        dir.extend(path.split('/').filter(|segment| !segment.is_empty()));
        dir
    }

    /// Like [`DirStore::node_dir`], but refuses segments that would leave the
    /// mirror root or alias another entry.
    fn checked_node_dir(&self, path: &str) -> StoreResult<PathBuf> {
        let invalid = |details: &str| StoreError::InvalidPath {
            path: path.to_string(),
            details: details.to_string(),
        };
        if path.contains('\0') {
            return Err(invalid("path contains a NUL byte"));
        }
        let mut dir = self.root.clone();
        for segment in path.split('/').filter(|segment| !segment.is_empty()) {
            if !is_plain_segment(segment) {
                return Err(invalid("segment is not a plain file name"));
            }
            dir.push(segment);
        }
        Ok(dir)
    }

    fn metadata_path(&self, path: &str) -> PathBuf {
        self.node_dir(path).join(METADATA_FILE)
    }

    /// Read a node's metadata; `Ok(None)` when the node does not exist.
    pub fn read_metadata(&self, path: &str) -> StoreResult<Option<NodeMetadata>> {
        let file = self.metadata_path(path);
        let raw = match fs::read(&file) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StoreError::Io { path: file, source }),
        };
        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|err| StoreError::Io {
                path: file,
                source: err.into(),
            })
    }

    fn node_exists(&self, path: &str) -> bool {
        path == ROOT || self.metadata_path(path).is_file()
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.closed {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }

    fn update(&self, path: &str, apply: impl FnOnce(&mut NodeMetadata)) -> StoreResult<()> {
        let dir = self.checked_node_dir(path)?;
        // The root has no metadata file until it is first updated.
        let mut meta = match self.read_metadata(path)? {
            Some(meta) => meta,
            None if path == ROOT => NodeMetadata::new(None, OPEN_ACL_UNSAFE),
            None => {
                return Err(StoreError::NoNode {
                    path: path.to_string(),
                });
            }
        };
        apply(&mut meta);
        let file = dir.join(METADATA_FILE);
        let tmp = dir.join(TEMP_FILE);
        let encoded = serde_json::to_vec_pretty(&meta).map_err(|err| StoreError::Io {
            path: file.clone(),
            source: err.into(),
        })?;
        fs::write(&tmp, encoded).map_err(|source| StoreError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &file).map_err(|source| StoreError::Io { path: file, source })
    }
}

fn is_plain_segment(segment: &str) -> bool {
    let mut components = Path::new(segment).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(name)), None) if name == segment
    )
}

/// Settle a write into a freshly created metadata file. On failure the partial
/// file is removed so the node does not look present.
fn finish_new_file(file: PathBuf, written: io::Result<()>) -> StoreResult<()> {
    written.map_err(|source| {
        if let Err(err) = fs::remove_file(&file) {
            debug!(path = %file.display(), error = %err, "could not remove partial metadata file");
        }
        StoreError::Io { path: file, source }
    })
}

impl Store for DirStore {
    fn exists(&mut self, path: &str) -> StoreResult<bool> {
        self.ensure_open()?;
        self.checked_node_dir(path)?;
        Ok(self.node_exists(path))
    }

    fn create(&mut self, path: &str, data: Option<&[u8]>, acls: &[Acl]) -> StoreResult<()> {
        self.ensure_open()?;
        if path == ROOT {
            return Err(StoreError::NodeExists {
                path: path.to_string(),
            });
        }
        let name = node_name(path);
        if name == METADATA_FILE || name == TEMP_FILE {
            return Err(StoreError::InvalidPath {
                path: path.to_string(),
                details: format!("'{name}' is reserved for node metadata"),
            });
        }
        let dir = self.checked_node_dir(path)?;
        let parent = parent_path(path);
        if !self.node_exists(parent) {
            return Err(StoreError::NoNode {
                path: parent.to_string(),
            });
        }
        check_acls(path, acls)?;
        let file = dir.join(METADATA_FILE);
        let encoded = serde_json::to_vec_pretty(&NodeMetadata::new(data, acls)).map_err(|err| {
            StoreError::Io {
                path: file.clone(),
                source: err.into(),
            }
        })?;

        match fs::create_dir(&dir) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {}
            Err(source) => return Err(StoreError::Io { path: dir, source }),
        }

        let mut handle = match OpenOptions::new().write(true).create_new(true).open(&file) {
            Ok(handle) => handle,
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                return Err(StoreError::NodeExists {
                    path: path.to_string(),
                });
            }
            Err(source) => return Err(StoreError::Io { path: file, source }),
        };
        let written = handle.write_all(&encoded);
        finish_new_file(file, written)
    }

    fn set_data(&mut self, path: &str, data: Option<&[u8]>) -> StoreResult<()> {
        self.ensure_open()?;
        self.update(path, |meta| {
            meta.data = data.map(|bytes| BASE64_STANDARD.encode(bytes));
            meta.version += 1;
        })
    }

    fn set_acl(&mut self, path: &str, acls: &[Acl]) -> StoreResult<()> {
        self.ensure_open()?;
        check_acls(path, acls)?;
        self.update(path, |meta| {
            meta.acls = acls.to_vec();
            meta.acl_version += 1;
        })
    }

    fn authenticate(&mut self, scheme: &str, _auth: &[u8]) -> StoreResult<()> {
        self.ensure_open()?;
        debug!(scheme, root = %self.root.display(), "directory store ignores session auth");
        Ok(())
    }

    fn close(&mut self) -> StoreResult<()> {
        self.ensure_open()?;
        self.closed = true;
        Ok(())
    }
}
