//! Applying a single kept record to the store.

use tracing::{debug, info, warn};

use crate::core::errors::{Result, ZnrError};
use crate::core::paths::parent_path;
use crate::restore::materializer::{PathMaterializer, PathOrigin};
use crate::snapshot::record::NodeRecord;
use crate::store::Store;
use crate::store::acl::{Acl, translate_acls};

/// What happened to a record that reached the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeOutcome {
    /// Node did not exist and was created.
    Created,
    /// Node existed and was replaced (overwrite enabled).
    Overwritten,
    /// Node existed and was left alone (overwrite disabled).
    ConflictSkipped,
    /// Node was a placeholder this run created for descendants; its data and
    /// ACL were filled in from the record.
    PlaceholderFilled,
}

impl NodeOutcome {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Overwritten => "overwritten",
            Self::ConflictSkipped => "conflict_skipped",
            Self::PlaceholderFilled => "placeholder_filled",
        }
    }
}

/// Create-or-overwrite policy for single records.
#[derive(Debug, Clone, Copy)]
pub struct NodeRestorer {
    overwrite_existing: bool,
    enforce_acls: bool,
}

impl NodeRestorer {
    pub const fn new(overwrite_existing: bool, no_acls: bool) -> Self {
        Self {
            overwrite_existing,
            enforce_acls: !no_acls,
        }
    }

    /// Restore `record`: materialize its parent, then create it, resolving a
    /// collision with an existing node according to the overwrite policy.
    pub fn restore<S: Store + ?Sized>(
        &self,
        store: &mut S,
        materializer: &mut PathMaterializer,
        record: &NodeRecord,
    ) -> Result<NodeOutcome> {
        let path = record.path.as_str();
        materializer.ensure(store, parent_path(path))?;

        let acls = if self.enforce_acls {
            translate_acls(&record.acls)
        } else {
            Acl::open_unsafe()
        };
        let data = record.data.as_deref();

        let outcome = match store.create(path, data, &acls) {
            Ok(()) => {
                info!(path, bytes = record.data_len(), "created node");
                NodeOutcome::Created
            }
            Err(err) if err.is_node_exists() => {
                if materializer.origin(path) == Some(PathOrigin::Placeholder) {
                    debug!(path, "filling placeholder created earlier in this run");
                    self.replace(store, path, data, &acls)?;
                    NodeOutcome::PlaceholderFilled
                } else if self.overwrite_existing {
                    info!(path, bytes = record.data_len(), "overwriting existing node");
                    self.replace(store, path, data, &acls)?;
                    NodeOutcome::Overwritten
                } else {
                    warn!(path, "node already exists");
                    NodeOutcome::ConflictSkipped
                }
            }
            Err(err) => return Err(ZnrError::store("create", path, err)),
        };

        let origin = match outcome {
            NodeOutcome::ConflictSkipped => PathOrigin::Existing,
            _ => PathOrigin::Restored,
        };
        materializer.mark(path, origin);
        Ok(outcome)
    }

    /// Unconditional replace: ACL first (unless disabled), then data.
    fn replace<S: Store + ?Sized>(
        &self,
        store: &mut S,
        path: &str,
        data: Option<&[u8]>,
        acls: &[Acl],
    ) -> Result<()> {
        if self.enforce_acls {
            store
                .set_acl(path, acls)
                .map_err(|err| ZnrError::store("set_acl", path, err))?;
        }
        store
            .set_data(path, data)
            .map_err(|err| ZnrError::store("set_data", path, err))
    }
}
