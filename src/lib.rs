#![forbid(unsafe_code)]

//! znode restore (znr): streams a JSON snapshot of a hierarchical node tree
//! back into a coordination store.
//!
//! The snapshot is one JSON object keyed by absolute node path, each value
//! holding `ephemeralOwner`, base64 `data` and `acls`. Records are decoded one
//! at a time and applied in stream order, so memory stays bounded by tree
//! depth no matter how large the snapshot is.
//!
//! Pipeline:
//! 1. **Decoder** ([`snapshot::decoder`]) yields one [`NodeRecord`](snapshot::record::NodeRecord) at a time
//! 2. **Filter** ([`restore::filter`]) drops ephemeral, out-of-root and excluded nodes
//! 3. **Materializer** ([`restore::materializer`]) makes sure every ancestor exists
//! 4. **Restorer** ([`restore::restorer`]) creates or overwrites the node itself
//!
//! # Library usage
//!
//! ```rust,no_run
//! use znode_restore::prelude::*;
//!
//! # fn main() -> Result<()> {
//! let config = Config::default();
//! let mut store = MemoryStore::new();
//! let file = std::fs::File::open("backup.json").map_err(|e| ZnrError::io("backup.json", e))?;
//! let snapshot = std::io::BufReader::new(file);
//! let stats = RestoreEngine::new(&config.restore)?.run(snapshot, &mut store, None)?;
//! println!("created {} nodes", stats.created);
//! # Ok(())
//! # }
//! ```

pub mod prelude;

pub mod core;
pub mod logger;
pub mod restore;
pub mod snapshot;
pub mod store;
