//! Node path helpers shared by the decoder, filters and materializer.
//!
//! Node paths are absolute, `/`-separated strings. The namespace root is `/`;
//! every other path has no trailing slash, no empty segments and no `.` or
//! `..` segments.

use crate::core::errors::{Result, ZnrError};

/// Path of the namespace root, which always exists.
pub const ROOT: &str = "/";

/// Parent of a node path. The parent of a top-level node (and of `/`) is `/`.
pub fn parent_path(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) if idx > 0 => &path[..idx],
        _ => ROOT,
    }
}

/// Last segment of a node path (empty for `/`).
pub fn node_name(path: &str) -> &str {
    path.rfind('/').map_or(path, |idx| &path[idx + 1..])
}

/// Whether `ancestor` lies strictly above `path` in the tree.
///
/// The prefix must end at a segment boundary: `/a` is an ancestor of `/a/b`
/// but not of `/ab`.
pub fn is_strict_ancestor(ancestor: &str, path: &str) -> bool {
    if ancestor == ROOT {
        return path != ROOT && path.starts_with('/');
    }
    path.len() > ancestor.len()
        && path.starts_with(ancestor)
        && path.as_bytes()[ancestor.len()] == b'/'
}

/// Whether `path` is `root` itself or lies below it.
pub fn is_within_root(root: &str, path: &str) -> bool {
    path == root || is_strict_ancestor(root, path)
}

/// Check that a path is a well-formed absolute node path.
pub fn validate_node_path(path: &str) -> Result<()> {
    if path == ROOT {
        return Ok(());
    }
    if !path.starts_with('/') {
        return Err(ZnrError::malformed(
            path,
            "node path must be absolute (start with '/')",
        ));
    }
    if path.ends_with('/') {
        return Err(ZnrError::malformed(
            path,
            "node path must not end with '/'",
        ));
    }
    if path.contains('\0') {
        return Err(ZnrError::malformed(path, "node path contains a NUL byte"));
    }
    for segment in path[1..].split('/') {
        match segment {
            "" => return Err(ZnrError::malformed(path, "node path has an empty segment")),
            "." | ".." => {
                return Err(ZnrError::malformed(
                    path,
                    "node path has a relative segment ('.' or '..')",
                ));
            }
            _ => {}
        }
    }
    Ok(())
}

/// Normalize a configured root path: trims trailing slashes, keeps `/` as is.
pub fn normalize_root(root: &str) -> String {
    let trimmed = root.trim_end_matches('/');
    if trimmed.is_empty() {
        ROOT.to_string()
    } else {
        trimmed.to_string()
    }
}
