//! Caller-space path helpers.
//!
//! Registry paths are plain strings with `/` separators. These helpers never
//! touch a filesystem; backends decide what a path means on their storage.

use crate::backend::ObjectKind;
use crate::error::{BackendError, BackendResult};

/// Path separator used in caller-space paths.
pub const SEPARATOR: char = '/';

/// True if the path is empty or only whitespace.
pub fn is_blank(path: &str) -> bool {
    path.trim().is_empty()
}

/// True if the path ends with a separator (`c/`, `/`).
pub fn has_trailing_separator(path: &str) -> bool {
    path.ends_with(SEPARATOR)
}

/// Canonical form used as the registry key.
///
/// Collapses repeated separators, drops `.` segments and any trailing
/// separator. `..` is kept verbatim.
pub fn normalize(path: &str) -> String {
    let absolute = path.starts_with(SEPARATOR);
    let segments: Vec<&str> = path
        .split(SEPARATOR)
        .filter(|s| !s.is_empty() && *s != ".")
        .collect();

    match (absolute, segments.is_empty()) {
        (true, true) => "/".to_string(),
        (false, true) => ".".to_string(),
        (true, false) => format!("/{}", segments.join("/")),
        (false, false) => segments.join("/"),
    }
}

/// Last segment of the path, ignoring a trailing separator.
pub fn file_name(path: &str) -> Option<&str> {
    path.trim_end_matches(SEPARATOR)
        .rsplit(SEPARATOR)
        .next()
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
}

/// Parent of the normalized path; `None` for a bare name or the root.
pub fn parent(path: &str) -> Option<String> {
    let normalized = normalize(path);
    match normalized.rfind(SEPARATOR) {
        Some(0) if normalized.len() > 1 => Some("/".to_string()),
        Some(0) => None,
        Some(i) => Some(normalized[..i].to_string()),
        None => None,
    }
}

/// Join a child name onto a directory path.
pub fn join(dir: &str, name: &str) -> String {
    let name = name.trim_start_matches(SEPARATOR);
    if dir.is_empty() || dir == "." {
        name.to_string()
    } else if dir.ends_with(SEPARATOR) {
        format!("{}{}", dir, name)
    } else {
        format!("{}{}{}", dir, SEPARATOR, name)
    }
}

/// Kind of object to create for a missing path: a trailing separator asks
/// for a directory, anything else for a file.
pub fn requested_kind(raw: &str) -> ObjectKind {
    if has_trailing_separator(raw) {
        ObjectKind::Directory
    } else {
        ObjectKind::File
    }
}

/// Where a move ends up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveTarget {
    /// Final path of the moved object.
    pub destination: String,
    /// Directory that must exist before the rename. Created when the move
    /// is allowed to create missing paths.
    pub parent: Option<String>,
}

/// Decide the destination of moving `current` to `new`.
///
/// Rules, in order:
/// 1. `new` ends with a separator: move into that directory.
/// 2. `new` is an existing directory: move into it.
/// 3. `new` is a bare name: rename in place, next to `current`.
/// 4. otherwise `new` is the full destination path.
pub fn resolve_move_target(
    current: &str,
    new: &str,
    new_is_directory: bool,
) -> BackendResult<MoveTarget> {
    let name = file_name(current).ok_or_else(|| BackendError::invalid_path(current))?;

    if has_trailing_separator(new) || new_is_directory {
        let dir = normalize(new);
        return Ok(MoveTarget {
            destination: join(&dir, name),
            parent: Some(dir),
        });
    }

    let new = normalize(new);
    let destination = if new.contains(SEPARATOR) {
        new
    } else {
        match parent(current) {
            Some(dir) => join(&dir, &new),
            None => new,
        }
    };

    Ok(MoveTarget {
        parent: parent(&destination),
        destination,
    })
}
