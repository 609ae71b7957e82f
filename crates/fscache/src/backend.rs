//! Backend contract.
//!
//! Every storage adapter (local disk, distributed filesystem, test doubles)
//! implements [`Backend`]. The registry only ever sees `dyn Backend`; it
//! never inspects a concrete adapter.

use std::fmt;
use std::time::SystemTime;

use async_trait::async_trait;
use tokio::io::AsyncRead;

use crate::error::BackendResult;

/// Reader returned by [`Backend::open_stream`].
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// The two kinds of object the cache tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    /// Regular file.
    File,
    /// Directory.
    Directory,
}

impl ObjectKind {
    /// Returns true if this is a regular file.
    pub fn is_file(&self) -> bool {
        matches!(self, ObjectKind::File)
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, ObjectKind::Directory)
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectKind::File => f.write_str("file"),
            ObjectKind::Directory => f.write_str("directory"),
        }
    }
}

/// Anything a backend can report a modification time for.
pub trait Handle: Send + Sync {
    /// Caller-space path this handle was opened for.
    fn path(&self) -> &str;

    fn kind(&self) -> ObjectKind;
}

/// Validated reference to a file on a backend.
///
/// Only produced by [`Backend::open_file_handle`] implementations, after
/// they checked the path is not a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHandle {
    path: String,
}

impl FileHandle {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

impl Handle for FileHandle {
    fn path(&self) -> &str {
        &self.path
    }

    fn kind(&self) -> ObjectKind {
        ObjectKind::File
    }
}

/// Validated reference to a directory on a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirHandle {
    path: String,
}

impl DirHandle {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

impl Handle for DirHandle {
    fn path(&self) -> &str {
        &self.path
    }

    fn kind(&self) -> ObjectKind {
        ObjectKind::Directory
    }
}

/// Capability set a filesystem adapter must provide.
///
/// Paths are caller-space strings (see [`crate::path`]). Classification is
/// fail-open: a missing or unreadable path is simply neither a file nor a
/// directory, and the adapter logs why. Every other operation returns a
/// typed error; asking for a handle of the wrong kind is reported as
/// [`BackendError::KindMismatch`](crate::BackendError::KindMismatch).
#[async_trait]
pub trait Backend: Send + Sync {
    /// Short name used in log records ("local", "distributed", ...).
    fn name(&self) -> &str;

    // ========================================================================
    // Classification
    // ========================================================================

    /// True if `path` currently exists and is a regular file.
    async fn is_file(&self, path: &str) -> bool;

    /// True if `path` currently exists and is a directory.
    async fn is_dir(&self, path: &str) -> bool;

    /// Classify `path`, or `None` if it is neither a file nor a directory.
    async fn classify(&self, path: &str) -> Option<ObjectKind> {
        if self.is_file(path).await {
            Some(ObjectKind::File)
        } else if self.is_dir(path).await {
            Some(ObjectKind::Directory)
        } else {
            None
        }
    }

    // ========================================================================
    // Handles
    // ========================================================================

    /// Validate `path` as a file, creating an empty one (and its parents)
    /// first when `create` is set and the path is absent.
    async fn open_file_handle(&self, path: &str, create: bool) -> BackendResult<FileHandle>;

    /// Validate `path` as a directory, creating it (and its parents) first
    /// when `create` is set and the path is absent.
    async fn open_dir_handle(&self, path: &str, create: bool) -> BackendResult<DirHandle>;

    /// Current modification time of the object behind `handle`.
    ///
    /// Must be cheap and side-effect free; the registry calls it on every
    /// staleness check.
    async fn modification_time(&self, handle: &dyn Handle) -> BackendResult<SystemTime>;

    /// Open a fresh read stream over the file.
    async fn open_stream(&self, handle: &FileHandle) -> BackendResult<BoxedReader>;

    /// Caller-space paths of the direct children of the directory.
    ///
    /// Objects that are still being written (partial uploads) must not be
    /// listed.
    async fn list_children(&self, handle: &DirHandle) -> BackendResult<Vec<String>>;

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Move `current` according to [`crate::path::resolve_move_target`] and
    /// return the path it ended up at.
    ///
    /// With `create` set, the destination directory is created if missing.
    async fn move_object(&self, current: &str, new: &str, create: bool) -> BackendResult<String>;

    /// Release backend-wide resources (client connections).
    async fn close(&self) -> BackendResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_kind() {
        assert!(ObjectKind::File.is_file());
        assert!(!ObjectKind::File.is_dir());
        assert!(ObjectKind::Directory.is_dir());
        assert_eq!(ObjectKind::Directory.to_string(), "directory");
    }

    #[test]
    fn test_handles() {
        let file = FileHandle::new("a/b.txt");
        assert_eq!(file.path(), "a/b.txt");
        assert_eq!(file.kind(), ObjectKind::File);

        let dir = DirHandle::new("a");
        assert_eq!(dir.path(), "a");
        assert_eq!(dir.kind(), ObjectKind::Directory);
    }
}
