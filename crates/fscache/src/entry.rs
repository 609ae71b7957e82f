//! Cached entry types.
//!
//! An entry remembers the modification time the backend reported when it
//! was last refreshed. Staleness is a cheap comparison against a fresh
//! probe. Entries never own the backend; the registry lends it per call.

use std::sync::Arc;
use std::time::SystemTime;

use tracing::{debug, warn};

use crate::backend::{Backend, DirHandle, FileHandle, Handle, ObjectKind};
use crate::error::BackendResult;
use crate::stream::FileStream;

/// A registered file and its (at most one) open read stream.
#[derive(Debug)]
pub struct CachedFile {
    handle: FileHandle,
    last_modified: SystemTime,
    stream: Option<Arc<FileStream>>,
}

impl CachedFile {
    /// Build an entry from a validated handle. Fresh by construction.
    pub async fn register(backend: &dyn Backend, handle: FileHandle) -> BackendResult<Self> {
        let last_modified = backend.modification_time(&handle).await?;
        Ok(Self {
            handle,
            last_modified,
            stream: None,
        })
    }

    pub fn path(&self) -> &str {
        self.handle.path()
    }

    /// Modification time recorded at the last refresh.
    pub fn last_modified(&self) -> SystemTime {
        self.last_modified
    }

    /// The currently open stream, if any.
    pub fn stream(&self) -> Option<&Arc<FileStream>> {
        self.stream.as_ref()
    }

    /// True if the backend's modification time moved since the last refresh.
    pub async fn is_stale(&self, backend: &dyn Backend) -> BackendResult<bool> {
        let current = backend.modification_time(&self.handle).await?;
        Ok(current != self.last_modified)
    }

    /// Record the backend's current modification time.
    pub async fn mark_fresh(&mut self, backend: &dyn Backend) -> BackendResult<()> {
        self.last_modified = backend.modification_time(&self.handle).await?;
        Ok(())
    }

    /// Open the read stream.
    ///
    /// If one is already open it is returned unchanged; that is a caller
    /// mistake (should have used [`cached_stream`](Self::cached_stream)) and
    /// is logged.
    pub async fn open(&mut self, backend: &dyn Backend) -> BackendResult<Arc<FileStream>> {
        if let Some(stream) = self.stream.as_ref().filter(|s| !s.is_closed()) {
            warn!(path = %self.path(), "file already open; returning the cached stream");
            return Ok(Arc::clone(stream));
        }

        let reader = backend.open_stream(&self.handle).await?;
        let stream = Arc::new(FileStream::new(self.path(), reader));
        self.stream = Some(Arc::clone(&stream));
        Ok(stream)
    }

    /// The open stream, opening one if none is.
    pub async fn cached_stream(&mut self, backend: &dyn Backend) -> BackendResult<Arc<FileStream>> {
        if let Some(stream) = self.stream.as_ref().filter(|s| !s.is_closed()) {
            return Ok(Arc::clone(stream));
        }

        warn!(path = %self.path(), "no cached stream open; opening one");
        self.open(backend).await
    }

    /// Close the open stream. Returns false if nothing was open.
    pub async fn close(&mut self) -> bool {
        match self.stream.take() {
            Some(stream) => stream.close().await,
            None => {
                debug!(path = %self.path(), "no open stream to close");
                false
            }
        }
    }
}

/// A registered directory. Holds no stream; its content is a listing
/// computed on demand.
#[derive(Debug)]
pub struct CachedDirectory {
    handle: DirHandle,
    last_modified: SystemTime,
}

impl CachedDirectory {
    /// Build an entry from a validated handle. Fresh by construction.
    pub async fn register(backend: &dyn Backend, handle: DirHandle) -> BackendResult<Self> {
        let last_modified = backend.modification_time(&handle).await?;
        Ok(Self {
            handle,
            last_modified,
        })
    }

    pub fn path(&self) -> &str {
        self.handle.path()
    }

    pub fn last_modified(&self) -> SystemTime {
        self.last_modified
    }

    pub async fn is_stale(&self, backend: &dyn Backend) -> BackendResult<bool> {
        let current = backend.modification_time(&self.handle).await?;
        Ok(current != self.last_modified)
    }

    pub async fn mark_fresh(&mut self, backend: &dyn Backend) -> BackendResult<()> {
        self.last_modified = backend.modification_time(&self.handle).await?;
        Ok(())
    }

    /// Direct children, always recomputed from the backend.
    pub async fn list(&self, backend: &dyn Backend) -> BackendResult<Vec<String>> {
        backend.list_children(&self.handle).await
    }
}

/// What the registry stores per path. One map, one variant per path.
#[derive(Debug)]
pub enum CachedEntry {
    File(CachedFile),
    Directory(CachedDirectory),
}

impl CachedEntry {
    /// Validate (and optionally create) `path` as `kind` and build its entry.
    pub async fn open(
        backend: &dyn Backend,
        kind: ObjectKind,
        path: &str,
        create: bool,
    ) -> BackendResult<Self> {
        match kind {
            ObjectKind::File => {
                let handle = backend.open_file_handle(path, create).await?;
                Ok(Self::File(CachedFile::register(backend, handle).await?))
            }
            ObjectKind::Directory => {
                let handle = backend.open_dir_handle(path, create).await?;
                Ok(Self::Directory(CachedDirectory::register(backend, handle).await?))
            }
        }
    }

    pub fn kind(&self) -> ObjectKind {
        match self {
            Self::File(_) => ObjectKind::File,
            Self::Directory(_) => ObjectKind::Directory,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            Self::File(f) => f.path(),
            Self::Directory(d) => d.path(),
        }
    }

    pub async fn is_stale(&self, backend: &dyn Backend) -> BackendResult<bool> {
        match self {
            Self::File(f) => f.is_stale(backend).await,
            Self::Directory(d) => d.is_stale(backend).await,
        }
    }

    pub async fn mark_fresh(&mut self, backend: &dyn Backend) -> BackendResult<()> {
        match self {
            Self::File(f) => f.mark_fresh(backend).await,
            Self::Directory(d) => d.mark_fresh(backend).await,
        }
    }

    /// Close any open stream. Directories have nothing to close.
    pub async fn close(&mut self) -> bool {
        match self {
            Self::File(f) => f.close().await,
            Self::Directory(_) => false,
        }
    }
}
