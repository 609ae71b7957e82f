//! Distributed filesystem backend.
//!
//! [`DistributedBackend`] adapts a remote filesystem client to the
//! [`Backend`] contract. The client is injected by the caller; how it is
//! configured and connected (cluster URI, credentials, pooling) is the
//! embedding application's business.
//!
//! Remote uploads land under a temporary name carrying a partial-write
//! suffix (`_COPYING_` by default) until complete. Those objects are hidden
//! from listings.

use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::backend::{Backend, BoxedReader, DirHandle, FileHandle, Handle, ObjectKind};
use crate::config::DistributedConfig;
use crate::error::{BackendError, BackendResult};
use crate::path;

/// Status of one remote object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStatus {
    /// Client-side path of the object.
    pub path: String,
    pub is_dir: bool,
    pub modification_time: SystemTime,
}

impl FileStatus {
    /// Last path segment.
    pub fn name(&self) -> &str {
        path::file_name(&self.path).unwrap_or(&self.path)
    }
}

/// Operations the distributed backend needs from a remote filesystem client.
///
/// Shaped after the usual cluster filesystem client APIs: status lookups,
/// listing, streaming reads, create/mkdirs and a rename that reports refusal
/// with `false` rather than an error.
#[async_trait]
pub trait DfsClient: Send + Sync {
    /// Status of `path`; [`BackendError::NotFound`] if absent.
    async fn status(&self, path: &str) -> BackendResult<FileStatus>;

    /// Status of every direct child of the directory at `path`.
    async fn list_status(&self, path: &str) -> BackendResult<Vec<FileStatus>>;

    /// Open `path` for reading.
    async fn open(&self, path: &str) -> BackendResult<BoxedReader>;

    /// Create an empty file (and missing parents). False if it already existed.
    async fn create_new_file(&self, path: &str) -> BackendResult<bool>;

    /// Create a directory and its parents. True if it exists afterwards.
    async fn mkdirs(&self, path: &str) -> BackendResult<bool>;

    /// Rename `from` to `to`. False if the client refused.
    async fn rename(&self, from: &str, to: &str) -> BackendResult<bool>;

    async fn exists(&self, path: &str) -> BackendResult<bool> {
        match self.status(path).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Shut the client down.
    async fn close(&self) -> BackendResult<()>;
}

/// [`Backend`] over a shared [`DfsClient`].
pub struct DistributedBackend {
    client: Arc<dyn DfsClient>,
    uri: String,
    partial_write_suffix: String,
}

impl std::fmt::Debug for DistributedBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistributedBackend")
            .field("uri", &self.uri)
            .field("partial_write_suffix", &self.partial_write_suffix)
            .finish()
    }
}

impl DistributedBackend {
    /// Wrap a client using the default configuration.
    pub fn new(client: Arc<dyn DfsClient>) -> Self {
        Self::with_config(client, &DistributedConfig::default())
    }

    pub fn with_config(client: Arc<dyn DfsClient>, config: &DistributedConfig) -> Self {
        Self {
            client,
            uri: config.uri.clone(),
            partial_write_suffix: config.partial_write_suffix.clone(),
        }
    }

    /// Cluster URI, for diagnostics.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn partial_write_suffix(&self) -> &str {
        &self.partial_write_suffix
    }

    fn is_partial(&self, name: &str) -> bool {
        !self.partial_write_suffix.is_empty() && name.ends_with(&self.partial_write_suffix)
    }

    /// Fail-open status probe used by classification.
    async fn probe(&self, path: &str, kind: ObjectKind) -> Option<FileStatus> {
        match self.client.status(path).await {
            Ok(status) => Some(status),
            Err(e) if e.is_not_found() => {
                debug!(uri = %self.uri, path = %path, "no such {}", kind);
                None
            }
            Err(e) => {
                warn!(
                    uri = %self.uri,
                    path = %path,
                    error = %e,
                    "could not get status while classifying as {} (does it exist?)",
                    kind
                );
                None
            }
        }
    }
}

#[async_trait]
impl Backend for DistributedBackend {
    fn name(&self) -> &str {
        "distributed"
    }

    async fn is_file(&self, path: &str) -> bool {
        self.probe(path, ObjectKind::File)
            .await
            .is_some_and(|s| !s.is_dir)
    }

    async fn is_dir(&self, path: &str) -> bool {
        self.probe(path, ObjectKind::Directory)
            .await
            .is_some_and(|s| s.is_dir)
    }

    async fn open_file_handle(&self, path: &str, create: bool) -> BackendResult<FileHandle> {
        if create && !self.client.exists(path).await? {
            self.client.create_new_file(path).await?;
            debug!(uri = %self.uri, path = %path, "created empty file");
        }

        let status = self.client.status(path).await?;
        if status.is_dir {
            return Err(BackendError::kind_mismatch(path, ObjectKind::File));
        }
        Ok(FileHandle::new(path))
    }

    async fn open_dir_handle(&self, path: &str, create: bool) -> BackendResult<DirHandle> {
        if create && !self.client.exists(path).await? {
            if !self.client.mkdirs(path).await? {
                return Err(BackendError::refused(format!("mkdirs {}", path)));
            }
            debug!(uri = %self.uri, path = %path, "created directory");
        }

        let status = self.client.status(path).await?;
        if !status.is_dir {
            return Err(BackendError::kind_mismatch(path, ObjectKind::Directory));
        }
        Ok(DirHandle::new(path))
    }

    async fn modification_time(&self, handle: &dyn Handle) -> BackendResult<SystemTime> {
        // Always re-query: a status captured at open time never changes.
        let status = self.client.status(handle.path()).await?;
        Ok(status.modification_time)
    }

    async fn open_stream(&self, handle: &FileHandle) -> BackendResult<BoxedReader> {
        self.client.open(handle.path()).await
    }

    async fn list_children(&self, handle: &DirHandle) -> BackendResult<Vec<String>> {
        let statuses = self.client.list_status(handle.path()).await?;
        Ok(statuses
            .iter()
            .filter(|s| !self.is_partial(s.name()))
            .map(|s| path::join(handle.path(), s.name()))
            .collect())
    }

    async fn move_object(&self, current: &str, new: &str, create: bool) -> BackendResult<String> {
        let new_is_dir = !path::has_trailing_separator(new) && self.is_dir(new).await;
        let target = path::resolve_move_target(current, new, new_is_dir)?;

        if create {
            if let Some(parent) = &target.parent {
                if !self.client.mkdirs(parent).await? {
                    return Err(BackendError::refused(format!("mkdirs {}", parent)));
                }
            }
        }

        if !self.client.rename(current, &target.destination).await? {
            return Err(BackendError::refused(format!(
                "rename {} -> {}",
                current, target.destination
            )));
        }
        Ok(target.destination)
    }

    async fn close(&self) -> BackendResult<()> {
        self.client.close().await
    }
}
