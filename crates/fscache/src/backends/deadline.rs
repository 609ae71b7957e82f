//! Per-call deadlines for any backend.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use tracing::warn;

use crate::backend::{Backend, BoxedReader, DirHandle, FileHandle, Handle};
use crate::error::{BackendError, BackendResult};

/// Wraps a backend so that no delegated call can hang its caller.
///
/// Calls that overrun become [`BackendError::Timeout`]. Classification
/// stays fail-open: an overrunning `is_file`/`is_dir` logs a warning and
/// answers `false`.
///
/// A timeout only abandons the caller's wait. Work the inner backend
/// already handed off (a blocking-pool rename, a remote request) may still
/// complete afterwards.
pub struct DeadlineBackend {
    inner: Arc<dyn Backend>,
    limit: Duration,
}

impl std::fmt::Debug for DeadlineBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeadlineBackend")
            .field("inner", &self.inner.name())
            .field("limit", &self.limit)
            .finish()
    }
}

impl DeadlineBackend {
    pub fn new(inner: Arc<dyn Backend>, limit: Duration) -> Self {
        Self { inner, limit }
    }

    pub fn limit(&self) -> Duration {
        self.limit
    }

    pub fn inner(&self) -> &Arc<dyn Backend> {
        &self.inner
    }

    async fn bounded<T>(
        &self,
        op: &'static str,
        fut: impl Future<Output = BackendResult<T>>,
    ) -> BackendResult<T> {
        match tokio::time::timeout(self.limit, fut).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::Timeout {
                op,
                after: self.limit,
            }),
        }
    }

    async fn bounded_probe(
        &self,
        op: &'static str,
        path: &str,
        fut: impl Future<Output = bool>,
    ) -> bool {
        match tokio::time::timeout(self.limit, fut).await {
            Ok(answer) => answer,
            Err(_) => {
                warn!(
                    backend = %self.inner.name(),
                    path = %path,
                    limit = ?self.limit,
                    "{} timed out; treating as absent",
                    op
                );
                false
            }
        }
    }
}

#[async_trait]
impl Backend for DeadlineBackend {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn is_file(&self, path: &str) -> bool {
        self.bounded_probe("is_file", path, self.inner.is_file(path))
            .await
    }

    async fn is_dir(&self, path: &str) -> bool {
        self.bounded_probe("is_dir", path, self.inner.is_dir(path))
            .await
    }

    async fn open_file_handle(&self, path: &str, create: bool) -> BackendResult<FileHandle> {
        self.bounded("open_file_handle", self.inner.open_file_handle(path, create))
            .await
    }

    async fn open_dir_handle(&self, path: &str, create: bool) -> BackendResult<DirHandle> {
        self.bounded("open_dir_handle", self.inner.open_dir_handle(path, create))
            .await
    }

    async fn modification_time(&self, handle: &dyn Handle) -> BackendResult<SystemTime> {
        self.bounded("modification_time", self.inner.modification_time(handle))
            .await
    }

    async fn open_stream(&self, handle: &FileHandle) -> BackendResult<BoxedReader> {
        self.bounded("open_stream", self.inner.open_stream(handle))
            .await
    }

    async fn list_children(&self, handle: &DirHandle) -> BackendResult<Vec<String>> {
        self.bounded("list_children", self.inner.list_children(handle))
            .await
    }

    /// A move that times out may still have happened: the registry then
    /// reports failure with the source unregistered while the object sits
    /// at its destination. Re-register whichever path the caller expects.
    async fn move_object(&self, current: &str, new: &str, create: bool) -> BackendResult<String> {
        self.bounded("move_object", self.inner.move_object(current, new, create))
            .await
    }

    async fn close(&self) -> BackendResult<()> {
        self.bounded("close", self.inner.close()).await
    }
}
