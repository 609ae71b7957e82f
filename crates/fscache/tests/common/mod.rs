//! Shared test setup: a call-counting backend over an in-memory DFS.

#![allow(dead_code)]

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::task::{Context, Poll};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use tokio::io::{AsyncRead, ReadBuf};

use fscache::backends::{DistributedBackend, MemoryDfs};
use fscache::{
    Backend, BackendError, BackendResult, BoxedReader, DirHandle, FileHandle, Handle, ObjectKind,
    Registry, RegistryConfig,
};

// ============================================================================
// Call counters
// ============================================================================

/// Per-operation call counts, shared between a test and its backend.
#[derive(Debug, Default)]
pub struct Counts {
    pub is_file: AtomicUsize,
    pub is_dir: AtomicUsize,
    pub open_file_handle: AtomicUsize,
    pub open_dir_handle: AtomicUsize,
    pub modification_time: AtomicUsize,
    pub open_stream: AtomicUsize,
    pub list_children: AtomicUsize,
    pub move_object: AtomicUsize,
    pub close: AtomicUsize,
    /// Readers released, i.e. streams actually closed.
    pub readers_dropped: Arc<AtomicUsize>,
}

fn get(counter: &AtomicUsize) -> usize {
    counter.load(Ordering::SeqCst)
}

impl Counts {
    pub fn classifications(&self) -> usize {
        get(&self.is_file) + get(&self.is_dir)
    }

    pub fn handles_opened(&self) -> usize {
        get(&self.open_file_handle) + get(&self.open_dir_handle)
    }

    pub fn streams_opened(&self) -> usize {
        get(&self.open_stream)
    }

    pub fn readers_dropped(&self) -> usize {
        get(&self.readers_dropped)
    }

    pub fn closes(&self) -> usize {
        get(&self.close)
    }

    /// Every backend call of any kind.
    pub fn total(&self) -> usize {
        self.classifications()
            + self.handles_opened()
            + get(&self.modification_time)
            + get(&self.open_stream)
            + get(&self.list_children)
            + get(&self.move_object)
            + get(&self.close)
    }
}

// ============================================================================
// TrackedReader
// ============================================================================

/// Reader that counts its own drop.
pub struct TrackedReader {
    inner: BoxedReader,
    dropped: Arc<AtomicUsize>,
}

impl AsyncRead for TrackedReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl Drop for TrackedReader {
    fn drop(&mut self) {
        self.dropped.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// CountingBackend
// ============================================================================

/// Backend wrapper recording every call.
///
/// Can also be scripted to fail the next handle construction with a kind
/// mismatch, to stall classification, and to answer neither kind while
/// blinded.
pub struct CountingBackend {
    inner: Arc<dyn Backend>,
    counts: Arc<Counts>,
    mismatch_next: AtomicBool,
    blind: AtomicBool,
    classify_delay: Option<Duration>,
}

impl CountingBackend {
    pub fn new(inner: Arc<dyn Backend>) -> Self {
        Self {
            inner,
            counts: Arc::new(Counts::default()),
            mismatch_next: AtomicBool::new(false),
            blind: AtomicBool::new(false),
            classify_delay: None,
        }
    }

    pub fn with_classify_delay(mut self, delay: Duration) -> Self {
        self.classify_delay = Some(delay);
        self
    }

    pub fn counts(&self) -> Arc<Counts> {
        Arc::clone(&self.counts)
    }

    /// Make the next `open_*_handle` call report a kind mismatch.
    pub fn mismatch_next(&self) {
        self.mismatch_next.store(true, Ordering::SeqCst);
    }

    /// While set, `is_file` and `is_dir` answer `false` without asking the
    /// inner backend, as a classification that failed open would.
    pub fn set_blind(&self, blind: bool) {
        self.blind.store(blind, Ordering::SeqCst);
    }

    fn blinded(&self) -> bool {
        self.blind.load(Ordering::SeqCst)
    }

    async fn stall(&self) {
        if let Some(delay) = self.classify_delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn scripted_mismatch(&self, path: &str, expected: ObjectKind) -> BackendResult<()> {
        if self.mismatch_next.swap(false, Ordering::SeqCst) {
            Err(BackendError::kind_mismatch(path, expected))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Backend for CountingBackend {
    fn name(&self) -> &str {
        "counting"
    }

    async fn is_file(&self, path: &str) -> bool {
        self.counts.is_file.fetch_add(1, Ordering::SeqCst);
        self.stall().await;
        !self.blinded() && self.inner.is_file(path).await
    }

    async fn is_dir(&self, path: &str) -> bool {
        self.counts.is_dir.fetch_add(1, Ordering::SeqCst);
        self.stall().await;
        !self.blinded() && self.inner.is_dir(path).await
    }

    async fn open_file_handle(&self, path: &str, create: bool) -> BackendResult<FileHandle> {
        self.counts.open_file_handle.fetch_add(1, Ordering::SeqCst);
        self.scripted_mismatch(path, ObjectKind::File)?;
        self.inner.open_file_handle(path, create).await
    }

    async fn open_dir_handle(&self, path: &str, create: bool) -> BackendResult<DirHandle> {
        self.counts.open_dir_handle.fetch_add(1, Ordering::SeqCst);
        self.scripted_mismatch(path, ObjectKind::Directory)?;
        self.inner.open_dir_handle(path, create).await
    }

    async fn modification_time(&self, handle: &dyn Handle) -> BackendResult<SystemTime> {
        self.counts.modification_time.fetch_add(1, Ordering::SeqCst);
        self.inner.modification_time(handle).await
    }

    async fn open_stream(&self, handle: &FileHandle) -> BackendResult<BoxedReader> {
        self.counts.open_stream.fetch_add(1, Ordering::SeqCst);
        let inner = self.inner.open_stream(handle).await?;
        Ok(Box::new(TrackedReader {
            inner,
            dropped: Arc::clone(&self.counts.readers_dropped),
        }))
    }

    async fn list_children(&self, handle: &DirHandle) -> BackendResult<Vec<String>> {
        self.counts.list_children.fetch_add(1, Ordering::SeqCst);
        self.inner.list_children(handle).await
    }

    async fn move_object(&self, current: &str, new: &str, create: bool) -> BackendResult<String> {
        self.counts.move_object.fetch_add(1, Ordering::SeqCst);
        self.inner.move_object(current, new, create).await
    }

    async fn close(&self) -> BackendResult<()> {
        self.counts.close.fetch_add(1, Ordering::SeqCst);
        self.inner.close().await
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub registry: Registry,
    pub dfs: Arc<MemoryDfs>,
    pub counts: Arc<Counts>,
    pub backend: Arc<CountingBackend>,
}

/// Registry over a counting backend over a fresh [`MemoryDfs`].
pub fn harness() -> Harness {
    harness_with(&RegistryConfig::default(), None)
}

pub fn harness_with(config: &RegistryConfig, classify_delay: Option<Duration>) -> Harness {
    let dfs = Arc::new(MemoryDfs::new());
    let mut counting = CountingBackend::new(Arc::new(DistributedBackend::new(dfs.clone())));
    if let Some(delay) = classify_delay {
        counting = counting.with_classify_delay(delay);
    }
    let counts = counting.counts();
    let backend = Arc::new(counting);
    let registry = Registry::from_shared(backend.clone(), config);

    Harness {
        registry,
        dfs,
        counts,
        backend,
    }
}

pub async fn read_all(stream: &fscache::FileStream) -> Vec<u8> {
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await.unwrap();
    buf
}
