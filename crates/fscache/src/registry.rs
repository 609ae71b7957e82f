//! The path-keyed cache.
//!
//! Every operation takes the registry lock for its whole duration, so two
//! callers missing the cache for the same path register it once, and the
//! "close old stream, mark fresh, open new stream" sequence of
//! [`Registry::open_stream`] is never observed half done.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error, warn};

use crate::backend::{Backend, ObjectKind};
use crate::backends::DeadlineBackend;
use crate::config::RegistryConfig;
use crate::entry::CachedEntry;
use crate::error::{BackendError, CacheError, CacheResult};
use crate::path;
use crate::stream::FileStream;

type EntryMap = HashMap<String, CachedEntry>;

/// Staleness-aware metadata cache in front of one [`Backend`].
///
/// Paths are normalized with [`path::normalize`] and used as keys. Any
/// accessor called on an unregistered path registers it first. Nothing is
/// ever evicted behind the caller's back except an entry whose path changed
/// kind on the backend.
///
/// All failures come back as [`CacheError`] and are logged where they occur.
pub struct Registry {
    backend: Arc<dyn Backend>,
    entries: Mutex<EntryMap>,
    auto_create: AtomicBool,
    destroyed: AtomicBool,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("backend", &self.backend.name())
            .field("auto_create", &self.default_auto_create())
            .field("destroyed", &self.destroyed.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl Registry {
    /// Create a registry over `backend` with default settings.
    pub fn new(backend: impl Backend + 'static) -> Self {
        Self::with_config(backend, &RegistryConfig::default())
    }

    pub fn with_config(backend: impl Backend + 'static, config: &RegistryConfig) -> Self {
        Self::from_shared(Arc::new(backend), config)
    }

    /// Create a registry over an already shared backend.
    ///
    /// When `config.call_timeout_ms` is set, every backend call is bounded
    /// by a [`DeadlineBackend`].
    pub fn from_shared(backend: Arc<dyn Backend>, config: &RegistryConfig) -> Self {
        let backend = match config.call_timeout() {
            Some(limit) => Arc::new(DeadlineBackend::new(backend, limit)) as Arc<dyn Backend>,
            None => backend,
        };

        Self {
            backend,
            entries: Mutex::new(HashMap::new()),
            auto_create: AtomicBool::new(config.auto_create),
            destroyed: AtomicBool::new(false),
        }
    }

    /// Name of the backend, as it appears in log records.
    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Default used when an operation does not say whether to create.
    pub fn set_default_auto_create(&self, flag: bool) {
        self.auto_create.store(flag, Ordering::Release);
    }

    pub fn default_auto_create(&self) -> bool {
        self.auto_create.load(Ordering::Acquire)
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Register `path` using the default auto-create flag.
    pub async fn register(&self, path: &str) -> CacheResult<String> {
        self.register_with(path, self.default_auto_create()).await
    }

    /// Register `path`, creating it first when `create` is set and it is
    /// missing. Returns the normalized path the entry is stored under.
    ///
    /// Registering an already registered path does not touch its handle.
    #[tracing::instrument(skip(self), name = "registry.register")]
    pub async fn register_with(&self, path: &str, create: bool) -> CacheResult<String> {
        let key = Self::validate("register", path)?;
        let mut entries = self.lock().await?;
        self.resolve(&mut entries, &key, path, create, false).await?;
        Ok(key)
    }

    /// A file lists as itself; a directory lists its direct children.
    ///
    /// Listings are always fetched from the backend. A stale directory is
    /// marked fresh first.
    #[tracing::instrument(skip(self), name = "registry.list")]
    pub async fn list(&self, path: &str) -> CacheResult<Vec<String>> {
        let key = Self::validate("list", path)?;
        let create = self.default_auto_create();
        let mut entries = self.lock().await?;
        let backend = &*self.backend;

        let entry = self.resolve(&mut entries, &key, path, create, true).await?;
        match entry {
            CachedEntry::File(_) => Ok(vec![key]),
            CachedEntry::Directory(dir) => {
                let stale = dir
                    .is_stale(backend)
                    .await
                    .map_err(|e| Self::probe_failed("list", &key, e))?;
                if stale {
                    dir.mark_fresh(backend)
                        .await
                        .map_err(|e| Self::probe_failed("list", &key, e))?;
                    debug!(path = %key, "directory changed; marked fresh");
                }
                dir.list(backend)
                    .await
                    .map_err(|e| Self::probe_failed("list", &key, e))
            }
        }
    }

    /// True if the backend's modification time moved since the last refresh.
    #[tracing::instrument(skip(self), name = "registry.is_stale")]
    pub async fn is_stale(&self, path: &str) -> CacheResult<bool> {
        let key = Self::validate("is_stale", path)?;
        let create = self.default_auto_create();
        let mut entries = self.lock().await?;

        let entry = self.resolve(&mut entries, &key, path, create, true).await?;
        entry
            .is_stale(&*self.backend)
            .await
            .map_err(|e| Self::probe_failed("is_stale", &key, e))
    }

    /// Read stream over the file at `path`.
    ///
    /// While the file is unchanged every call returns the same stream (check
    /// with `Arc::ptr_eq`). Once it changed, the old stream is closed and a
    /// new one is opened.
    #[tracing::instrument(skip(self), name = "registry.open_stream")]
    pub async fn open_stream(&self, path: &str) -> CacheResult<Arc<FileStream>> {
        let key = Self::validate("open_stream", path)?;
        let create = self.default_auto_create();
        let mut entries = self.lock().await?;
        let backend = &*self.backend;

        let cached_as_file = entries
            .get(&key)
            .is_some_and(|entry| entry.kind().is_file());

        let CachedEntry::File(file) = self.resolve(&mut entries, &key, path, create, true).await?
        else {
            warn!(path = %key, "not a file; cannot open a stream");
            return Err(CacheError::NotAFile(key));
        };

        if !cached_as_file {
            return file
                .open(backend)
                .await
                .map_err(|e| Self::stream_failed(&key, e));
        }

        let stale = file
            .is_stale(backend)
            .await
            .map_err(|e| Self::probe_failed("open_stream", &key, e))?;

        if !stale {
            return file
                .cached_stream(backend)
                .await
                .map_err(|e| Self::stream_failed(&key, e));
        }

        file.close().await;
        file.mark_fresh(backend)
            .await
            .map_err(|e| Self::probe_failed("open_stream", &key, e))?;
        let stream = file
            .open(backend)
            .await
            .map_err(|e| Self::stream_failed(&key, e))?;
        debug!(path = %key, "file changed; replaced cached stream");
        Ok(stream)
    }

    /// Move using the default auto-create flag.
    pub async fn move_path(&self, current: &str, new: &str) -> CacheResult<String> {
        self.move_path_with(current, new, self.default_auto_create())
            .await
    }

    /// Move `current` to `new` on the backend and register the result.
    ///
    /// `current` is unregistered before the move is attempted and stays
    /// unregistered if the move fails, even though the object may still
    /// exist at its old location.
    #[tracing::instrument(skip(self), name = "registry.move")]
    pub async fn move_path_with(&self, current: &str, new: &str, create: bool) -> CacheResult<String> {
        let from = Self::validate("move", current)?;
        if path::is_blank(new) {
            warn!(from = %from, "blank destination passed to move()");
            return Err(CacheError::InvalidPath { op: "move" });
        }
        let mut entries = self.lock().await?;

        if let Some(mut entry) = entries.remove(&from) {
            entry.close().await;
            debug!(path = %from, "unregistered before move");
        }

        let moved = match self.backend.move_object(&from, new, create).await {
            Ok(moved) => moved,
            Err(e) => {
                warn!(
                    from = %from,
                    to = %new,
                    error = %e,
                    "move failed; {} is left unregistered",
                    from
                );
                return Err(CacheError::backend(from, e));
            }
        };

        let key = path::normalize(&moved);
        self.resolve(&mut entries, &key, &moved, false, false).await?;
        debug!(from = %from, to = %key, "moved");
        Ok(key)
    }

    /// Forget `path`, closing its stream. False if it was not registered.
    #[tracing::instrument(skip(self), name = "registry.unregister")]
    pub async fn unregister(&self, path: &str) -> CacheResult<bool> {
        let key = Self::validate("unregister", path)?;
        let mut entries = self.lock().await?;

        match entries.remove(&key) {
            Some(mut entry) => {
                entry.close().await;
                debug!(path = %key, kind = %entry.kind(), "unregistered");
                Ok(true)
            }
            None => {
                warn!(path = %key, "not registered; nothing to unregister");
                Ok(false)
            }
        }
    }

    /// Close every open stream, drop every entry and shut the backend down.
    ///
    /// Safe to call more than once; later calls only log. Every other
    /// operation fails with [`CacheError::Destroyed`] afterwards.
    #[tracing::instrument(skip(self), name = "registry.destroy")]
    pub async fn destroy(&self) -> CacheResult<()> {
        let mut entries = self.entries.lock().await;
        if self.destroyed.swap(true, Ordering::AcqRel) {
            warn!("registry already destroyed");
            return Ok(());
        }

        let mut closed = 0usize;
        for (_, mut entry) in entries.drain() {
            if entry.close().await {
                closed += 1;
            }
        }
        debug!(closed, "closed cached streams");

        self.backend.close().await.map_err(|e| {
            error!(backend = %self.backend.name(), error = %e, "backend shutdown failed");
            CacheError::Shutdown(e)
        })
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    pub async fn is_registered(&self, path: &str) -> bool {
        self.entry_kind(path).await.is_some()
    }

    /// Kind `path` is cached as, without asking the backend.
    pub async fn entry_kind(&self, path: &str) -> Option<ObjectKind> {
        if path::is_blank(path) {
            return None;
        }
        let key = path::normalize(path);
        self.entries.lock().await.get(&key).map(CachedEntry::kind)
    }

    /// Every registered path, sorted.
    pub async fn registered_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.entries.lock().await.keys().cloned().collect();
        paths.sort();
        paths
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn validate(op: &'static str, path: &str) -> CacheResult<String> {
        if path::is_blank(path) {
            warn!(op, "blank path passed to {}()", op);
            return Err(CacheError::InvalidPath { op });
        }
        Ok(path::normalize(path))
    }

    async fn lock(&self) -> CacheResult<MutexGuard<'_, EntryMap>> {
        let entries = self.entries.lock().await;
        if self.destroyed.load(Ordering::Acquire) {
            warn!("registry used after destroy()");
            return Err(CacheError::Destroyed);
        }
        Ok(entries)
    }

    /// Find the entry for `key`, registering it if needed.
    ///
    /// The backend classifies the path on every call. A cached entry whose
    /// kind changed is dropped first. A cached entry the backend cannot
    /// classify is kept untouched and the call fails with `NotFound`.
    /// `auto` marks an implicit registration from an accessor, which is
    /// announced with a warning.
    async fn resolve<'a>(
        &self,
        entries: &'a mut EntryMap,
        key: &str,
        raw: &str,
        create: bool,
        auto: bool,
    ) -> CacheResult<&'a mut CachedEntry> {
        let classified = self.backend.classify(key).await;

        match (entries.get(key).map(CachedEntry::kind), classified) {
            (Some(cached), Some(now)) if cached != now => {
                if let Some(mut dropped) = entries.remove(key) {
                    dropped.close().await;
                }
                warn!(
                    path = %key,
                    cached = %cached,
                    now = %now,
                    "backend reports a different kind; dropped entry"
                );
            }
            (Some(cached), None) => {
                // classification fails open; absence may be transient
                warn!(
                    path = %key,
                    cached = %cached,
                    "cannot determine path as either file or directory; keeping entry"
                );
                return Err(CacheError::NotFound(key.to_string()));
            }
            _ => {}
        }

        let kind = match classified {
            Some(kind) => kind,
            None if create => path::requested_kind(raw),
            None => {
                warn!(path = %key, "cannot determine path as either file or directory");
                return Err(CacheError::NotFound(key.to_string()));
            }
        };

        match entries.entry(key.to_string()) {
            Entry::Occupied(occupied) => Ok(occupied.into_mut()),
            Entry::Vacant(vacant) => {
                if auto {
                    warn!(path = %key, kind = %kind, "path not registered; registering it");
                }
                let entry = CachedEntry::open(&*self.backend, kind, key, create)
                    .await
                    .map_err(|e| {
                        let err = CacheError::backend(key, e);
                        error!(path = %key, kind = %kind, error = %err, "registration failed");
                        err
                    })?;
                debug!(path = %key, kind = %kind, "registered");
                Ok(vacant.insert(entry))
            }
        }
    }

    fn probe_failed(op: &'static str, key: &str, e: BackendError) -> CacheError {
        warn!(op, path = %key, error = %e, "backend probe failed");
        CacheError::backend(key, e)
    }

    fn stream_failed(key: &str, e: BackendError) -> CacheError {
        error!(path = %key, error = %e, "could not open stream");
        CacheError::backend(key, e)
    }
}
