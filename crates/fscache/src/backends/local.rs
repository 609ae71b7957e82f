//! Local filesystem backend.
//!
//! Provides access to real filesystem paths, with path security
//! to prevent escaping the root directory.

use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, warn};

use crate::backend::{Backend, BoxedReader, DirHandle, FileHandle, Handle, ObjectKind};
use crate::error::{BackendError, BackendResult};
use crate::path;

/// Local filesystem backend.
///
/// All paths are relative to `root`. For example, if `root` is
/// `/srv/data`, then `"logs/today.txt"` and `"/logs/today.txt"` both name
/// `/srv/data/logs/today.txt`.
///
/// Path security is enforced: attempts to escape via `..` or a symlink
/// pointing outside the root are blocked.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    root: PathBuf,
}

impl LocalBackend {
    /// Create a new local filesystem rooted at the given path.
    ///
    /// The root is canonicalized at construction time to handle symlinks
    /// (e.g. macOS `/tmp` → `/private/tmp`).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root: PathBuf = root.into();
        let root = dunce::canonicalize(&root).unwrap_or(root);
        Self { root }
    }

    /// Get the root path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a caller path to an absolute path within the root.
    ///
    /// `..` is applied lexically and may not climb above the root. The path,
    /// or its nearest existing ancestor when it does not exist yet, is then
    /// canonicalized, so a symlink cannot lead out even for files about to
    /// be created.
    fn resolve(&self, path: &str) -> BackendResult<PathBuf> {
        let relative = Path::new(path.trim_start_matches(path::SEPARATOR));
        let mut full = self.root.clone();
        let mut depth = 0usize;

        for component in relative.components() {
            match component {
                Component::Normal(s) => {
                    full.push(s);
                    depth += 1;
                }
                Component::ParentDir => {
                    if depth == 0 {
                        return Err(BackendError::path_escapes_root(path));
                    }
                    full.pop();
                    depth -= 1;
                }
                Component::CurDir => {}
                Component::RootDir | Component::Prefix(_) => {
                    return Err(BackendError::invalid_path(path));
                }
            }
        }

        self.check_contained(path, &full)?;
        Ok(full)
    }

    /// Canonicalize `full`, or the nearest ancestor that exists, and make
    /// sure it lands under the root.
    fn check_contained(&self, path: &str, full: &Path) -> BackendResult<()> {
        let mut existing = full;
        let canonical = loop {
            match dunce::canonicalize(existing) {
                Ok(canonical) => break canonical,
                // a dangling symlink would be followed by create
                Err(_) if std::fs::symlink_metadata(existing).is_ok() => {
                    return Err(BackendError::path_escapes_root(format!(
                        "{} is a dangling link",
                        existing.display()
                    )));
                }
                Err(_) => match existing.parent() {
                    Some(parent) => existing = parent,
                    None => return Err(BackendError::path_escapes_root(path)),
                },
            }
        };

        if !canonical.starts_with(&self.root) {
            return Err(BackendError::path_escapes_root(format!(
                "{} is not under {}",
                canonical.display(),
                self.root.display()
            )));
        }
        Ok(())
    }

    /// Fail-open metadata lookup used by classification.
    async fn probe(&self, path: &str, kind: ObjectKind) -> Option<std::fs::Metadata> {
        let full = match self.resolve(path) {
            Ok(full) => full,
            Err(e) => {
                warn!(path = %path, error = %e, "cannot classify as {}", kind);
                return None;
            }
        };

        match fs::metadata(&full).await {
            Ok(meta) => Some(meta),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path, "no such {}", kind);
                None
            }
            Err(e) => {
                warn!(
                    path = %path,
                    error = %e,
                    "could not read metadata while classifying as {} (permissions?)",
                    kind
                );
                None
            }
        }
    }

    async fn exists(full: &Path) -> BackendResult<bool> {
        match fs::metadata(full).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl Backend for LocalBackend {
    fn name(&self) -> &str {
        "local"
    }

    async fn is_file(&self, path: &str) -> bool {
        self.probe(path, ObjectKind::File)
            .await
            .is_some_and(|meta| meta.is_file())
    }

    async fn is_dir(&self, path: &str) -> bool {
        self.probe(path, ObjectKind::Directory)
            .await
            .is_some_and(|meta| meta.is_dir())
    }

    async fn open_file_handle(&self, path: &str, create: bool) -> BackendResult<FileHandle> {
        let full = self.resolve(path)?;

        if create && !Self::exists(&full).await? {
            if let Some(parent) = full.parent() {
                fs::create_dir_all(parent).await?;
            }
            fs::OpenOptions::new()
                .write(true)
                .create(true)
                .open(&full)
                .await?;
            debug!(path = %path, "created empty file");
        }

        let meta = fs::metadata(&full).await?;
        if meta.is_dir() {
            return Err(BackendError::kind_mismatch(path, ObjectKind::File));
        }
        Ok(FileHandle::new(path))
    }

    async fn open_dir_handle(&self, path: &str, create: bool) -> BackendResult<DirHandle> {
        let full = self.resolve(path)?;

        if create && !Self::exists(&full).await? {
            fs::create_dir_all(&full).await?;
            debug!(path = %path, "created directory");
        }

        let meta = fs::metadata(&full).await?;
        if !meta.is_dir() {
            return Err(BackendError::kind_mismatch(path, ObjectKind::Directory));
        }
        Ok(DirHandle::new(path))
    }

    async fn modification_time(&self, handle: &dyn Handle) -> BackendResult<SystemTime> {
        let full = self.resolve(handle.path())?;
        let meta = fs::metadata(&full).await?;
        Ok(meta.modified()?)
    }

    async fn open_stream(&self, handle: &FileHandle) -> BackendResult<BoxedReader> {
        let full = self.resolve(handle.path())?;
        let file = fs::File::open(&full).await?;
        Ok(Box::new(file))
    }

    async fn list_children(&self, handle: &DirHandle) -> BackendResult<Vec<String>> {
        let full = self.resolve(handle.path())?;
        let mut names = Vec::new();
        let mut dir = fs::read_dir(&full).await?;

        while let Some(entry) = dir.next_entry().await? {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }

        names.sort();
        Ok(names
            .iter()
            .map(|name| path::join(handle.path(), name))
            .collect())
    }

    async fn move_object(&self, current: &str, new: &str, create: bool) -> BackendResult<String> {
        let new_is_dir = !path::has_trailing_separator(new) && self.is_dir(new).await;
        let target = path::resolve_move_target(current, new, new_is_dir)?;

        let from = self.resolve(current)?;
        let to = self.resolve(&target.destination)?;

        if create {
            if let Some(parent) = &target.parent {
                fs::create_dir_all(self.resolve(parent)?).await?;
            }
        }

        // rename(2) silently replaces files; refuse like a cluster would.
        if Self::exists(&to).await? {
            return Err(BackendError::refused(format!(
                "rename {} -> {}: destination exists",
                current, target.destination
            )));
        }

        fs::rename(&from, &to).await?;
        Ok(target.destination)
    }

    async fn close(&self) -> BackendResult<()> {
        Ok(())
    }
}
