//! In-memory distributed filesystem client.
//!
//! Stands in for a remote cluster in tests and single-process deployments.
//! Modification times come from a logical millisecond clock, so every
//! mutation is observable even when several land within the same instant.

use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use parking_lot::RwLock;

use super::distributed::{DfsClient, FileStatus};
use crate::backend::{BoxedReader, ObjectKind};
use crate::error::{BackendError, BackendResult};

/// Node in the memory filesystem.
#[derive(Debug, Clone)]
enum Node {
    File { data: Vec<u8>, modified: SystemTime },
    Directory { modified: SystemTime },
}

impl Node {
    fn modified(&self) -> SystemTime {
        match self {
            Node::File { modified, .. } => *modified,
            Node::Directory { modified } => *modified,
        }
    }

    fn set_modified(&mut self, at: SystemTime) {
        match self {
            Node::File { modified, .. } => *modified = at,
            Node::Directory { modified } => *modified = at,
        }
    }

    fn is_dir(&self) -> bool {
        matches!(self, Node::Directory { .. })
    }
}

/// In-memory [`DfsClient`].
///
/// Thread-safe via an internal `RwLock` that is never held across an await.
/// Directory modification times advance when children are added, removed
/// or renamed, matching what cluster filesystems report.
#[derive(Debug)]
pub struct MemoryDfs {
    nodes: RwLock<HashMap<PathBuf, Node>>,
    clock: AtomicU64,
    closed: AtomicBool,
}

impl Default for MemoryDfs {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDfs {
    /// Create an empty filesystem holding only the root directory.
    pub fn new() -> Self {
        let fs = Self {
            nodes: RwLock::new(HashMap::new()),
            clock: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        };
        let now = fs.tick();
        fs.nodes
            .write()
            .insert(PathBuf::new(), Node::Directory { modified: now });
        fs
    }

    /// Normalize a path: remove leading `/`, resolve `.` and `..`.
    fn normalize(path: &str) -> PathBuf {
        let mut result = PathBuf::new();
        for component in Path::new(path).components() {
            match component {
                Component::ParentDir => {
                    result.pop();
                }
                Component::Normal(s) => result.push(s),
                Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
            }
        }
        result
    }

    fn path_str(path: &Path) -> String {
        path.display().to_string()
    }

    /// Advance the logical clock and return the new time.
    fn tick(&self) -> SystemTime {
        let millis = self.clock.fetch_add(1, Ordering::SeqCst) + 1;
        UNIX_EPOCH + Duration::from_millis(millis)
    }

    fn check_open(&self) -> BackendResult<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(BackendError::Closed)
        } else {
            Ok(())
        }
    }

    /// Create every missing ancestor of `path` as a directory.
    fn ensure_parents(
        nodes: &mut HashMap<PathBuf, Node>,
        path: &Path,
        now: SystemTime,
    ) -> BackendResult<()> {
        let mut current = PathBuf::new();
        for component in path.parent().into_iter().flat_map(|p| p.components()) {
            if let Component::Normal(s) = component {
                current.push(s);
                match nodes.get(&current) {
                    Some(node) if node.is_dir() => {}
                    Some(_) => {
                        return Err(BackendError::kind_mismatch(
                            Self::path_str(&current),
                            ObjectKind::Directory,
                        ));
                    }
                    None => {
                        if let Some(parent) = current.parent() {
                            if let Some(node) = nodes.get_mut(parent) {
                                node.set_modified(now);
                            }
                        }
                        nodes.insert(current.clone(), Node::Directory { modified: now });
                    }
                }
            }
        }
        Ok(())
    }

    /// Bump the modification time of the directory holding `path`.
    fn touch_parent(nodes: &mut HashMap<PathBuf, Node>, path: &Path, now: SystemTime) {
        if let Some(node) = path.parent().and_then(|p| nodes.get_mut(p)) {
            node.set_modified(now);
        }
    }

    fn status_of(path: &Path, node: &Node) -> FileStatus {
        FileStatus {
            path: Self::path_str(path),
            is_dir: node.is_dir(),
            modification_time: node.modified(),
        }
    }

    // ========================================================================
    // Direct manipulation (tests and embedding)
    // ========================================================================

    /// Create or replace a file, creating missing parents.
    pub fn write_file(&self, path: &str, data: impl Into<Vec<u8>>) -> BackendResult<()> {
        self.check_open()?;
        let normalized = Self::normalize(path);
        let now = self.tick();
        let mut nodes = self.nodes.write();

        if nodes.get(&normalized).is_some_and(Node::is_dir) {
            return Err(BackendError::kind_mismatch(path, ObjectKind::File));
        }

        Self::ensure_parents(&mut nodes, &normalized, now)?;
        let previous = nodes.insert(
            normalized.clone(),
            Node::File {
                data: data.into(),
                modified: now,
            },
        );
        if previous.is_none() {
            Self::touch_parent(&mut nodes, &normalized, now);
        }
        Ok(())
    }

    /// Advance the modification time of an existing object.
    pub fn touch(&self, path: &str) -> BackendResult<SystemTime> {
        self.check_open()?;
        let now = self.tick();
        let mut nodes = self.nodes.write();
        let node = nodes
            .get_mut(&Self::normalize(path))
            .ok_or_else(|| BackendError::not_found(path))?;
        node.set_modified(now);
        Ok(now)
    }

    /// Force the modification time of an existing object.
    pub fn set_modification_time(&self, path: &str, at: SystemTime) -> BackendResult<()> {
        self.check_open()?;
        let mut nodes = self.nodes.write();
        let node = nodes
            .get_mut(&Self::normalize(path))
            .ok_or_else(|| BackendError::not_found(path))?;
        node.set_modified(at);
        Ok(())
    }

    /// Remove an object and everything below it. False if nothing was there.
    pub fn remove(&self, path: &str) -> bool {
        let normalized = Self::normalize(path);
        if normalized.as_os_str().is_empty() {
            return false;
        }

        let now = self.tick();
        let mut nodes = self.nodes.write();
        if nodes.remove(&normalized).is_none() {
            return false;
        }
        nodes.retain(|k, _| !k.starts_with(&normalized));
        Self::touch_parent(&mut nodes, &normalized, now);
        true
    }

    pub fn contains(&self, path: &str) -> bool {
        self.nodes.read().contains_key(&Self::normalize(path))
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[async_trait]
impl DfsClient for MemoryDfs {
    async fn status(&self, path: &str) -> BackendResult<FileStatus> {
        self.check_open()?;
        let normalized = Self::normalize(path);
        let nodes = self.nodes.read();
        nodes
            .get(&normalized)
            .map(|node| Self::status_of(&normalized, node))
            .ok_or_else(|| BackendError::not_found(path))
    }

    async fn list_status(&self, path: &str) -> BackendResult<Vec<FileStatus>> {
        self.check_open()?;
        let normalized = Self::normalize(path);
        let nodes = self.nodes.read();

        match nodes.get(&normalized) {
            Some(node) if node.is_dir() => {}
            Some(_) => return Err(BackendError::kind_mismatch(path, ObjectKind::Directory)),
            None => return Err(BackendError::not_found(path)),
        }

        let mut children: Vec<FileStatus> = nodes
            .iter()
            .filter(|(k, _)| k.parent() == Some(normalized.as_path()) && **k != normalized)
            .map(|(k, node)| Self::status_of(k, node))
            .collect();

        children.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(children)
    }

    async fn open(&self, path: &str) -> BackendResult<BoxedReader> {
        self.check_open()?;
        let nodes = self.nodes.read();
        match nodes.get(&Self::normalize(path)) {
            Some(Node::File { data, .. }) => Ok(Box::new(Cursor::new(data.clone()))),
            Some(Node::Directory { .. }) => {
                Err(BackendError::kind_mismatch(path, ObjectKind::File))
            }
            None => Err(BackendError::not_found(path)),
        }
    }

    async fn create_new_file(&self, path: &str) -> BackendResult<bool> {
        self.check_open()?;
        let normalized = Self::normalize(path);
        let now = self.tick();
        let mut nodes = self.nodes.write();

        if nodes.contains_key(&normalized) {
            return Ok(false);
        }

        Self::ensure_parents(&mut nodes, &normalized, now)?;
        nodes.insert(
            normalized.clone(),
            Node::File {
                data: Vec::new(),
                modified: now,
            },
        );
        Self::touch_parent(&mut nodes, &normalized, now);
        Ok(true)
    }

    async fn mkdirs(&self, path: &str) -> BackendResult<bool> {
        self.check_open()?;
        let normalized = Self::normalize(path);
        let now = self.tick();
        let mut nodes = self.nodes.write();

        match nodes.get(&normalized) {
            Some(node) if node.is_dir() => return Ok(true),
            Some(_) => return Ok(false),
            None => {}
        }

        Self::ensure_parents(&mut nodes, &normalized, now)?;
        nodes.insert(normalized.clone(), Node::Directory { modified: now });
        Self::touch_parent(&mut nodes, &normalized, now);
        Ok(true)
    }

    async fn rename(&self, from: &str, to: &str) -> BackendResult<bool> {
        self.check_open()?;
        let from = Self::normalize(from);
        let to = Self::normalize(to);
        let now = self.tick();
        let mut nodes = self.nodes.write();

        // Refusals mirror cluster semantics: no overwrite, no implicit
        // parent creation, no moving a directory into itself.
        if from.as_os_str().is_empty() || !nodes.contains_key(&from) {
            return Ok(false);
        }
        if nodes.contains_key(&to) || to.starts_with(&from) {
            return Ok(false);
        }
        let parent_is_dir = to
            .parent()
            .and_then(|p| nodes.get(p))
            .is_some_and(Node::is_dir);
        if !parent_is_dir {
            return Ok(false);
        }

        let moved: Vec<PathBuf> = nodes
            .keys()
            .filter(|k| k.starts_with(&from))
            .cloned()
            .collect();

        for old in moved {
            if let Some(node) = nodes.remove(&old) {
                let new_path = match old.strip_prefix(&from) {
                    Ok(rest) if !rest.as_os_str().is_empty() => to.join(rest),
                    _ => to.clone(),
                };
                nodes.insert(new_path, node);
            }
        }

        Self::touch_parent(&mut nodes, &from, now);
        Self::touch_parent(&mut nodes, &to, now);
        Ok(true)
    }

    async fn close(&self) -> BackendResult<()> {
        self.check_open()?;
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
