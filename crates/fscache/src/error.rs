//! Error types for backends and the registry.

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::backend::ObjectKind;

/// Error raised by a [`Backend`](crate::Backend) implementation.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Path does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A handle of one kind was requested for an object of the other kind.
    ///
    /// This is a contract violation by the caller, not an environmental
    /// condition.
    #[error("{path} is not a {expected}")]
    KindMismatch { path: String, expected: ObjectKind },

    /// Path escapes the backend root (security violation).
    #[error("path escapes root: {0}")]
    PathEscapesRoot(String),

    /// Path cannot be interpreted by the backend.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// The backend declined the operation without an I/O error.
    #[error("refused: {0}")]
    Refused(String),

    /// A delegated call did not complete within its deadline.
    #[error("{op} timed out after {after:?}")]
    Timeout { op: &'static str, after: Duration },

    /// The backend has been shut down.
    #[error("backend is closed")]
    Closed,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl BackendError {
    /// Create a NotFound error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    /// Create a KindMismatch error.
    pub fn kind_mismatch(path: impl Into<String>, expected: ObjectKind) -> Self {
        Self::KindMismatch {
            path: path.into(),
            expected,
        }
    }

    /// Create a PathEscapesRoot error.
    pub fn path_escapes_root(path: impl Into<String>) -> Self {
        Self::PathEscapesRoot(path.into())
    }

    /// Create an InvalidPath error.
    pub fn invalid_path(path: impl Into<String>) -> Self {
        Self::InvalidPath(path.into())
    }

    /// Create a Refused error.
    pub fn refused(msg: impl Into<String>) -> Self {
        Self::Refused(msg.into())
    }

    /// Create an Other error.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// True for a missing path, including I/O errors of kind `NotFound`.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Io(e) => e.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }

    pub fn is_kind_mismatch(&self) -> bool {
        matches!(self, Self::KindMismatch { .. })
    }
}

/// Error returned by every [`Registry`](crate::Registry) operation.
///
/// The registry never panics on backend trouble; it logs and hands one of
/// these back instead.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Path was empty or all whitespace.
    #[error("blank path passed to {op}()")]
    InvalidPath { op: &'static str },

    /// Path is neither a file nor a directory on the backend.
    #[error("cannot determine {0} as either file or directory")]
    NotFound(String),

    /// A file-only operation was called on something that is not a file.
    #[error("{0} is not a file")]
    NotAFile(String),

    /// The backend built a handle of the wrong kind.
    #[error("type mismatch registering {path}: {source}")]
    KindMismatch {
        path: String,
        #[source]
        source: BackendError,
    },

    /// Backend failure while operating on `path`.
    #[error("backend error on {path}: {source}")]
    Backend {
        path: String,
        #[source]
        source: BackendError,
    },

    /// The backend failed to shut down during [`Registry::destroy`](crate::Registry::destroy).
    #[error("backend shutdown failed: {0}")]
    Shutdown(#[source] BackendError),

    /// The registry has been destroyed.
    #[error("registry has been destroyed")]
    Destroyed,
}

impl CacheError {
    /// Wrap a backend error, routing kind mismatches to their own variant.
    pub fn backend(path: impl Into<String>, source: BackendError) -> Self {
        let path = path.into();
        if source.is_kind_mismatch() {
            Self::KindMismatch { path, source }
        } else {
            Self::Backend { path, source }
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_invalid_path(&self) -> bool {
        matches!(self, Self::InvalidPath { .. })
    }
}

/// Backend result type.
pub type BackendResult<T> = Result<T, BackendError>;

/// Registry result type.
pub type CacheResult<T> = Result<T, CacheError>;
