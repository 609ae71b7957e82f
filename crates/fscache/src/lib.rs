//! Staleness-aware metadata cache over filesystem backends.
//!
//! The [`Registry`] answers "is this a file or a directory, has it changed,
//! give me its contents or listing" for a path, remembering what it learned
//! so repeated questions stay cheap. Key components:
//!
//! - [`Backend`] - Contract every storage adapter implements
//! - [`Registry`] - Path-keyed cache with auto-registration and refresh
//! - [`LocalBackend`](backends::LocalBackend) - Local disk under a root (with path security)
//! - [`DistributedBackend`](backends::DistributedBackend) - Remote filesystem via a [`DfsClient`](backends::DfsClient)
//! - [`MemoryDfs`](backends::MemoryDfs) - In-memory remote filesystem (for testing)
//! - [`DeadlineBackend`](backends::DeadlineBackend) - Per-call deadlines around any backend
//!
//! ## Design Decisions
//!
//! - **Fail-open**: missing paths and backend hiccups come back as a
//!   [`CacheError`] and a log record, never a panic. Only a handle of the
//!   wrong kind ([`CacheError::KindMismatch`]) signals a logic defect.
//! - **One map, one variant per path**: a path is cached as either a file or
//!   a directory, never both.
//! - **No eviction**: entries live until unregistered or the registry is
//!   destroyed.
//!
//! ```no_run
//! use fscache::{Registry, backends::LocalBackend};
//!
//! # async fn demo() -> fscache::CacheResult<()> {
//! let registry = Registry::new(LocalBackend::new("/srv/data"));
//! for path in registry.list("incoming").await? {
//!     if registry.is_stale(&path).await? {
//!         let stream = registry.open_stream(&path).await?;
//!         let mut buf = Vec::new();
//!         stream.read_to_end(&mut buf).await.ok();
//!     }
//! }
//! registry.destroy().await?;
//! # Ok(())
//! # }
//! ```

pub mod backends;
pub mod path;

mod backend;
mod config;
mod entry;
mod error;
mod registry;
mod stream;

pub use backend::{Backend, BoxedReader, DirHandle, FileHandle, Handle, ObjectKind};
pub use config::{ConfigError, DEFAULT_PARTIAL_WRITE_SUFFIX, DistributedConfig, RegistryConfig};
pub use entry::{CachedDirectory, CachedEntry, CachedFile};
pub use error::{BackendError, BackendResult, CacheError, CacheResult};
pub use registry::Registry;
pub use stream::FileStream;
