//! Cache backends.
//!
//! Backends implement [`Backend`](crate::Backend) for different storage types.

mod deadline;
mod distributed;
mod local;
mod memory;

pub use deadline::DeadlineBackend;
pub use distributed::{DfsClient, DistributedBackend, FileStatus};
pub use local::LocalBackend;
pub use memory::MemoryDfs;
