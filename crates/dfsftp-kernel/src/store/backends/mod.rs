//! Store backends.
//!
//! Backends implement [`StoreClient`](crate::store::StoreClient) for
//! different storage types.

#[cfg(unix)]
mod local;
mod memory;

#[cfg(unix)]
pub use local::LocalBackend;
pub use memory::{MemoryBackend, DEFAULT_GROUP, DEFAULT_USER};
