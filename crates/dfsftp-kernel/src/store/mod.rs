//! Backing store abstraction.
//!
//! The view never touches storage directly. Everything goes through:
//!
//! - [`StoreClient`] - metadata, streams, and namespace operations
//! - [`StoreConnector`] - hands a session the client it should use
//! - [`MemoryBackend`] - in-memory store (testing, demos)
//! - [`LocalBackend`] - a local directory tree as the store
//!
//! All operations are keyed by [`CanonicalPath`](crate::path::CanonicalPath).

pub mod backends;
mod error;
mod ops;
mod types;

#[cfg(unix)]
pub use backends::LocalBackend;
pub use backends::MemoryBackend;
pub use error::{StoreError, StoreResult};
pub use ops::{ReadStream, SharedConnector, StoreClient, StoreConnector, StoreReader, WriteStream};
pub use types::{AccessBits, FileType, Metadata, Permissions};
