//! Store capability traits.
//!
//! [`StoreClient`] is everything the view needs from the backing store. It
//! is path-based and keyed by [`CanonicalPath`]; the store normalizes
//! nothing on its own behalf.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncSeek, AsyncWrite};

use super::error::StoreResult;
use super::types::Metadata;
use crate::identity::Identity;
use crate::path::CanonicalPath;

/// Seekable byte stream opened for reading.
pub trait StoreReader: AsyncRead + AsyncSeek + Send + Unpin {}

impl<T: AsyncRead + AsyncSeek + Send + Unpin> StoreReader for T {}

/// Stream opened by [`StoreClient::open`].
pub type ReadStream = Box<dyn StoreReader>;

/// Stream opened by [`StoreClient::create`] or [`StoreClient::append`].
pub type WriteStream = Box<dyn AsyncWrite + Send + Unpin>;

/// Operations on an already-connected backing store.
#[async_trait]
pub trait StoreClient: Send + Sync {
    // ========================================================================
    // Reading
    // ========================================================================

    /// Fetch metadata. Missing objects return a not-found error.
    async fn metadata(&self, path: &CanonicalPath) -> StoreResult<Metadata>;

    /// Canonical paths of the direct children of a directory.
    async fn list(&self, path: &CanonicalPath) -> StoreResult<Vec<CanonicalPath>>;

    /// Open a file for reading, positioned at the start.
    async fn open(&self, path: &CanonicalPath) -> StoreResult<ReadStream>;

    // ========================================================================
    // Writing
    // ========================================================================

    /// Create a file, truncating any existing content.
    async fn create(&self, path: &CanonicalPath) -> StoreResult<WriteStream>;

    /// Open an existing file for appending.
    async fn append(&self, path: &CanonicalPath) -> StoreResult<WriteStream>;

    /// Create a directory and any missing parents.
    ///
    /// An existing directory is success.
    async fn mkdirs(&self, path: &CanonicalPath, mode: u32) -> StoreResult<()>;

    /// Delete a file or directory; `recursive` allows non-empty directories.
    async fn delete(&self, path: &CanonicalPath, recursive: bool) -> StoreResult<()>;

    /// Rename a file or directory.
    async fn rename(&self, from: &CanonicalPath, to: &CanonicalPath) -> StoreResult<()>;

    // ========================================================================
    // Session
    // ========================================================================

    /// Name the store authenticated this client as, if it knows one.
    fn principal(&self) -> Option<String> {
        None
    }

    // ========================================================================
    // Convenience methods (default implementations)
    // ========================================================================

    /// Check if a path exists.
    ///
    /// Errors other than not-found propagate.
    async fn exists(&self, path: &CanonicalPath) -> StoreResult<bool> {
        match self.metadata(path).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Produce the store client a session should use.
#[async_trait]
pub trait StoreConnector: Send + Sync {
    async fn connect(&self, identity: &Identity) -> StoreResult<Arc<dyn StoreClient>>;
}

/// Every session shares one client.
#[derive(Clone)]
pub struct SharedConnector {
    client: Arc<dyn StoreClient>,
}

impl SharedConnector {
    pub fn new(client: Arc<dyn StoreClient>) -> Self {
        Self { client }
    }
}

impl std::fmt::Debug for SharedConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedConnector").finish_non_exhaustive()
    }
}

#[async_trait]
impl StoreConnector for SharedConnector {
    async fn connect(&self, _identity: &Identity) -> StoreResult<Arc<dyn StoreClient>> {
        Ok(Arc::clone(&self.client))
    }
}
