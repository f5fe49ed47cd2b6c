//! # dfsftp-kernel
//!
//! Jailed per-user filesystem view over a distributed store.
//!
//! A session:
//! - Is opened by a [`ViewFactory`] for an authenticated [`Identity`]
//! - Starts in the user's home directory, created on first login
//! - Resolves every path expression to a [`CanonicalPath`] under home
//! - Checks owner/group/other bits before touching the store
//!
//! Storage sits behind [`StoreClient`]; [`MemoryBackend`] and
//! [`LocalBackend`] ship as reference stores.

pub mod entry;
pub mod error;
pub mod identity;
pub mod path;
pub mod permission;
pub mod session;
pub mod store;

pub use entry::{EntryKind, VirtualEntry};
pub use error::{Access, ViewError, ViewResult};
pub use identity::Identity;
pub use path::{CanonicalPath, NotAbsolute, resolve};
pub use session::{Navigation, SessionView, ViewConfig, ViewFactory};
#[cfg(unix)]
pub use store::LocalBackend;
pub use store::{
    AccessBits, FileType, MemoryBackend, Metadata, Permissions, ReadStream, SharedConnector,
    StoreClient, StoreConnector, StoreError, StoreResult, WriteStream,
};
