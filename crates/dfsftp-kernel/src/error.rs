//! View error types.

use std::fmt;
use std::io;
use thiserror::Error;

use crate::path::CanonicalPath;
use crate::store::StoreError;

/// Which permission bit an operation needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Access::Read => f.write_str("read"),
            Access::Write => f.write_str("write"),
        }
    }
}

/// Error returned by the session view.
#[derive(Debug, Error)]
pub enum ViewError {
    /// Identity unusable for a session.
    #[error("invalid identity: {0}")]
    InvalidIdentity(String),

    /// Home directory could not be checked or created.
    #[error("home directory {home} unavailable: {source}")]
    HomeUnavailable {
        home: CanonicalPath,
        #[source]
        source: StoreError,
    },

    /// The session's identity lacks the needed permission.
    #[error("no {access} permission: {path}")]
    PermissionDenied { path: CanonicalPath, access: Access },

    /// Backing store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ViewError {
    pub fn permission_denied(path: &CanonicalPath, access: Access) -> Self {
        Self::PermissionDenied {
            path: path.clone(),
            access,
        }
    }
}

impl From<ViewError> for io::Error {
    fn from(e: ViewError) -> Self {
        match e {
            ViewError::PermissionDenied { .. } => {
                io::Error::new(io::ErrorKind::PermissionDenied, e.to_string())
            }
            ViewError::Store(inner) => inner.into(),
            other => io::Error::other(other.to_string()),
        }
    }
}

/// View result type.
pub type ViewResult<T> = Result<T, ViewError>;
