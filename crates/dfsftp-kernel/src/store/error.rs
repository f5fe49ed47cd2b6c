//! Store error types.

use std::io;
use thiserror::Error;

/// Error returned by a [`StoreClient`](super::StoreClient).
#[derive(Debug, Error)]
pub enum StoreError {
    /// No object at this path.
    #[error("not found: {0}")]
    NotFound(String),

    /// An object of another type already occupies the path.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The store refused the operation.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Expected a directory.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// Expected a file.
    #[error("is a directory: {0}")]
    IsADirectory(String),

    /// Directory not empty.
    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(String),

    /// Path cannot be mapped onto the store.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl StoreError {
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    pub fn already_exists(path: impl Into<String>) -> Self {
        Self::AlreadyExists(path.into())
    }

    pub fn permission_denied(path: impl Into<String>) -> Self {
        Self::PermissionDenied(path.into())
    }

    pub fn not_a_directory(path: impl Into<String>) -> Self {
        Self::NotADirectory(path.into())
    }

    pub fn is_a_directory(path: impl Into<String>) -> Self {
        Self::IsADirectory(path.into())
    }

    pub fn directory_not_empty(path: impl Into<String>) -> Self {
        Self::DirectoryNotEmpty(path.into())
    }

    pub fn invalid_path(path: impl Into<String>) -> Self {
        Self::InvalidPath(path.into())
    }

    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Returns true if the error means "nothing stored here".
    ///
    /// I/O errors of kind `NotFound` count, so backends that surface raw
    /// `io::Error`s still report absence correctly.
    pub fn is_not_found(&self) -> bool {
        match self {
            StoreError::NotFound(_) => true,
            StoreError::Io(e) => e.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

/// Convert StoreError to std::io::Error for stream consumers.
impl From<StoreError> for io::Error {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(msg) => io::Error::new(io::ErrorKind::NotFound, msg),
            StoreError::AlreadyExists(msg) => io::Error::new(io::ErrorKind::AlreadyExists, msg),
            StoreError::PermissionDenied(msg) => {
                io::Error::new(io::ErrorKind::PermissionDenied, msg)
            }
            StoreError::NotADirectory(msg) => io::Error::new(io::ErrorKind::NotADirectory, msg),
            StoreError::IsADirectory(msg) => io::Error::new(io::ErrorKind::IsADirectory, msg),
            StoreError::DirectoryNotEmpty(msg) => {
                io::Error::new(io::ErrorKind::DirectoryNotEmpty, msg)
            }
            StoreError::InvalidPath(msg) => io::Error::new(io::ErrorKind::InvalidInput, msg),
            StoreError::Io(e) => e,
            StoreError::Other(msg) => io::Error::other(msg),
        }
    }
}

/// Store result type.
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_detection() {
        assert!(StoreError::not_found("/a").is_not_found());
        assert!(StoreError::Io(io::Error::from(io::ErrorKind::NotFound)).is_not_found());
        assert!(!StoreError::permission_denied("/a").is_not_found());
        assert!(!StoreError::other("boom").is_not_found());
    }

    #[test]
    fn test_into_io_error_kind() {
        let err: io::Error = StoreError::permission_denied("/a").into();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);

        let err: io::Error = StoreError::invalid_path("x").into();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
