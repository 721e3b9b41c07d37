use std::fmt;

use thiserror::Error;

/// What kind of storage failure occurred.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StorageErrorKind {
    /// Lookup miss. Often expected, e.g. probing an optional value.
    NotFound,
    AlreadyExists,
    Cancelled,
    /// Any other backend failure.
    Exception,
}

impl fmt::Display for StorageErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not found"),
            Self::AlreadyExists => write!(f, "already exists"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Exception => write!(f, "backend exception"),
        }
    }
}

/// Error returned by every [`Storage`](crate::Storage) call.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct StorageError {
    pub kind: StorageErrorKind,
    pub message: String,
}

impl StorageError {
    pub fn new(kind: StorageErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StorageErrorKind::NotFound, message)
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(StorageErrorKind::AlreadyExists, message)
    }

    pub fn cancelled() -> Self {
        Self::new(StorageErrorKind::Cancelled, "operation cancelled")
    }

    pub fn exception(message: impl Into<String>) -> Self {
        Self::new(StorageErrorKind::Exception, message)
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == StorageErrorKind::NotFound
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == StorageErrorKind::Cancelled
    }
}

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
