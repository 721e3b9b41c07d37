use std::fmt;

use atlas_library::LibraryError;
use atlas_registry::RegistryError;
use atlas_storage::{StorageError, StorageErrorKind};
use atlas_tree::TreeError;
use atlas_types::{AssetId, TypeError};
use thiserror::Error;

/// Stable failure codes reported to callers of the façade.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NotFound,
    AlreadyExists,
    InvalidOverride,
    IdentifiersExhausted,
    MultiLibraryImportNotSupported,
    BackendException,
    Cancelled,
    InvalidOperation,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotFound => "NotFound",
            Self::AlreadyExists => "AlreadyExists",
            Self::InvalidOverride => "InvalidOverride",
            Self::IdentifiersExhausted => "IdentifiersExhausted",
            Self::MultiLibraryImportNotSupported => "MultiLibraryImportNotSupported",
            Self::BackendException => "BackendException",
            Self::Cancelled => "Cancelled",
            Self::InvalidOperation => "InvalidOperation",
        };
        f.write_str(s)
    }
}

/// Errors from session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Saving onto an item whose identifier differs from the object's own.
    #[error("cannot save object {object:?} over item {item}")]
    InvalidOverride { item: AssetId, object: Option<AssetId> },

    #[error("dynamic identifiers exhausted")]
    IdentifiersExhausted,

    #[error("import candidates come from more than one library")]
    MultiLibraryImportNotSupported,

    #[error("storage backend failed: {0}")]
    Backend(StorageError),

    #[error("operation cancelled")]
    Cancelled,

    #[error("no project is open")]
    NotOpen,

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("serialization failed: {0}")]
    Serialization(String),

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Registry(RegistryError),

    #[error(transparent)]
    Library(LibraryError),

    #[error(transparent)]
    Type(#[from] TypeError),
}

impl SessionError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound(_) | Self::Tree(TreeError::NotFound(_)) => ErrorCode::NotFound,
            Self::AlreadyExists(_) | Self::Tree(TreeError::NameCollision(_)) => ErrorCode::AlreadyExists,
            Self::InvalidOverride { .. } => ErrorCode::InvalidOverride,
            Self::IdentifiersExhausted => ErrorCode::IdentifiersExhausted,
            Self::MultiLibraryImportNotSupported => ErrorCode::MultiLibraryImportNotSupported,
            Self::Backend(_) | Self::Library(_) | Self::Serialization(_) => ErrorCode::BackendException,
            Self::Cancelled => ErrorCode::Cancelled,
            Self::NotOpen
            | Self::InvalidOperation(_)
            | Self::Config(_)
            | Self::Tree(_)
            | Self::Registry(_)
            | Self::Type(_) => ErrorCode::InvalidOperation,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<StorageError> for SessionError {
    fn from(e: StorageError) -> Self {
        match e.kind {
            StorageErrorKind::NotFound => Self::NotFound(e.message),
            StorageErrorKind::AlreadyExists => Self::AlreadyExists(e.message),
            StorageErrorKind::Cancelled => Self::Cancelled,
            StorageErrorKind::Exception => Self::Backend(e),
        }
    }
}

impl From<RegistryError> for SessionError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::IdentifiersExhausted => Self::IdentifiersExhausted,
            other => Self::Registry(other),
        }
    }
}

impl From<LibraryError> for SessionError {
    fn from(e: LibraryError) -> Self {
        match e {
            LibraryError::Storage(inner) => inner.into(),
            LibraryError::Type(TypeError::OrdinalsExhausted(_)) => Self::IdentifiersExhausted,
            other => Self::Library(other),
        }
    }
}

/// Result alias for session operations.
pub type SessionResult<T> = Result<T, SessionError>;
