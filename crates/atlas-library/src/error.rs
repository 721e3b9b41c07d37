use atlas_storage::StorageError;
use atlas_types::TypeError;
use thiserror::Error;

/// Errors from library operations.
#[derive(Debug, Error)]
pub enum LibraryError {
    /// The provider failed for a reason other than a missing asset.
    #[error("library provider failed for {source_name}: {reason}")]
    Provider { source_name: String, reason: String },

    #[error("invalid library entry {key}: {reason}")]
    InvalidEntry { key: String, reason: String },

    /// The library has more objects than a local index range holds.
    #[error("library {0} has no local indices left")]
    TableFull(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Type(#[from] TypeError),
}

/// Result alias for library operations.
pub type LibraryResult<T> = Result<T, LibraryError>;
