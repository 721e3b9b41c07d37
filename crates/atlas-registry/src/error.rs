use atlas_types::{AssetId, Partition, TypeError, TypeTag};
use thiserror::Error;

use crate::object::ObjectHandle;

/// Errors from registry and arena operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The identifier is already mapped. Unregister it first.
    #[error("identifier already mapped: {0}")]
    AlreadyMapped(AssetId),

    #[error("identifier not mapped: {0}")]
    NotMapped(AssetId),

    /// The handle's slot was freed or reused.
    #[error("stale object handle: {0:?}")]
    StaleHandle(ObjectHandle),

    /// The handle already has an identifier.
    #[error("object {handle:?} already registered as {id}")]
    HandleMapped { handle: ObjectHandle, id: AssetId },

    #[error("identifier {id} is not in the {expected} partition")]
    WrongPartition { id: AssetId, expected: Partition },

    /// No dynamic identifiers remain in the reserved ranges.
    #[error("dynamic identifiers exhausted")]
    IdentifiersExhausted,

    #[error("unknown type tag: {0}")]
    UnknownType(TypeTag),

    #[error(transparent)]
    Type(#[from] TypeError),
}

/// Result alias for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;
