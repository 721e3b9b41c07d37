use atlas_types::AssetId;
use thiserror::Error;

use crate::item::ItemHandle;

/// Errors from project tree operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TreeError {
    #[error("path not found: {0}")]
    NotFound(String),

    /// A sibling with the same name and extension already exists.
    #[error("name collision: {0}")]
    NameCollision(String),

    #[error("not a folder: {0}")]
    NotAFolder(String),

    #[error("operation not allowed on the root folder")]
    IsRoot,

    #[error("invalid item name: {0:?}")]
    InvalidName(String),

    /// Moving a folder under its own descendant.
    #[error("cannot move {0} under itself")]
    Cycle(String),

    #[error("stale item handle: {0:?}")]
    StaleHandle(ItemHandle),

    /// The identifier is already owned by another item.
    #[error("identifier already in the tree: {0}")]
    DuplicateId(AssetId),
}

/// Result alias for tree operations.
pub type TreeResult<T> = Result<T, TreeError>;
