//! Project tree model for the Atlas project store.
//!
//! A [`ProjectTree`] is an arena of [`ProjectItem`]s addressed by
//! generational [`ItemHandle`]s. Parents are stored as optional handles and
//! a separate identifier cache maps every asset [`AssetId`] (and each of its
//! embedded identifiers) to the item that owns it.
//!
//! # Invariants
//!
//! - The tree is acyclic and every non-root item has exactly one parent.
//! - Sibling `name + extension` pairs are unique within a folder.
//! - Moving or renaming an item changes its path, never its identifier or
//!   cache entry.
//!
//! [`AssetId`]: atlas_types::AssetId

pub mod error;
pub mod item;
pub mod tree;

pub use error::{TreeError, TreeResult};
pub use item::{ItemHandle, ProjectItem};
pub use tree::ProjectTree;
