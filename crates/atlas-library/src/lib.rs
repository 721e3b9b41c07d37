//! External asset libraries for the Atlas project store.
//!
//! An [`AssetLibrary`] is a named collection of object templates laid out in
//! folders. Libraries come from a [`LibraryProvider`] keyed by
//! [`LibrarySource`]; which partition a library's identifiers fall in depends
//! on the source kind.
//!
//! Identifiers of library objects are made stable across sessions by
//! persisted tables:
//!
//! - [`IdTable`] (`<partition>Library_<ordinal>.idmap`) maps entry keys to
//!   local indices for static, scene and built-in libraries.
//! - [`LibraryCatalog`] (`Libraries.catalog`) assigns ordinals to static and
//!   scene sources.
//! - [`BundleDescriptor`] (`<uniqueName>.bundle`) holds a bundle's ordinal
//!   together with its table.

pub mod bundle;
pub mod catalog;
pub mod error;
pub mod provider;
pub mod source;
pub mod table;
pub mod template;

pub use bundle::BundleDescriptor;
pub use catalog::{LibraryCatalog, CATALOG_KEY};
pub use error::{LibraryError, LibraryResult};
pub use provider::{InMemoryLibraryProvider, LibraryProvider};
pub use source::LibrarySource;
pub use table::IdTable;
pub use template::{part_key, AssetLibrary, LibraryEntry, ObjectTemplate, PartTemplate};
