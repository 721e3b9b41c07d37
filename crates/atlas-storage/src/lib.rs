//! Storage backend contract for the Atlas project store.
//!
//! The session never touches durable state directly. Everything goes through
//! the asynchronous [`Storage`] trait: project lifecycle, the project tree,
//! asset blobs with their `.meta` and `.preview` sidecars, and a flat
//! per-project key/value namespace for small auxiliary tables.
//!
//! # Backends
//!
//! - [`InMemoryStorage`] -- reference backend for tests and embedding
//!
//! # Conventions
//!
//! - Asset paths are `<folderPath>/<name><ext>` relative to the project.
//! - Every call takes a [`CancelSignal`] and fails with
//!   [`StorageErrorKind::Cancelled`] once it is set.
//! - `NotFound` is a distinct error kind because callers branch on it.
//!
//! [`CancelSignal`]: atlas_types::CancelSignal

pub mod archive;
pub mod error;
pub mod memory;
pub mod paths;
pub mod traits;
pub mod values;

pub use archive::ProjectArchive;
pub use error::{StorageError, StorageErrorKind, StorageResult};
pub use memory::InMemoryStorage;
pub use traits::{ItemRecord, SaveBatch, Storage};
pub use values::{delete_value, read_value, read_values, value_key, write_value, StoredValue};
