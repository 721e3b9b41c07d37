//! Foundation types for the Atlas project store.
//!
//! This crate provides the identifier, type and persistent-shape types used
//! throughout Atlas. Every other Atlas crate depends on `atlas-types`.
//!
//! # Key Types
//!
//! - [`AssetId`]: 64-bit identifier partitioned into static, dynamic, scene,
//!   built-in and bundled ranges
//! - [`LibraryRef`]: one external library (partition + ordinal)
//! - [`TypeTag`]: stable type identifier decoupled from in-process types
//! - [`PersistentForm`]: closed Scalar / Composite / Scene persistent variant
//! - [`AssetMeta`]: node metadata stored next to each asset blob
//! - [`ProjectInfo`]: session metadata and ordinal counters
//! - [`CancellationSource`] / [`CancelSignal`]: cooperative cancellation

pub mod cancel;
pub mod error;
pub mod handle;
pub mod id;
pub mod meta;
pub mod persistent;
pub mod project;
pub mod tag;

pub use cancel::{CancelSignal, CancellationSource};
pub use error::TypeError;
pub use id::{AssetId, LibraryRef, Partition, MAX_LOCAL_INDEX, MAX_ORDINAL};
pub use meta::{AssetMeta, TreeNode};
pub use persistent::{EmbeddedPart, FieldValue, PersistentForm, PersistentKind, PersistentRecord};
pub use project::ProjectInfo;
pub use tag::TypeTag;
