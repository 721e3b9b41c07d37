//! Identifier space and resource registry for the Atlas project store.
//!
//! Live objects sit in an [`ObjectArena`] addressed by generational
//! [`ObjectHandle`]s. The [`Registry`] maps persisted [`AssetId`]s to those
//! handles and records who owns each object:
//!
//! - **Session** ownership (dynamic identifiers): unregistering destroys the
//!   object.
//! - **Library** ownership (static, scene, built-in, bundled identifiers):
//!   unregistering only unmaps it; the supplying library keeps the object.
//!
//! Dynamic identifiers are minted by a [`DynamicIdAllocator`] and type
//! capabilities (persistent kind, file extension) come from a
//! [`TypeCatalog`] instead of runtime type inspection.
//!
//! [`AssetId`]: atlas_types::AssetId

pub mod alloc;
pub mod arena;
pub mod catalog;
pub mod error;
pub mod object;
pub mod registry;

pub use alloc::DynamicIdAllocator;
pub use arena::ObjectArena;
pub use catalog::{TypeCatalog, TypeInfo, SCENE_TYPE_NAME};
pub use error::{RegistryError, RegistryResult};
pub use object::{LiveObject, ObjectHandle};
pub use registry::{Ownership, Registry, Unregistered};
