//! Session orchestration for the Atlas project store.
//!
//! One [`Session`] holds an open project and its live objects. It saves,
//! loads, duplicates, moves, renames and deletes asset items. It resolves
//! references into libraries and imports library content into the project.
//! [`ProjectStore`] is the shareable entry point that serializes operations
//! on a session.

pub mod config;
pub mod error;
pub mod events;
pub mod facade;
pub mod import;
pub mod resolver;
pub mod serializer;
pub mod session;

#[cfg(test)]
mod testing;

pub use config::SessionConfig;
pub use error::{ErrorCode, SessionError, SessionResult};
pub use events::{EventBus, EventKind, EventStream, SessionEvent};
pub use facade::{Failure, ProjectStore, StoreResult};
pub use import::{ImportCandidate, ImportStatus, ImportTree};
pub use resolver::{LoadedLibrary, ResolveReport};
pub use serializer::{BincodeSerializer, Decoded, Encoded, Serializer};
pub use session::{LoadOutcome, Loaded, OpenFlags, SaveRequest, SaveSource, SaveTarget, Session, SessionState};

// Re-export the types callers need to drive a session.
pub use atlas_library::{AssetLibrary, LibraryProvider, LibrarySource};
pub use atlas_registry::{LiveObject, ObjectHandle, TypeCatalog};
pub use atlas_storage::{InMemoryStorage, Storage};
pub use atlas_tree::{ItemHandle, ProjectTree};
pub use atlas_types::{AssetId, CancelSignal, CancellationSource, TypeTag};
