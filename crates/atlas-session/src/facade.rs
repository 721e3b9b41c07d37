//! Serialized access to a [`Session`].
//!
//! [`ProjectStore`] wraps a session in an async mutex. Every operation takes
//! the lock for its whole duration, so operations issued concurrently run one
//! after another and never observe each other half done. Failures come back
//! as a flat [`Failure`] with a stable [`ErrorCode`] and are also published
//! as failed events; cancellation is returned but never published.
//!
//! The caller's signal is linked with the session signal *before* the lock is
//! awaited, so [`ProjectStore::cancel_all`] also cancels operations still
//! queued on the lock.

use std::sync::Arc;

use atlas_library::LibrarySource;
use atlas_tree::ItemHandle;
use atlas_types::{CancelSignal, CancellationSource, LibraryRef, ProjectInfo, TreeNode};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{ErrorCode, SessionError, SessionResult};
use crate::events::{EventKind, EventStream};
use crate::import::{ImportCandidate, ImportTree};
use crate::session::{LoadOutcome, OpenFlags, SaveRequest, Session};

/// A failed store operation.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{code}: {text}")]
pub struct Failure {
    pub code: ErrorCode,
    pub text: String,
}

impl Failure {
    pub fn is_cancelled(&self) -> bool {
        self.code == ErrorCode::Cancelled
    }
}

impl From<SessionError> for Failure {
    fn from(e: SessionError) -> Self {
        Self {
            code: e.code(),
            text: e.to_string(),
        }
    }
}

pub type StoreResult<T> = Result<T, Failure>;

/// Publish non-cancellation failures and flatten the error.
fn finish<T>(session: &Session, kind: Option<EventKind>, result: SessionResult<T>) -> StoreResult<T> {
    result.map_err(|e| {
        if !e.is_cancelled() {
            if let Some(kind) = kind {
                session.failed(kind, &e);
            }
        }
        debug!(code = %e.code(), error = %e, "store operation failed");
        Failure::from(e)
    })
}

/// A cancellable store operation: link the caller's signal, take the lock,
/// forward to the session method of the same name and flatten the result.
macro_rules! store_op {
    ($name:ident($($arg:ident: $ty:ty),*) -> $out:ty, $event:expr) => {
        pub async fn $name(&self, $($arg: $ty,)* cancel: &CancelSignal) -> StoreResult<$out> {
            let signal = self.link(cancel);
            #[allow(unused_mut)]
            let mut session = self.session.lock().await;
            let result = session.$name($($arg,)* &signal).await;
            finish(&session, $event, result)
        }
    };
}

/// Cloneable handle to one serialized session.
#[derive(Clone)]
pub struct ProjectStore {
    session: Arc<Mutex<Session>>,
    cancellation: CancellationSource,
    events: crate::events::EventBus,
}

impl std::fmt::Debug for ProjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectStore").finish_non_exhaustive()
    }
}

impl ProjectStore {
    pub fn new(session: Session) -> Self {
        Self {
            cancellation: session.cancellation().clone(),
            events: session.events().clone(),
            session: Arc::new(Mutex::new(session)),
        }
    }

    fn link(&self, cancel: &CancelSignal) -> CancelSignal {
        cancel.linked(&self.cancellation.signal())
    }

    /// Events of every operation. Needs no lock.
    pub fn subscribe(&self) -> EventStream {
        self.events.subscribe()
    }

    /// Cancel every running and queued operation. Needs no lock.
    pub fn cancel_all(&self) {
        info!("cancelling all store operations");
        self.cancellation.cancel();
        self.cancellation.renew();
    }

    /// Run `f` with the session locked.
    pub async fn with_session<R>(&self, f: impl FnOnce(&mut Session) -> R) -> R {
        let mut session = self.session.lock().await;
        f(&mut session)
    }

    // ---------------------------------------------------------------
    // Projects
    // ---------------------------------------------------------------

    store_op!(open_project(name: &str, flags: OpenFlags) -> (), Some(EventKind::ProjectOpened));
    store_op!(close_project() -> (), Some(EventKind::ProjectClosed));
    store_op!(create_project(name: &str) -> ProjectInfo, None);
    store_op!(copy_project(source: &str, target: &str) -> (), None);
    store_op!(delete_project(name: &str) -> (), None);
    store_op!(list_projects() -> Vec<String>, None);
    store_op!(export_project(name: &str) -> Vec<u8>, None);
    store_op!(import_project(name: &str, archive: &[u8]) -> (), None);

    // ---------------------------------------------------------------
    // Tree queries
    // ---------------------------------------------------------------

    /// Snapshot of the open project's tree.
    pub async fn tree_snapshot(&self) -> StoreResult<TreeNode> {
        let session = self.session.lock().await;
        let result = session.tree().and_then(|tree| Ok(tree.to_node()?));
        finish(&session, None, result)
    }

    pub async fn find_item(&self, path: &str) -> StoreResult<ItemHandle> {
        let session = self.session.lock().await;
        let result = session.find_item(path);
        finish(&session, None, result)
    }

    store_op!(get_previews(items: &[ItemHandle]) -> Vec<Option<Vec<u8>>>, None);

    // ---------------------------------------------------------------
    // Items
    // ---------------------------------------------------------------

    store_op!(save(requests: Vec<SaveRequest>, is_user_action: bool) -> Vec<ItemHandle>, Some(EventKind::Saved));
    store_op!(load(items: &[ItemHandle]) -> LoadOutcome, Some(EventKind::Loaded));

    pub async fn unload(&self, items: &[ItemHandle]) -> StoreResult<usize> {
        let mut session = self.session.lock().await;
        let result = session.unload(items);
        finish(&session, Some(EventKind::Unloaded), result)
    }

    pub async fn unload_all(&self) -> StoreResult<usize> {
        let mut session = self.session.lock().await;
        let result = session.unload_all();
        finish(&session, Some(EventKind::Unloaded), result)
    }

    store_op!(duplicate(items: &[ItemHandle]) -> Vec<ItemHandle>, Some(EventKind::Duplicated));
    store_op!(move_items(items: &[ItemHandle], folder: ItemHandle) -> (), Some(EventKind::Moved));
    store_op!(rename(item: ItemHandle, new_name: &str) -> (), Some(EventKind::Renamed));
    store_op!(delete(items: &[ItemHandle]) -> (), Some(EventKind::Deleted));
    store_op!(create_folder(parent: ItemHandle, name: &str) -> ItemHandle, Some(EventKind::FolderCreated));
    store_op!(get_or_create_folder(path: &str) -> (ItemHandle, Vec<ItemHandle>), Some(EventKind::FolderCreated));

    // ---------------------------------------------------------------
    // Libraries
    // ---------------------------------------------------------------

    store_op!(load_library(source: &LibrarySource) -> LibraryRef, Some(EventKind::LibraryLoaded));
    store_op!(load_import_items(source: &LibrarySource) -> ImportTree, None);
    store_op!(import(candidates: &[ImportCandidate]) -> Vec<ItemHandle>, Some(EventKind::Imported));
}
