//! Change notifications.
//!
//! Every completed (or failed) mutating operation publishes one
//! [`SessionEvent`] on a broadcast channel. Publishing never blocks and an
//! event with no subscriber is dropped.

use atlas_tree::ItemHandle;
use tokio::sync::broadcast;
use tracing::trace;

/// Which operation an event reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    ProjectOpened,
    ProjectClosed,
    Saved,
    Loaded,
    Unloaded,
    Duplicated,
    Moved,
    Renamed,
    Deleted,
    FolderCreated,
    Imported,
    LibraryLoaded,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ProjectOpened => "ProjectOpened",
            Self::ProjectClosed => "ProjectClosed",
            Self::Saved => "Saved",
            Self::Loaded => "Loaded",
            Self::Unloaded => "Unloaded",
            Self::Duplicated => "Duplicated",
            Self::Moved => "Moved",
            Self::Renamed => "Renamed",
            Self::Deleted => "Deleted",
            Self::FolderCreated => "FolderCreated",
            Self::Imported => "Imported",
            Self::LibraryLoaded => "LibraryLoaded",
        };
        write!(f, "{s}")
    }
}

/// One change notification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionEvent {
    pub kind: EventKind,
    /// Project the operation ran against. Empty when none was open.
    pub project: String,
    /// Affected tree items. For deletions these handles are already stale.
    pub items: Vec<ItemHandle>,
    /// Session revision after the operation.
    pub revision: u64,
    /// Failure text, `None` on success.
    pub error: Option<String>,
    /// Set when the operation ran on behalf of a user action.
    pub user_action: bool,
}

impl SessionEvent {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// A broadcast receiver of session events.
pub type EventStream = broadcast::Receiver<SessionEvent>;

/// Sending half of the event channel. Clones publish to the same channel.
#[derive(Clone, Debug)]
pub struct EventBus {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> EventStream {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn publish(&self, event: SessionEvent) {
        trace!(kind = %event.kind, revision = event.revision, ok = event.is_success(), "publishing event");
        // No receivers is not an error.
        let _ = self.sender.send(event);
    }
}
