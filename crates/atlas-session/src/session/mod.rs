//! The session orchestrator.
//!
//! A [`Session`] owns everything one open project needs: the project tree,
//! the registry of live objects, the dynamic identifier allocator and the
//! bookkeeping of loaded libraries. Durable state lives behind the
//! [`Storage`] capability and blobs are encoded by a [`Serializer`].
//!
//! Mutating operations follow one pattern: validate and plan in memory,
//! perform the backend call(s), check the cancellation signal, then apply
//! the in-memory changes. A cancelled or failed backend call therefore
//! leaves the tree, cache and registry as they were before the step.
//!
//! Sessions are not synchronized. Concurrent callers go through
//! [`ProjectStore`](crate::ProjectStore), which serializes every operation
//! behind one lock.

mod edit;
mod load;
mod save;

use std::collections::BTreeMap;
use std::sync::Arc;

use atlas_library::{BundleDescriptor, LibraryCatalog, LibraryProvider, CATALOG_KEY};
use atlas_registry::{DynamicIdAllocator, LiveObject, ObjectHandle, Registry, TypeCatalog};
use atlas_storage::{read_value, read_values, Storage, StoredValue};
use atlas_tree::{ItemHandle, ProjectTree};
use atlas_types::{
    AssetId, AssetMeta, CancelSignal, CancellationSource, LibraryRef, PersistentKind, ProjectInfo, TypeTag,
};
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::{SessionError, SessionResult};
use crate::events::{EventBus, EventKind, EventStream, SessionEvent};
use crate::resolver::LoadedLibrary;
use crate::serializer::{BincodeSerializer, Serializer};

pub use load::{LoadOutcome, Loaded};
pub use save::{SaveRequest, SaveSource, SaveTarget};

/// Lifecycle of the session's project.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionState {
    Closed,
    Opening,
    Open,
    Closing,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Closed => "closed",
            Self::Opening => "opening",
            Self::Open => "open",
            Self::Closing => "closing",
        };
        write!(f, "{s}")
    }
}

/// Options for [`Session::open_project`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OpenFlags {
    /// Create the project when the backend does not know it.
    pub create_if_missing: bool,
    /// Destroy the live objects of the project being closed, if any.
    pub destroy_objects: bool,
}

impl Default for OpenFlags {
    fn default() -> Self {
        Self {
            create_if_missing: false,
            destroy_objects: true,
        }
    }
}

impl OpenFlags {
    pub fn create() -> Self {
        Self {
            create_if_missing: true,
            ..Self::default()
        }
    }
}

/// State that exists only while a project is open.
#[derive(Debug)]
pub(crate) struct OpenProject {
    pub(crate) name: String,
    pub(crate) info: ProjectInfo,
    pub(crate) tree: ProjectTree,
    pub(crate) allocator: DynamicIdAllocator,
    pub(crate) catalog: LibraryCatalog,
    /// Bundle descriptors by ordinal.
    pub(crate) bundles: BTreeMap<u32, BundleDescriptor>,
    pub(crate) loaded: BTreeMap<LibraryRef, LoadedLibrary>,
    /// The live scene. Scene loads replace its content, never the handle.
    pub(crate) scene: ObjectHandle,
}

struct ProjectSnapshot {
    info: ProjectInfo,
    tree: ProjectTree,
    allocator: DynamicIdAllocator,
    catalog: LibraryCatalog,
    bundles: BTreeMap<u32, BundleDescriptor>,
}

pub struct Session {
    pub(crate) config: SessionConfig,
    pub(crate) storage: Arc<dyn Storage>,
    pub(crate) provider: Arc<dyn LibraryProvider>,
    pub(crate) serializer: Arc<dyn Serializer>,
    pub(crate) types: TypeCatalog,
    pub(crate) scene_tag: TypeTag,
    pub(crate) registry: Registry,
    pub(crate) events: EventBus,
    pub(crate) cancellation: CancellationSource,
    pub(crate) state: SessionState,
    pub(crate) revision: u64,
    pub(crate) project: Option<OpenProject>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("project", &self.project.as_ref().map(|p| p.name.as_str()))
            .field("revision", &self.revision)
            .field("mapped", &self.registry.len())
            .finish()
    }
}

impl Session {
    /// A closed session. The scene type named in `config` is registered in
    /// `types` if it is missing.
    pub fn new(
        config: SessionConfig,
        storage: Arc<dyn Storage>,
        provider: Arc<dyn LibraryProvider>,
        mut types: TypeCatalog,
    ) -> Self {
        let scene_tag = TypeTag::from_name(&config.scene_type_name);
        if !types.is_scene(scene_tag) {
            types.register_named(&config.scene_type_name, PersistentKind::Scene, ".scene");
        }
        Self {
            events: EventBus::new(config.event_capacity),
            config,
            storage,
            provider,
            serializer: Arc::new(BincodeSerializer),
            types,
            scene_tag,
            registry: Registry::new(),
            cancellation: CancellationSource::new(),
            state: SessionState::Closed,
            revision: 0,
            project: None,
        }
    }

    pub fn with_serializer(mut self, serializer: Arc<dyn Serializer>) -> Self {
        self.serializer = serializer;
        self
    }

    // ---------------------------------------------------------------
    // Accessors
    // ---------------------------------------------------------------

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == SessionState::Open
    }

    /// Number of completed mutating operations.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn project_name(&self) -> Option<&str> {
        self.project.as_ref().map(|p| p.name.as_str())
    }

    pub fn info(&self) -> SessionResult<&ProjectInfo> {
        self.project().map(|p| &p.info)
    }

    pub fn tree(&self) -> SessionResult<&ProjectTree> {
        self.project().map(|p| &p.tree)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn types(&self) -> &TypeCatalog {
        &self.types
    }

    /// Item at a `/`-separated path starting with the root folder name.
    pub fn find_item(&self, path: &str) -> SessionResult<ItemHandle> {
        self.tree()?
            .get(path)
            .ok_or_else(|| SessionError::NotFound(path.to_string()))
    }

    /// The tree item that owns `id`, either as its own id or embedded.
    pub fn item_of(&self, id: AssetId) -> SessionResult<Option<ItemHandle>> {
        Ok(self.tree()?.find(id))
    }

    pub fn subscribe(&self) -> EventStream {
        self.events.subscribe()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn cancellation(&self) -> &CancellationSource {
        &self.cancellation
    }

    /// Cancel every in-flight operation, then renew the session signal so
    /// later operations start uncancelled.
    pub fn cancel_all(&self) {
        info!("cancelling all session operations");
        self.cancellation.cancel();
        self.cancellation.renew();
    }

    // ---------------------------------------------------------------
    // Internal helpers
    // ---------------------------------------------------------------

    pub(crate) fn project(&self) -> SessionResult<&OpenProject> {
        match (self.state, self.project.as_ref()) {
            (SessionState::Open, Some(project)) => Ok(project),
            _ => Err(SessionError::NotOpen),
        }
    }

    pub(crate) fn project_mut(&mut self) -> SessionResult<&mut OpenProject> {
        match (self.state, self.project.as_mut()) {
            (SessionState::Open, Some(project)) => Ok(project),
            _ => Err(SessionError::NotOpen),
        }
    }

    /// The caller's signal linked with the session signal.
    pub(crate) fn signal(&self, cancel: &CancelSignal) -> CancelSignal {
        cancel.linked(&self.cancellation.signal())
    }

    pub(crate) fn check(signal: &CancelSignal) -> SessionResult<()> {
        if signal.is_cancelled() {
            Err(SessionError::Cancelled)
        } else {
            Ok(())
        }
    }

    pub(crate) fn open_name(&self) -> SessionResult<String> {
        self.project().map(|p| p.name.clone())
    }

    /// Record a completed mutation: bump the revision and publish.
    pub(crate) fn completed(&mut self, kind: EventKind, items: Vec<ItemHandle>, user_action: bool) {
        self.revision += 1;
        let event = SessionEvent {
            kind,
            project: self.project_name().unwrap_or_default().to_string(),
            items,
            revision: self.revision,
            error: None,
            user_action,
        };
        self.events.publish(event);
    }

    /// Publish the failure of an operation. The revision is unchanged.
    pub(crate) fn failed(&self, kind: EventKind, error: &SessionError) {
        self.events.publish(SessionEvent {
            kind,
            project: self.project_name().unwrap_or_default().to_string(),
            items: Vec::new(),
            revision: self.revision,
            error: Some(error.to_string()),
            user_action: false,
        });
    }

    pub(crate) fn scene_handle(&self) -> SessionResult<ObjectHandle> {
        self.project().map(|p| p.scene)
    }

    /// Drop the registry entries of one asset.
    ///
    /// Session-owned objects are destroyed and library-owned ones unmapped;
    /// with `dynamic_only` set, library-owned ids keep their mapping. The
    /// live scene is only unmapped and emptied.
    pub(crate) fn release_asset(&mut self, meta: &AssetMeta, dynamic_only: bool) -> usize {
        let scene = self.project.as_ref().map(|p| p.scene);
        let mut released = 0;
        for id in meta.all_ids() {
            if dynamic_only && !id.is_dynamic() {
                continue;
            }
            let Some(handle) = self.registry.handle(id) else {
                continue;
            };
            if Some(handle) == scene {
                self.registry.unmap(id);
                self.clear_scene();
            } else {
                self.registry.unregister(id);
            }
            released += 1;
        }
        if released > 0 {
            debug!(id = %meta.id, released, "released asset");
        }
        released
    }

    /// Empty the live scene. Embedded members are destroyed (library-owned
    /// ones only unmapped); members saved as their own items stay live.
    pub(crate) fn clear_scene(&mut self) {
        let Some(project) = self.project.as_ref() else {
            return;
        };
        let parts = match self.registry.objects_mut().get_mut(project.scene) {
            Some(object) => {
                object.references.clear();
                std::mem::take(&mut object.parts)
            }
            None => return,
        };
        for part in parts {
            let id = self.registry.id_of(part);
            let linked = id
                .and_then(|id| project.tree.find(id))
                .and_then(|item| project.tree.meta(item))
                .is_some_and(|meta| !self.types.is_scene(meta.type_tag));
            match id {
                _ if linked => {}
                Some(id) => {
                    self.registry.unregister(id);
                }
                None => {
                    self.registry.objects_mut().remove(part);
                }
            }
        }
    }

    // ---------------------------------------------------------------
    // Open / close
    // ---------------------------------------------------------------

    /// Open `name`, closing the current project first.
    pub async fn open_project(&mut self, name: &str, flags: OpenFlags, cancel: &CancelSignal) -> SessionResult<()> {
        if self.project.is_some() {
            self.close_project_with(flags.destroy_objects, cancel).await?;
        }
        let signal = self.signal(cancel);
        self.state = SessionState::Opening;
        let snapshot = match self.read_project(name, flags, &signal).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.state = SessionState::Closed;
                return Err(e);
            }
        };

        let scene = self
            .registry
            .objects_mut()
            .insert(LiveObject::new(self.config.scene_type_name.clone(), self.scene_tag));
        let root = snapshot.tree.root();
        info!(
            project = name,
            items = snapshot.tree.len(),
            dynamic_ordinal = snapshot.allocator.ordinal(),
            "opened project"
        );
        self.project = Some(OpenProject {
            name: name.to_string(),
            info: snapshot.info,
            tree: snapshot.tree,
            allocator: snapshot.allocator,
            catalog: snapshot.catalog,
            bundles: snapshot.bundles,
            loaded: BTreeMap::new(),
            scene,
        });
        self.state = SessionState::Open;
        self.completed(EventKind::ProjectOpened, vec![root], false);
        Ok(())
    }

    async fn read_project(&self, name: &str, flags: OpenFlags, signal: &CancelSignal) -> SessionResult<ProjectSnapshot> {
        let storage = Arc::clone(&self.storage);
        let mut info = match storage.get_project_info(name, signal).await {
            Ok(info) => info,
            Err(e) if e.is_not_found() && flags.create_if_missing => {
                let info = ProjectInfo::new(name);
                storage.create_project(name, &info, signal).await?;
                info!(project = name, "created project");
                info
            }
            Err(e) => return Err(e.into()),
        };
        Self::check(signal)?;

        let catalog: LibraryCatalog = read_value(storage.as_ref(), name, CATALOG_KEY, signal)
            .await?
            .unwrap_or_default();
        let bundles: BTreeMap<u32, BundleDescriptor> =
            read_values::<BundleDescriptor, _>(storage.as_ref(), name, "*", signal)
                .await?
                .into_iter()
                .map(|(_, d)| (d.ordinal, d))
                .collect();
        let node = storage.get_project_tree(name, &self.config.root_folder, signal).await?;
        Self::check(signal)?;
        let tree = ProjectTree::from_node(&node, self.config.case_insensitive_paths)?;

        // The reserved ordinal is persisted so no other session reuses it.
        let allocator = DynamicIdAllocator::reserve(&mut info)?;
        storage.save_project_info(name, &info, signal).await?;
        Self::check(signal)?;

        Ok(ProjectSnapshot {
            info,
            tree,
            allocator,
            catalog,
            bundles,
        })
    }

    /// Close the open project, destroying its objects if the configuration
    /// says so.
    pub async fn close_project(&mut self, cancel: &CancelSignal) -> SessionResult<()> {
        let destroy = self.config.destroy_on_close;
        self.close_project_with(destroy, cancel).await
    }

    /// Close the open project. Without `destroy_objects` live objects are
    /// only unmapped and their handles stay valid.
    pub async fn close_project_with(&mut self, destroy_objects: bool, cancel: &CancelSignal) -> SessionResult<()> {
        let signal = self.signal(cancel);
        let (name, info) = {
            let project = self.project_mut()?;
            project.info.touch();
            (project.name.clone(), project.info.clone())
        };
        self.state = SessionState::Closing;
        if let Err(e) = self.storage.save_project_info(&name, &info, &signal).await {
            // Closing proceeds; the counters were persisted when minted.
            warn!(project = %name, error = %e, "failed to persist project info on close");
        }

        let root = self.project.as_ref().map(|p| p.tree.root());
        if let Some(project) = self.project.take() {
            self.teardown(project, destroy_objects);
        }
        self.state = SessionState::Closed;
        info!(project = %name, destroy_objects, "closed project");
        self.completed(EventKind::ProjectClosed, root.into_iter().collect(), false);
        Ok(())
    }

    fn teardown(&mut self, project: OpenProject, destroy_objects: bool) {
        let ids: Vec<AssetId> = project
            .loaded
            .values()
            .flat_map(|lib| lib.ids.keys().copied())
            .chain(self.registry.dynamic_ids())
            .collect();
        for id in ids {
            let Some(handle) = self.registry.unmap(id) else {
                continue;
            };
            if destroy_objects {
                self.registry.objects_mut().remove(handle);
            }
        }
        if destroy_objects {
            if let Some(scene) = self.registry.objects_mut().remove(project.scene) {
                for part in scene.parts {
                    self.registry.objects_mut().remove(part);
                }
            }
        }
    }

    // ---------------------------------------------------------------
    // Project-level operations
    // ---------------------------------------------------------------

    pub async fn create_project(&self, name: &str, cancel: &CancelSignal) -> SessionResult<ProjectInfo> {
        let signal = self.signal(cancel);
        let info = ProjectInfo::new(name);
        self.storage.create_project(name, &info, &signal).await?;
        info!(project = name, "created project");
        Ok(info)
    }

    pub async fn copy_project(&self, source: &str, target: &str, cancel: &CancelSignal) -> SessionResult<()> {
        let signal = self.signal(cancel);
        self.storage.copy_project(source, target, &signal).await?;
        info!(source, target, "copied project");
        Ok(())
    }

    /// Delete a project. The open project cannot be deleted.
    pub async fn delete_project(&self, name: &str, cancel: &CancelSignal) -> SessionResult<()> {
        if self.project_name() == Some(name) {
            return Err(SessionError::InvalidOperation(format!("project {name} is open")));
        }
        let signal = self.signal(cancel);
        self.storage.delete_project(name, &signal).await?;
        info!(project = name, "deleted project");
        Ok(())
    }

    pub async fn list_projects(&self, cancel: &CancelSignal) -> SessionResult<Vec<String>> {
        let signal = self.signal(cancel);
        Ok(self.storage.list_projects(&signal).await?)
    }

    pub async fn export_project(&self, name: &str, cancel: &CancelSignal) -> SessionResult<Vec<u8>> {
        let signal = self.signal(cancel);
        Ok(self.storage.export_project(name, &signal).await?)
    }

    pub async fn import_project(&self, name: &str, archive: &[u8], cancel: &CancelSignal) -> SessionResult<()> {
        let signal = self.signal(cancel);
        self.storage.import_project(name, archive, &signal).await?;
        info!(project = name, bytes = archive.len(), "imported project archive");
        Ok(())
    }

    // ---------------------------------------------------------------
    // Key/value namespace
    // ---------------------------------------------------------------

    pub async fn get_value<T: StoredValue>(&self, key: &str, cancel: &CancelSignal) -> SessionResult<Option<T>> {
        let name = self.open_name()?;
        let signal = self.signal(cancel);
        Ok(read_value(self.storage.as_ref(), &name, key, &signal).await?)
    }

    pub async fn set_value<T: StoredValue>(&self, key: &str, value: &T, cancel: &CancelSignal) -> SessionResult<()> {
        let name = self.open_name()?;
        let signal = self.signal(cancel);
        Ok(atlas_storage::write_value(self.storage.as_ref(), &name, key, value, &signal).await?)
    }

    pub async fn delete_value<T: StoredValue>(&self, key: &str, cancel: &CancelSignal) -> SessionResult<()> {
        let name = self.open_name()?;
        let signal = self.signal(cancel);
        Ok(atlas_storage::delete_value::<T, _>(self.storage.as_ref(), &name, key, &signal).await?)
    }

    // ---------------------------------------------------------------
    // Previews
    // ---------------------------------------------------------------

    /// Preview bytes of each item; `None` for folders and items without one.
    pub async fn get_previews(&self, items: &[ItemHandle], cancel: &CancelSignal) -> SessionResult<Vec<Option<Vec<u8>>>> {
        let project = self.project()?;
        let mut paths = Vec::new();
        let mut slots = Vec::with_capacity(items.len());
        for item in items {
            if project.tree.item(*item)?.is_folder() {
                slots.push(None);
            } else {
                slots.push(Some(paths.len()));
                paths.push(project.tree.path_of(*item)?);
            }
        }
        let name = project.name.clone();
        let signal = self.signal(cancel);
        let mut fetched = self.storage.get_previews(&name, &paths, &signal).await?;
        Self::check(&signal)?;
        Ok(slots
            .into_iter()
            .map(|slot| slot.and_then(|i| fetched.get_mut(i).and_then(Option::take)))
            .collect())
    }

    /// Previews of the assets directly inside each folder whose file name
    /// matches `pattern`, keyed by item.
    pub async fn get_previews_per_folder(
        &self,
        folders: &[ItemHandle],
        pattern: &str,
        cancel: &CancelSignal,
    ) -> SessionResult<Vec<Vec<(ItemHandle, Vec<u8>)>>> {
        let project = self.project()?;
        let mut paths = Vec::with_capacity(folders.len());
        for folder in folders {
            if !project.tree.is_folder(*folder) {
                return Err(atlas_tree::TreeError::NotAFolder(project.tree.path_of(*folder)?).into());
            }
            paths.push(project.tree.path_of(*folder)?);
        }
        let name = project.name.clone();
        let signal = self.signal(cancel);
        let fetched = self.storage.get_previews_per_folder(&name, &paths, pattern, &signal).await?;
        Self::check(&signal)?;

        let tree = &self.project()?.tree;
        Ok(fetched
            .into_iter()
            .map(|entries| {
                entries
                    .into_iter()
                    .filter_map(|(path, bytes)| tree.get(&path).map(|item| (item, bytes)))
                    .collect()
            })
            .collect())
    }

    // ---------------------------------------------------------------
    // Live objects
    // ---------------------------------------------------------------

    pub fn create_object(&mut self, object: LiveObject) -> ObjectHandle {
        self.registry.objects_mut().insert(object)
    }

    /// Add `part` to the composite `root`, hanging under `owner` (another
    /// part of `root`) or directly under the root.
    pub fn add_part(
        &mut self,
        root: ObjectHandle,
        owner: Option<ObjectHandle>,
        mut part: LiveObject,
    ) -> SessionResult<ObjectHandle> {
        let parts = &self.registry.objects().try_get(root)?.parts;
        if let Some(owner) = owner {
            if !parts.contains(&owner) {
                return Err(SessionError::InvalidOperation(format!("{owner} is not a part of {root}")));
            }
        }
        part.owner = owner;
        let handle = self.registry.objects_mut().insert(part);
        self.registry.objects_mut().try_get_mut(root)?.parts.push(handle);
        Ok(handle)
    }

    pub fn object(&self, handle: ObjectHandle) -> Option<&LiveObject> {
        self.registry.objects().get(handle)
    }

    pub fn object_mut(&mut self, handle: ObjectHandle) -> Option<&mut LiveObject> {
        self.registry.objects_mut().get_mut(handle)
    }

    pub fn id_of(&self, handle: ObjectHandle) -> Option<AssetId> {
        self.registry.id_of(handle)
    }

    pub fn handle_of(&self, id: AssetId) -> Option<ObjectHandle> {
        self.registry.handle(id)
    }

    /// Destroy a session-owned object and its parts, unregistering any ids
    /// they are mapped under.
    pub fn destroy_object(&mut self, handle: ObjectHandle) -> SessionResult<()> {
        if self.project.as_ref().is_some_and(|p| p.scene == handle) {
            return Err(SessionError::InvalidOperation("the live scene cannot be destroyed".into()));
        }
        if let Some(id) = self.registry.id_of(handle) {
            if !id.is_dynamic() {
                return Err(SessionError::InvalidOperation(format!(
                    "object {id} is owned by its library"
                )));
            }
        }
        let parts = self.registry.objects().try_get(handle)?.parts.clone();
        for target in parts.into_iter().chain(std::iter::once(handle)) {
            match self.registry.id_of(target) {
                Some(id) => {
                    self.registry.unregister(id);
                }
                None => {
                    self.registry.objects_mut().remove(target);
                }
            }
        }
        if let Ok(scene) = self.scene_handle() {
            if let Some(scene) = self.registry.objects_mut().get_mut(scene) {
                scene.parts.retain(|p| *p != handle);
            }
        }
        debug!(%handle, "destroyed object");
        Ok(())
    }

    /// The live scene of the open project.
    pub fn scene(&self) -> SessionResult<ObjectHandle> {
        self.scene_handle()
    }

    /// Put `object` into the live scene.
    pub fn add_to_scene(&mut self, object: ObjectHandle) -> SessionResult<()> {
        let scene = self.scene_handle()?;
        if object == scene {
            return Err(SessionError::InvalidOperation("the scene cannot contain itself".into()));
        }
        self.registry.objects_mut().try_get_mut(object)?.owner = None;
        let scene = self.registry.objects_mut().try_get_mut(scene)?;
        if !scene.parts.contains(&object) {
            scene.parts.push(object);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixture, mesh, open, prefab};

    #[tokio::test]
    async fn open_creates_missing_project_and_reserves_ordinal() {
        let mut fx = fixture();
        assert_eq!(fx.session.state(), SessionState::Closed);
        assert!(matches!(fx.session.tree(), Err(SessionError::NotOpen)));

        let err = fx
            .session
            .open_project("demo", OpenFlags::default(), &CancelSignal::none())
            .await
            .unwrap_err();
        assert_eq!(err.code(), crate::ErrorCode::NotFound);
        assert_eq!(fx.session.state(), SessionState::Closed);

        open(&mut fx.session).await;
        assert!(fx.session.is_open());
        assert_eq!(fx.session.project_name(), Some("demo"));
        assert_eq!(fx.session.info().unwrap().next_dynamic_ordinal, 2);

        let stored = fx
            .storage
            .get_project_info("demo", &CancelSignal::none())
            .await
            .unwrap();
        assert_eq!(stored.next_dynamic_ordinal, 2);
    }

    #[tokio::test]
    async fn reopening_reserves_a_new_range() {
        let mut fx = fixture();
        open(&mut fx.session).await;
        let first = fx.session.project().unwrap().allocator.ordinal();
        fx.session.close_project(&CancelSignal::none()).await.unwrap();
        open(&mut fx.session).await;
        assert_ne!(fx.session.project().unwrap().allocator.ordinal(), first);
    }

    #[tokio::test]
    async fn close_without_destroy_keeps_handles() {
        let mut fx = fixture();
        open(&mut fx.session).await;
        let obj = fx.session.create_object(LiveObject::new("Rock", mesh()));
        fx.session
            .close_project_with(false, &CancelSignal::none())
            .await
            .unwrap();
        assert_eq!(fx.session.state(), SessionState::Closed);
        assert!(fx.session.object(obj).is_some());
    }

    #[tokio::test]
    async fn open_and_close_publish_events() {
        let mut fx = fixture();
        let mut events = fx.session.subscribe();
        open(&mut fx.session).await;
        fx.session.close_project(&CancelSignal::none()).await.unwrap();

        let opened = events.recv().await.unwrap();
        assert_eq!(opened.kind, EventKind::ProjectOpened);
        assert_eq!(opened.revision, 1);
        let closed = events.recv().await.unwrap();
        assert_eq!(closed.kind, EventKind::ProjectClosed);
        assert_eq!(closed.revision, 2);
    }

    #[tokio::test]
    async fn open_project_cannot_be_deleted() {
        let mut fx = fixture();
        open(&mut fx.session).await;
        let err = fx
            .session
            .delete_project("demo", &CancelSignal::none())
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::InvalidOperation(_)));
    }

    #[tokio::test]
    async fn project_level_operations() {
        let mut fx = fixture();
        let none = CancelSignal::none();
        fx.session.create_project("a", &none).await.unwrap();
        fx.session.copy_project("a", "b", &none).await.unwrap();
        let archive = fx.session.export_project("b", &none).await.unwrap();
        fx.session.import_project("c", &archive, &none).await.unwrap();
        assert_eq!(fx.session.list_projects(&none).await.unwrap(), vec!["a", "b", "c"]);

        let err = fx.session.import_project("c", &archive, &none).await.unwrap_err();
        assert_eq!(err.code(), crate::ErrorCode::AlreadyExists);

        fx.session.delete_project("a", &none).await.unwrap();
        fx.session
            .open_project("c", OpenFlags::default(), &none)
            .await
            .unwrap();
        assert_eq!(fx.session.project_name(), Some("c"));
    }

    #[tokio::test]
    async fn typed_values_round_trip() {
        let mut fx = fixture();
        open(&mut fx.session).await;
        let none = CancelSignal::none();
        let catalog = LibraryCatalog::new();
        fx.session.set_value("Custom", &catalog, &none).await.unwrap();
        let back: Option<LibraryCatalog> = fx.session.get_value("Custom", &none).await.unwrap();
        assert_eq!(back, Some(catalog));
        fx.session.delete_value::<LibraryCatalog>("Custom", &none).await.unwrap();
        let gone: Option<LibraryCatalog> = fx.session.get_value("Custom", &none).await.unwrap();
        assert!(gone.is_none());
    }

    #[tokio::test]
    async fn parts_and_scene_membership() {
        let mut fx = fixture();
        open(&mut fx.session).await;
        let root = fx.session.create_object(LiveObject::new("Crate", prefab()));
        let lid = fx.session.add_part(root, None, LiveObject::new("Lid", mesh())).unwrap();
        let knob = fx.session.add_part(root, Some(lid), LiveObject::new("Knob", mesh())).unwrap();
        assert_eq!(fx.session.object(root).unwrap().parts, vec![lid, knob]);
        assert_eq!(fx.session.object(knob).unwrap().owner, Some(lid));

        let stray = fx.session.create_object(LiveObject::new("Stray", mesh()));
        assert!(fx.session.add_part(root, Some(stray), LiveObject::new("X", mesh())).is_err());

        fx.session.add_to_scene(root).unwrap();
        fx.session.add_to_scene(root).unwrap();
        let scene = fx.session.scene().unwrap();
        assert_eq!(fx.session.object(scene).unwrap().parts, vec![root]);

        fx.session.destroy_object(root).unwrap();
        assert!(fx.session.object(root).is_none());
        assert!(fx.session.object(lid).is_none());
        assert!(fx.session.object(scene).unwrap().parts.is_empty());
        assert!(fx.session.destroy_object(scene).is_err());
    }
}
