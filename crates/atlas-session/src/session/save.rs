//! Saving live objects.
//!
//! A save runs in three phases:
//!
//! 1. **Plan** (no suspension): resolve each request's target and mint
//!    missing identifiers for the whole batch against scratch copies of the
//!    project counters, then capture every persistent form and compute its
//!    dependencies against those identifiers. Any failure here
//!    (`InvalidOverride`, `IdentifiersExhausted`, ...) aborts before a byte
//!    is written.
//! 2. **Write**: one `Storage::save` call for the whole batch.
//! 3. **Apply**: register new identifiers and update the tree and cache.

use std::collections::{BTreeSet, HashMap, HashSet};

use atlas_registry::{DynamicIdAllocator, ObjectHandle};
use atlas_storage::{ItemRecord, SaveBatch};
use atlas_tree::{ItemHandle, ProjectTree, TreeError};
use atlas_types::{
    AssetId, AssetMeta, CancelSignal, EmbeddedPart, PersistentForm, PersistentKind, PersistentRecord, ProjectInfo,
    TypeTag,
};
use tracing::{debug, info};

use super::Session;
use crate::error::{SessionError, SessionResult};
use crate::events::EventKind;

/// Where a saved object goes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaveTarget {
    /// Overwrite an existing asset item. The object must already be mapped
    /// to that item's identifier.
    Existing(ItemHandle),
    /// Create a new asset item inside a folder.
    Folder(ItemHandle),
}

/// What is saved.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaveSource {
    Object(ObjectHandle),
    /// The live scene.
    Scene,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SaveRequest {
    pub target: SaveTarget,
    pub source: SaveSource,
    pub preview: Option<Vec<u8>>,
    /// Item name for new items. Defaults to the object's name.
    pub name: Option<String>,
}

impl SaveRequest {
    pub fn new_in(folder: ItemHandle, object: ObjectHandle) -> Self {
        Self {
            target: SaveTarget::Folder(folder),
            source: SaveSource::Object(object),
            preview: None,
            name: None,
        }
    }

    pub fn overwrite(item: ItemHandle, object: ObjectHandle) -> Self {
        Self {
            target: SaveTarget::Existing(item),
            source: SaveSource::Object(object),
            preview: None,
            name: None,
        }
    }

    pub fn scene(target: SaveTarget) -> Self {
        Self {
            target,
            source: SaveSource::Scene,
            preview: None,
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_preview(mut self, preview: Vec<u8>) -> Self {
        self.preview = Some(preview);
        self
    }
}

/// A request with its target resolved and identifiers claimed.
struct Intent {
    target: SaveTarget,
    handle: ObjectHandle,
    kind: PersistentKind,
    type_tag: TypeTag,
    extension: String,
    folder: ItemHandle,
    item_name: String,
    id: AssetId,
    previous: Option<(ItemHandle, AssetMeta)>,
    part_handles: Vec<ObjectHandle>,
    linked: Vec<ObjectHandle>,
    embedded_ids: Vec<AssetId>,
    registrations: Vec<(AssetId, ObjectHandle)>,
    preview: Option<Vec<u8>>,
}

/// One planned write.
struct Prepared {
    target: SaveTarget,
    folder_path: String,
    record: ItemRecord,
    blob: Vec<u8>,
    /// Identifiers to map once the write succeeded.
    registrations: Vec<(AssetId, ObjectHandle)>,
    /// Embedded identifiers of the previous version that are gone now.
    dropped_parts: Vec<AssetId>,
}

/// Scratch counters the plan mints from.
struct Minting {
    info: ProjectInfo,
    allocator: DynamicIdAllocator,
}

/// Record the identifier `handle` is saved under in this batch.
fn claim(planned: &mut HashMap<ObjectHandle, AssetId>, handle: ObjectHandle, id: AssetId) -> SessionResult<()> {
    if planned.insert(handle, id).is_some() {
        return Err(SessionError::InvalidOperation(format!(
            "object {handle} is saved more than once in one batch"
        )));
    }
    Ok(())
}

pub(super) fn check_name(name: &str) -> SessionResult<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(TreeError::InvalidName(name.to_string()).into());
    }
    Ok(())
}

/// `base`, `base 1`, `base 2`, ... skipping names taken in the tree or by
/// earlier requests of the same batch.
pub(super) fn reserve_name(
    tree: &ProjectTree,
    folder: ItemHandle,
    base: &str,
    extension: &str,
    taken: &mut HashSet<String>,
) -> String {
    let fold = |s: String| if tree.is_case_insensitive() { s.to_lowercase() } else { s };
    let mut n = 0u64;
    loop {
        let candidate = if n == 0 { base.to_string() } else { format!("{base} {n}") };
        let file_name = format!("{candidate}{extension}");
        if tree.child_named(folder, &file_name).is_none() && taken.insert(fold(file_name)) {
            return candidate;
        }
        n += 1;
    }
}

impl Session {
    /// Persist live objects as asset items. Returns the written items in
    /// request order.
    pub async fn save(
        &mut self,
        requests: Vec<SaveRequest>,
        is_user_action: bool,
        cancel: &CancelSignal,
    ) -> SessionResult<Vec<ItemHandle>> {
        let signal = self.signal(cancel);
        let project = self.project()?;
        if requests.is_empty() {
            return Ok(Vec::new());
        }
        let name = project.name.clone();
        let mut minting = Minting {
            info: project.info.clone(),
            allocator: project.allocator.clone(),
        };

        let mut taken: HashMap<ItemHandle, HashSet<String>> = HashMap::new();
        let mut planned: HashMap<ObjectHandle, AssetId> = HashMap::new();
        let mut intents = Vec::with_capacity(requests.len());
        for request in requests {
            intents.push(self.plan(request, &mut minting, &mut taken, &mut planned)?);
        }
        let mut prepared = Vec::with_capacity(intents.len());
        for intent in intents {
            prepared.push(self.prepare(intent, &planned)?);
        }
        minting.info.touch();

        let batch = SaveBatch {
            folder_paths: prepared.iter().map(|p| p.folder_path.clone()).collect(),
            items: prepared.iter().map(|p| p.record.clone()).collect(),
            blobs: prepared.iter_mut().map(|p| std::mem::take(&mut p.blob)).collect(),
            info: minting.info.clone(),
            preview_only: false,
        };
        self.storage.save(&name, &batch, &signal).await?;

        // The written counters are durable now, so keep them even if the
        // rest of the step is cancelled.
        {
            let project = self.project_mut()?;
            project.info = minting.info;
            project.allocator = minting.allocator;
        }
        Self::check(&signal)?;

        let mut items = Vec::with_capacity(prepared.len());
        for plan in prepared {
            items.push(self.apply(plan)?);
        }
        info!(project = %name, count = items.len(), is_user_action, "saved items");
        self.completed(EventKind::Saved, items.clone(), is_user_action);
        Ok(items)
    }

    /// First pass: resolve the target and claim identifiers for the root
    /// and every embedded part. Every handle may appear once per batch.
    fn plan(
        &self,
        request: SaveRequest,
        minting: &mut Minting,
        taken: &mut HashMap<ItemHandle, HashSet<String>>,
        planned: &mut HashMap<ObjectHandle, AssetId>,
    ) -> SessionResult<Intent> {
        let project = self.project()?;
        let tree = &project.tree;
        let handle = match request.source {
            SaveSource::Object(handle) => handle,
            SaveSource::Scene => project.scene,
        };
        let object = self.registry.objects().try_get(handle)?;
        let type_tag = if handle == project.scene { self.scene_tag } else { object.type_tag };
        let type_info = self.types.info(type_tag)?;
        let kind = type_info.kind;
        let extension = type_info.extension.clone();
        let mapped = self.registry.id_of(handle);
        let mut registrations = Vec::new();

        let (folder, item_name, id, previous) = match request.target {
            SaveTarget::Existing(item) => {
                let node = tree.item(item)?;
                let meta = node
                    .meta()
                    .ok_or_else(|| SessionError::InvalidOperation(format!("{} is a folder", node.name)))?;
                if mapped != Some(meta.id) {
                    return Err(SessionError::InvalidOverride {
                        item: meta.id,
                        object: mapped,
                    });
                }
                let parent = node.parent().ok_or(TreeError::IsRoot)?;
                (parent, node.name.clone(), meta.id, Some((item, meta.clone())))
            }
            SaveTarget::Folder(folder) => {
                if !tree.is_folder(folder) {
                    return Err(TreeError::NotAFolder(tree.path_of(folder)?).into());
                }
                if let Some(owner) = mapped.and_then(|id| tree.find(id)) {
                    return Err(SessionError::InvalidOperation(format!(
                        "object is already saved as {}",
                        tree.path_of(owner)?
                    )));
                }
                let base = request.name.clone().unwrap_or_else(|| object.name.clone());
                check_name(&base)?;
                let item_name = reserve_name(tree, folder, &base, &extension, taken.entry(folder).or_default());
                let id = match mapped {
                    Some(id) => id,
                    None => {
                        let id = minting.allocator.next(&mut minting.info)?;
                        registrations.push((id, handle));
                        id
                    }
                };
                (folder, item_name, id, None)
            }
        };
        claim(planned, handle, id)?;

        let owning_item = previous.as_ref().map(|(item, _)| *item);
        let (part_handles, linked) = match kind {
            PersistentKind::Scalar => (Vec::new(), Vec::new()),
            PersistentKind::Composite => (object.parts.clone(), Vec::new()),
            PersistentKind::Scene => self.split_scene_members(&object.parts, owning_item),
        };
        let mut embedded_ids = Vec::with_capacity(part_handles.len());
        for part in &part_handles {
            let part_id = match self.registry.id_of(*part) {
                Some(part_id) => {
                    if let Some(owner) = tree.find(part_id).filter(|owner| Some(*owner) != owning_item) {
                        return Err(SessionError::InvalidOperation(format!(
                            "part {part_id} belongs to {}",
                            tree.path_of(owner)?
                        )));
                    }
                    part_id
                }
                None => {
                    let part_id = minting.allocator.next(&mut minting.info)?;
                    registrations.push((part_id, *part));
                    part_id
                }
            };
            claim(planned, *part, part_id)?;
            embedded_ids.push(part_id);
        }

        Ok(Intent {
            target: request.target,
            handle,
            kind,
            type_tag,
            extension,
            folder,
            item_name,
            id,
            previous,
            part_handles,
            linked,
            embedded_ids,
            registrations,
            preview: request.preview,
        })
    }

    /// Second pass: capture the form and dependencies against the
    /// identifiers planned for the whole batch.
    fn prepare(&self, intent: Intent, planned: &HashMap<ObjectHandle, AssetId>) -> SessionResult<Prepared> {
        let tree = &self.project()?.tree;
        let Intent {
            target,
            handle,
            kind,
            type_tag,
            extension,
            folder,
            item_name,
            id,
            previous,
            part_handles,
            linked,
            embedded_ids,
            registrations,
            preview,
        } = intent;
        let object = self.registry.objects().try_get(handle)?;

        let form = self.capture(handle, kind, &part_handles, &linked, planned)?;
        let encoded = self.serializer.serialize(&form, object.custom_data.as_deref())?;
        let dependency_ids = self.collect_dependencies(handle, &part_handles, &linked, planned);
        let library_ids = dependency_ids
            .iter()
            .filter(|dep| dep.is_library_owned())
            .filter_map(|dep| dep.library())
            .collect();

        let dropped_parts = previous
            .as_ref()
            .map(|(_, old)| {
                old.embedded_ids
                    .iter()
                    .copied()
                    .filter(|old_id| !embedded_ids.contains(old_id))
                    .collect()
            })
            .unwrap_or_default();
        let meta = AssetMeta {
            id,
            type_tag,
            dependency_ids,
            embedded_ids,
            library_ids,
            preview: preview.or_else(|| previous.as_ref().and_then(|(_, old)| old.preview.clone())),
            custom_data_offset: encoded.custom_data_offset,
        };
        debug!(%id, name = %item_name, deps = meta.dependency_ids.len(), parts = meta.embedded_ids.len(), "planned save");

        Ok(Prepared {
            target,
            folder_path: tree.path_of(folder)?,
            record: ItemRecord {
                name: item_name,
                extension,
                meta,
            },
            blob: encoded.bytes,
            registrations,
            dropped_parts,
        })
    }

    fn apply(&mut self, plan: Prepared) -> SessionResult<ItemHandle> {
        for id in plan.dropped_parts {
            self.registry.unmap(id);
        }
        for (id, handle) in plan.registrations {
            self.registry.register(id, handle)?;
        }
        let tree = &mut self.project_mut()?.tree;
        let ItemRecord { name, extension, meta } = plan.record;
        match plan.target {
            SaveTarget::Existing(item) => {
                tree.set_meta(item, meta)?;
                Ok(item)
            }
            SaveTarget::Folder(folder) => Ok(tree.add_asset(folder, &name, &extension, meta)?),
        }
    }

    /// Identifier an object is persisted under: planned for this save, or
    /// already mapped.
    fn persisted_id(&self, target: ObjectHandle, planned: &HashMap<ObjectHandle, AssetId>) -> Option<AssetId> {
        planned.get(&target).copied().or_else(|| self.registry.id_of(target))
    }

    fn record_of(
        &self,
        handle: ObjectHandle,
        planned: &HashMap<ObjectHandle, AssetId>,
    ) -> SessionResult<PersistentRecord> {
        let object = self.registry.objects().try_get(handle)?;
        let mut record = PersistentRecord::new(object.type_tag, object.name.clone());
        record.fields = object.fields.clone();
        record.references = object
            .references
            .iter()
            .map(|slot| {
                slot.and_then(|target| {
                    let id = self.persisted_id(target, planned);
                    if id.is_none() {
                        debug!(from = %handle, to = %target, "reference to unmapped object persisted as null");
                    }
                    id
                })
                .unwrap_or(AssetId::NULL)
            })
            .collect();
        Ok(record)
    }

    /// Scene members saved as their own items are linked by reference; the
    /// rest are embedded in the scene blob.
    pub(crate) fn split_scene_members(
        &self,
        members: &[ObjectHandle],
        scene_item: Option<ItemHandle>,
    ) -> (Vec<ObjectHandle>, Vec<ObjectHandle>) {
        let tree = self.project.as_ref().map(|p| &p.tree);
        members.iter().copied().partition(|member| {
            let owner = self
                .registry
                .id_of(*member)
                .and_then(|id| tree.and_then(|t| t.find(id)));
            owner.is_none() || owner == scene_item
        })
    }

    /// Capture the persistent form of `root`. For scenes, `linked` members
    /// become the record's references.
    pub(crate) fn capture(
        &self,
        root: ObjectHandle,
        kind: PersistentKind,
        parts: &[ObjectHandle],
        linked: &[ObjectHandle],
        planned: &HashMap<ObjectHandle, AssetId>,
    ) -> SessionResult<PersistentForm> {
        let mut record = self.record_of(root, planned)?;
        if kind == PersistentKind::Scene {
            record.type_tag = self.scene_tag;
            record.references = linked
                .iter()
                .filter_map(|member| self.persisted_id(*member, planned))
                .collect();
        }
        if kind == PersistentKind::Scalar {
            return Ok(PersistentForm::Scalar(record));
        }
        let mut embedded = Vec::with_capacity(parts.len());
        for part in parts {
            let object = self.registry.objects().try_get(*part)?;
            embedded.push(EmbeddedPart {
                id: self.persisted_id(*part, planned).unwrap_or(AssetId::NULL),
                owner: object.owner.and_then(|owner| self.persisted_id(owner, planned)),
                record: self.record_of(*part, planned)?,
            });
        }
        Ok(match kind {
            PersistentKind::Scene => PersistentForm::Scene {
                record,
                objects: embedded,
            },
            _ => PersistentForm::Composite { root: record, parts: embedded },
        })
    }

    /// Identifiers `root` needs loaded: every mapped object its references
    /// (and those of its parts) reach, transitively. Identifiers it embeds
    /// are excluded.
    pub fn dependencies_of(&self, root: ObjectHandle) -> BTreeSet<AssetId> {
        let parts = self
            .registry
            .objects()
            .get(root)
            .map(|o| o.parts.clone())
            .unwrap_or_default();
        let (parts, linked) = if self.project.as_ref().is_some_and(|p| p.scene == root) {
            let scene_item = self
                .registry
                .id_of(root)
                .and_then(|id| self.project.as_ref().and_then(|p| p.tree.find(id)));
            self.split_scene_members(&parts, scene_item)
        } else {
            (parts, Vec::new())
        };
        self.collect_dependencies(root, &parts, &linked, &HashMap::new())
    }

    /// Walks references from `root` and its `parts`, plus the `linked`
    /// objects themselves.
    pub(crate) fn collect_dependencies(
        &self,
        root: ObjectHandle,
        parts: &[ObjectHandle],
        linked: &[ObjectHandle],
        planned: &HashMap<ObjectHandle, AssetId>,
    ) -> BTreeSet<AssetId> {
        let objects = self.registry.objects();
        let references_of = |handle: ObjectHandle| {
            objects
                .get(handle)
                .map(|o| o.references.iter().flatten().copied().collect::<Vec<_>>())
                .unwrap_or_default()
        };

        let mut visited: HashSet<ObjectHandle> = std::iter::once(root).chain(parts.iter().copied()).collect();
        let mut stack: Vec<ObjectHandle> = visited.iter().flat_map(|h| references_of(*h)).collect();
        stack.extend_from_slice(linked);
        let mut deps = BTreeSet::new();
        while let Some(handle) = stack.pop() {
            if !visited.insert(handle) {
                continue;
            }
            // Unmapped objects are not dependencies but may reach some.
            if let Some(id) = self.persisted_id(handle, planned) {
                deps.insert(id);
            }
            stack.extend(references_of(handle));
            if let Some(object) = objects.get(handle) {
                for part in &object.parts {
                    stack.extend(references_of(*part));
                }
            }
        }
        deps
    }

    /// Write a new preview for an asset item.
    pub async fn save_preview(&mut self, item: ItemHandle, preview: Vec<u8>, cancel: &CancelSignal) -> SessionResult<()> {
        let signal = self.signal(cancel);
        let project = self.project()?;
        let node = project.tree.item(item)?;
        let mut meta = node
            .meta()
            .cloned()
            .ok_or_else(|| SessionError::InvalidOperation(format!("{} is a folder", node.name)))?;
        meta.preview = Some(preview.clone());
        let batch = SaveBatch {
            folder_paths: vec![project.tree.folder_path_of(item)?],
            items: vec![ItemRecord {
                name: node.name.clone(),
                extension: node.extension.clone(),
                meta,
            }],
            blobs: Vec::new(),
            info: project.info.clone(),
            preview_only: true,
        };
        let name = project.name.clone();
        self.storage.save(&name, &batch, &signal).await?;
        Self::check(&signal)?;

        self.project_mut()?.tree.set_preview(item, Some(preview))?;
        self.completed(EventKind::Saved, vec![item], false);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serializer::Serializer;
    use crate::testing::{fixture, material, mesh, none, open, prefab, save_new};
    use atlas_registry::LiveObject;
    use atlas_storage::Storage;
    use atlas_types::{CancellationSource, MAX_LOCAL_INDEX, MAX_ORDINAL};

    #[tokio::test]
    async fn new_object_gets_dynamic_id_and_sidecars() {
        let mut fx = fixture();
        open(&mut fx.session).await;
        let root = fx.session.tree().unwrap().root();
        let rock = fx.session.create_object(LiveObject::new("Rock", mesh()).with_field("size", 3i64));

        let item = save_new(&mut fx.session, root, rock).await;
        let id = fx.session.id_of(rock).unwrap();
        assert!(id.is_dynamic());
        assert_eq!(id.ordinal(), fx.session.project().unwrap().allocator.ordinal());

        let tree = fx.session.tree().unwrap();
        assert_eq!(tree.path_of(item).unwrap(), "Assets/Rock.mesh");
        assert_eq!(tree.find(id), Some(item));
        assert!(fx.storage.contains_path("demo", "Assets/Rock.mesh"));
        assert!(fx.storage.contains_path("demo", "Assets/Rock.mesh.meta"));
    }

    #[tokio::test]
    async fn composite_records_parts_and_external_dependencies() {
        let mut fx = fixture();
        open(&mut fx.session).await;
        let root = fx.session.tree().unwrap().root();

        let paint = fx.session.create_object(LiveObject::new("Paint", material()));
        save_new(&mut fx.session, root, paint).await;
        let paint_id = fx.session.id_of(paint).unwrap();

        let crate_obj = fx.session.create_object(LiveObject::new("Crate", prefab()));
        let lid = fx
            .session
            .add_part(crate_obj, None, LiveObject::new("Lid", mesh()).with_reference(paint))
            .unwrap();
        fx.session.object_mut(crate_obj).unwrap().references.push(Some(lid));
        let item = save_new(&mut fx.session, root, crate_obj).await;

        let lid_id = fx.session.id_of(lid).unwrap();
        let meta = fx.session.tree().unwrap().meta(item).unwrap().clone();
        assert_eq!(meta.embedded_ids, vec![lid_id]);
        assert_eq!(meta.dependency_ids, BTreeSet::from([paint_id]));
        assert!(meta.library_ids.is_empty());
        assert_eq!(fx.session.tree().unwrap().find(lid_id), Some(item));
    }

    #[tokio::test]
    async fn dependencies_are_transitive() {
        let mut fx = fixture();
        open(&mut fx.session).await;
        let root = fx.session.tree().unwrap().root();
        let base = fx.session.create_object(LiveObject::new("Base", material()));
        save_new(&mut fx.session, root, base).await;
        let tint = fx.session.create_object(LiveObject::new("Tint", material()).with_reference(base));
        save_new(&mut fx.session, root, tint).await;
        let rock = fx.session.create_object(LiveObject::new("Rock", mesh()).with_reference(tint));
        let item = save_new(&mut fx.session, root, rock).await;

        let deps = &fx.session.tree().unwrap().meta(item).unwrap().dependency_ids;
        assert_eq!(
            *deps,
            BTreeSet::from([fx.session.id_of(base).unwrap(), fx.session.id_of(tint).unwrap()])
        );
        assert_eq!(fx.session.dependencies_of(rock), *deps);
    }

    #[tokio::test]
    async fn unmapped_reference_is_persisted_as_null() {
        let mut fx = fixture();
        open(&mut fx.session).await;
        let root = fx.session.tree().unwrap().root();
        let loose = fx.session.create_object(LiveObject::new("Loose", material()));
        let rock = fx.session.create_object(LiveObject::new("Rock", mesh()).with_reference(loose));
        let item = save_new(&mut fx.session, root, rock).await;

        let meta = fx.session.tree().unwrap().meta(item).unwrap().clone();
        assert!(meta.dependency_ids.is_empty());
        let blobs = fx
            .storage
            .load("demo", &["Assets/Rock.mesh".to_string()], &none())
            .await
            .unwrap();
        let decoded = fx.session.serializer.deserialize(&blobs[0], None, mesh()).unwrap();
        assert_eq!(decoded.form.root().references, vec![AssetId::NULL]);
    }

    #[tokio::test]
    async fn references_within_one_batch_use_planned_ids() {
        let mut fx = fixture();
        open(&mut fx.session).await;
        let root = fx.session.tree().unwrap().root();
        let paint = fx.session.create_object(LiveObject::new("Paint", material()));
        let rock = fx.session.create_object(LiveObject::new("Rock", mesh()).with_reference(paint));
        let items = fx
            .session
            .save(
                vec![SaveRequest::new_in(root, rock), SaveRequest::new_in(root, paint)],
                false,
                &none(),
            )
            .await
            .unwrap();
        let paint_id = fx.session.id_of(paint).unwrap();
        let deps = &fx.session.tree().unwrap().meta(items[0]).unwrap().dependency_ids;
        assert_eq!(*deps, BTreeSet::from([paint_id]));

        fx.session.close_project(&none()).await.unwrap();
        fx.session
            .open_project("demo", crate::session::OpenFlags::default(), &none())
            .await
            .unwrap();
        let item = fx.session.find_item("Assets/Rock.mesh").unwrap();
        let outcome = fx.session.load(&[item], &none()).await.unwrap();
        let Some(crate::session::Loaded::Object(loaded)) = outcome.objects[0] else {
            panic!("rock did not load: {:?}", outcome.objects[0]);
        };
        let reference = fx.session.object(loaded).unwrap().references[0].unwrap();
        assert_eq!(fx.session.id_of(reference), Some(paint_id));
        assert!(outcome.unresolved.is_empty());
    }

    #[tokio::test]
    async fn dependencies_are_found_through_unmapped_objects() {
        let mut fx = fixture();
        open(&mut fx.session).await;
        let root = fx.session.tree().unwrap().root();
        let base = fx.session.create_object(LiveObject::new("Base", material()));
        save_new(&mut fx.session, root, base).await;
        let loose = fx.session.create_object(LiveObject::new("Loose", material()).with_reference(base));
        let rock = fx.session.create_object(LiveObject::new("Rock", mesh()).with_reference(loose));
        let item = save_new(&mut fx.session, root, rock).await;

        let deps = &fx.session.tree().unwrap().meta(item).unwrap().dependency_ids;
        assert_eq!(*deps, BTreeSet::from([fx.session.id_of(base).unwrap()]));
        assert!(fx.session.id_of(loose).is_none());
    }

    #[tokio::test]
    async fn object_listed_twice_is_rejected_before_writing() {
        let mut fx = fixture();
        open(&mut fx.session).await;
        let root = fx.session.tree().unwrap().root();
        let rock = fx.session.create_object(LiveObject::new("Rock", mesh()));
        let writes = fx.storage.write_count();
        let items_before = fx.session.tree().unwrap().len();

        let err = fx
            .session
            .save(
                vec![SaveRequest::new_in(root, rock), SaveRequest::new_in(root, rock)],
                false,
                &none(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::InvalidOperation(_)), "{err:?}");
        assert_eq!(fx.storage.write_count(), writes);
        assert_eq!(fx.session.tree().unwrap().len(), items_before);
        assert!(fx.session.id_of(rock).is_none());
        assert!(!fx.storage.contains_path("demo", "Assets/Rock 1.mesh"));

        // A part of one request saved as its own item in the same batch.
        let crate_obj = fx.session.create_object(LiveObject::new("Crate", prefab()));
        let lid = fx
            .session
            .add_part(crate_obj, None, LiveObject::new("Lid", mesh()))
            .unwrap();
        let err = fx
            .session
            .save(
                vec![SaveRequest::new_in(root, crate_obj), SaveRequest::new_in(root, lid)],
                false,
                &none(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::InvalidOperation(_)), "{err:?}");
        assert_eq!(fx.storage.write_count(), writes);
        assert!(fx.session.id_of(lid).is_none());
    }

    #[tokio::test]
    async fn batch_names_are_unique_within_a_folder() {
        let mut fx = fixture();
        open(&mut fx.session).await;
        let root = fx.session.tree().unwrap().root();
        let a = fx.session.create_object(LiveObject::new("Rock", mesh()));
        let b = fx.session.create_object(LiveObject::new("Rock", mesh()));
        let items = fx
            .session
            .save(vec![SaveRequest::new_in(root, a), SaveRequest::new_in(root, b)], true, &none())
            .await
            .unwrap();
        let tree = fx.session.tree().unwrap();
        assert_eq!(tree.item(items[0]).unwrap().name, "Rock");
        assert_eq!(tree.item(items[1]).unwrap().name, "Rock 1");
        assert_ne!(fx.session.id_of(a), fx.session.id_of(b));
    }

    #[tokio::test]
    async fn overwrite_keeps_identifier() {
        let mut fx = fixture();
        open(&mut fx.session).await;
        let root = fx.session.tree().unwrap().root();
        let rock = fx.session.create_object(LiveObject::new("Rock", mesh()));
        let item = save_new(&mut fx.session, root, rock).await;
        let id = fx.session.id_of(rock).unwrap();
        let revision = fx.session.revision();

        fx.session.object_mut(rock).unwrap().fields.insert("size".into(), 9i64.into());
        let mut events = fx.session.subscribe();
        let again = fx
            .session
            .save(vec![SaveRequest::overwrite(item, rock).with_preview(vec![7])], true, &none())
            .await
            .unwrap();
        assert_eq!(again, vec![item]);
        assert_eq!(fx.session.id_of(rock), Some(id));
        assert_eq!(fx.session.revision(), revision + 1);
        assert_eq!(fx.session.tree().unwrap().meta(item).unwrap().preview, Some(vec![7]));

        let event = events.recv().await.unwrap();
        assert_eq!(event.kind, EventKind::Saved);
        assert!(event.user_action);
        assert_eq!(event.items, vec![item]);
    }

    #[tokio::test]
    async fn foreign_object_over_existing_item_is_invalid_override() {
        let mut fx = fixture();
        open(&mut fx.session).await;
        let root = fx.session.tree().unwrap().root();
        let rock = fx.session.create_object(LiveObject::new("Rock", mesh()));
        let item = save_new(&mut fx.session, root, rock).await;
        let writes = fx.storage.write_count();

        let other = fx.session.create_object(LiveObject::new("Other", mesh()));
        let err = fx
            .session
            .save(vec![SaveRequest::overwrite(item, other)], false, &none())
            .await
            .unwrap_err();
        assert_eq!(err.code(), crate::ErrorCode::InvalidOverride);
        assert_eq!(fx.storage.write_count(), writes);
        assert!(fx.session.id_of(other).is_none());
    }

    #[tokio::test]
    async fn saved_object_cannot_be_saved_again_as_new() {
        let mut fx = fixture();
        open(&mut fx.session).await;
        let root = fx.session.tree().unwrap().root();
        let rock = fx.session.create_object(LiveObject::new("Rock", mesh()));
        save_new(&mut fx.session, root, rock).await;
        let err = fx
            .session
            .save(vec![SaveRequest::new_in(root, rock)], false, &none())
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::InvalidOperation(_)));
    }

    #[tokio::test]
    async fn exhausted_identifiers_abort_the_whole_batch() {
        let mut fx = fixture();
        open(&mut fx.session).await;
        {
            let project = fx.session.project_mut().unwrap();
            project.info.next_dynamic_ordinal = MAX_ORDINAL + 1;
            project.allocator = DynamicIdAllocator::resume(project.allocator.ordinal(), MAX_LOCAL_INDEX);
        }
        let root = fx.session.tree().unwrap().root();
        let a = fx.session.create_object(LiveObject::new("A", mesh()));
        let b = fx.session.create_object(LiveObject::new("B", mesh()));
        let writes = fx.storage.write_count();

        let err = fx
            .session
            .save(vec![SaveRequest::new_in(root, a), SaveRequest::new_in(root, b)], false, &none())
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::IdentifiersExhausted));
        assert_eq!(fx.storage.write_count(), writes);
        assert!(fx.session.registry().is_empty());
        assert_eq!(fx.session.tree().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn cancelled_save_leaves_tree_and_registry_untouched() {
        let mut fx = fixture();
        open(&mut fx.session).await;
        let root = fx.session.tree().unwrap().root();
        let rock = fx.session.create_object(LiveObject::new("Rock", mesh()));
        let source = CancellationSource::new();
        source.cancel();
        let writes = fx.storage.write_count();

        let err = fx
            .session
            .save(vec![SaveRequest::new_in(root, rock)], false, &source.signal())
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(fx.storage.write_count(), writes);
        assert!(fx.session.id_of(rock).is_none());
        assert_eq!(fx.session.tree().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn backend_failure_maps_nothing() {
        let mut fx = fixture();
        open(&mut fx.session).await;
        let root = fx.session.tree().unwrap().root();
        let rock = fx.session.create_object(LiveObject::new("Rock", mesh()));
        fx.storage.set_read_only(true);
        let err = fx
            .session
            .save(vec![SaveRequest::new_in(root, rock)], false, &none())
            .await
            .unwrap_err();
        assert_eq!(err.code(), crate::ErrorCode::BackendException);
        assert!(fx.session.id_of(rock).is_none());
        assert!(fx.session.tree().unwrap().get("Assets/Rock.mesh").is_none());
    }

    #[tokio::test]
    async fn scene_saves_with_its_objects() {
        let mut fx = fixture();
        open(&mut fx.session).await;
        let root = fx.session.tree().unwrap().root();
        let rock = fx.session.create_object(LiveObject::new("Rock", mesh()));
        fx.session.add_to_scene(rock).unwrap();

        let items = fx
            .session
            .save(vec![SaveRequest::scene(SaveTarget::Folder(root)).with_name("Level")], true, &none())
            .await
            .unwrap();
        let tree = fx.session.tree().unwrap();
        assert_eq!(tree.path_of(items[0]).unwrap(), "Assets/Level.scene");
        let meta = tree.meta(items[0]).unwrap();
        assert_eq!(meta.type_tag, fx.session.scene_tag);
        assert_eq!(meta.embedded_ids, vec![fx.session.id_of(rock).unwrap()]);
        assert_eq!(fx.session.handle_of(meta.id), Some(fx.session.scene().unwrap()));
    }

    #[tokio::test]
    async fn invalid_names_are_rejected_before_writing() {
        let mut fx = fixture();
        open(&mut fx.session).await;
        let root = fx.session.tree().unwrap().root();
        let rock = fx.session.create_object(LiveObject::new("Rock", mesh()));
        let writes = fx.storage.write_count();
        let err = fx
            .session
            .save(vec![SaveRequest::new_in(root, rock).with_name("a/b")], false, &none())
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Tree(TreeError::InvalidName(_))));
        assert_eq!(fx.storage.write_count(), writes);
    }

    #[tokio::test]
    async fn preview_only_save() {
        let mut fx = fixture();
        open(&mut fx.session).await;
        let root = fx.session.tree().unwrap().root();
        let rock = fx.session.create_object(LiveObject::new("Rock", mesh()));
        let item = save_new(&mut fx.session, root, rock).await;

        fx.session.save_preview(item, vec![1, 2, 3], &none()).await.unwrap();
        assert!(fx.storage.contains_path("demo", "Assets/Rock.mesh.preview"));
        let previews = fx.session.get_previews(&[item, root], &none()).await.unwrap();
        assert_eq!(previews, vec![Some(vec![1, 2, 3]), None]);

        let per_folder = fx
            .session
            .get_previews_per_folder(&[root], "*.mesh", &none())
            .await
            .unwrap();
        assert_eq!(per_folder, vec![vec![(item, vec![1, 2, 3])]]);
    }
}
