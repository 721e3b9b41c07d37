//! Loading asset items into live objects, and unloading them again.

use std::collections::{BTreeSet, HashSet, VecDeque};

use atlas_registry::{LiveObject, ObjectHandle};
use atlas_tree::ItemHandle;
use atlas_types::{AssetId, AssetMeta, CancelSignal, PersistentKind, PersistentRecord};
use tracing::{debug, info, warn};

use super::Session;
use crate::error::{SessionError, SessionResult};
use crate::events::EventKind;
use crate::serializer::Decoded;

/// The live counterpart of one requested item.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Loaded {
    Object(ObjectHandle),
    /// The item was a scene; its content now lives in [`Session::scene`].
    Scene,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoadOutcome {
    /// One entry per requested item, in request order. `None` for folders and
    /// for items whose object could not be materialized.
    pub objects: Vec<Option<Loaded>>,
    /// Identifiers still unmapped after library loading. References to them
    /// were left empty.
    pub unresolved: BTreeSet<AssetId>,
}

/// One decoded item waiting to be materialized.
struct Pending {
    meta: AssetMeta,
    decoded: Decoded,
}

/// Handles chosen for one pending item.
struct Placed {
    root: ObjectHandle,
    parts: Vec<ObjectHandle>,
    scene: bool,
}

impl Session {
    /// Load `items` and everything they depend on.
    pub async fn load(&mut self, items: &[ItemHandle], cancel: &CancelSignal) -> SessionResult<LoadOutcome> {
        let signal = self.signal(cancel);
        let (closure, mut unresolved) = self.load_closure(items)?;
        let metas: Vec<AssetMeta> = {
            let tree = &self.project()?.tree;
            closure.iter().filter_map(|h| tree.meta(*h).cloned()).collect()
        };
        // Only one scene can be live; a second would clobber the first.
        let scenes = metas.iter().filter(|meta| self.types.is_scene(meta.type_tag)).count();
        if scenes > 1 {
            return Err(SessionError::InvalidOperation(format!(
                "{scenes} scenes requested in one load, at most one can be live"
            )));
        }

        let report = self.resolve(&metas, &unresolved, &signal).await?;
        if !report.failed.is_empty() {
            warn!(failed = report.failed.len(), "some libraries could not be loaded");
        }

        // Static items are populated from their library load; the ones the
        // library did not provide stay unresolved.
        let mut pending_items = Vec::with_capacity(closure.len());
        let mut paths = Vec::with_capacity(closure.len());
        {
            let tree = &self.project()?.tree;
            for (item, meta) in closure.iter().zip(&metas) {
                if !meta.id.is_dynamic() && !self.registry.is_mapped(meta.id) {
                    warn!(id = %meta.id, path = %tree.path_of(*item)?, "library object missing, item not loaded");
                    unresolved.insert(meta.id);
                    continue;
                }
                paths.push(tree.path_of(*item)?);
                pending_items.push(meta.clone());
            }
        }

        let name = self.open_name()?;
        let blobs = if paths.is_empty() {
            Vec::new()
        } else {
            self.storage.load(&name, &paths, &signal).await?
        };
        Self::check(&signal)?;

        let mut pending = Vec::with_capacity(blobs.len());
        for (meta, bytes) in pending_items.into_iter().zip(blobs) {
            let decoded = self
                .serializer
                .deserialize(&bytes, meta.custom_data_offset, meta.type_tag)?;
            pending.push(Pending { meta, decoded });
        }

        let placed = self.place(&pending)?;
        for (entry, placed) in pending.iter().zip(&placed) {
            self.populate(entry, placed);
        }

        for entry in &pending {
            let form = &entry.decoded.form;
            for id in form.dependencies().into_iter().chain(form.root().references.iter().copied()) {
                if !id.is_null() && !self.registry.is_mapped(id) {
                    unresolved.insert(id);
                }
            }
        }
        unresolved.retain(|id| !self.registry.is_mapped(*id));

        let objects = self.loaded_objects(items)?;
        info!(
            requested = items.len(),
            loaded = pending.len(),
            unresolved = unresolved.len(),
            "loaded items"
        );
        self.completed(EventKind::Loaded, closure, false);
        Ok(LoadOutcome { objects, unresolved })
    }

    /// The unmapped asset items `items` need, dependencies included, and the
    /// dependency identifiers no item owns.
    fn load_closure(&self, items: &[ItemHandle]) -> SessionResult<(Vec<ItemHandle>, BTreeSet<AssetId>)> {
        let tree = &self.project()?.tree;
        let mut queue = VecDeque::with_capacity(items.len());
        for item in items {
            tree.item(*item)?;
            queue.push_back(*item);
        }

        let mut seen = HashSet::new();
        let mut closure = Vec::new();
        let mut unresolved = BTreeSet::new();
        while let Some(item) = queue.pop_front() {
            if !seen.insert(item) {
                continue;
            }
            let Some(meta) = tree.meta(item) else {
                continue;
            };
            if self.registry.is_mapped(meta.id) {
                continue;
            }
            closure.push(item);
            for dep in &meta.dependency_ids {
                if self.registry.is_mapped(*dep) {
                    continue;
                }
                match tree.find(*dep) {
                    Some(owner) => queue.push_back(owner),
                    None => {
                        unresolved.insert(*dep);
                    }
                }
            }
        }
        debug!(requested = items.len(), closure = closure.len(), unresolved = unresolved.len(), "computed load closure");
        Ok((closure, unresolved))
    }

    /// Pick (or create) the object for every root and embedded part, and
    /// register the new ones.
    fn place(&mut self, pending: &[Pending]) -> SessionResult<Vec<Placed>> {
        let scene = self.scene_handle()?;
        let mut placed = Vec::with_capacity(pending.len());
        let mut fresh: Vec<(AssetId, ObjectHandle)> = Vec::new();

        for entry in pending {
            let form = &entry.decoded.form;
            let is_scene = form.kind() == PersistentKind::Scene;
            let root = if is_scene {
                if let Some(previous) = self.registry.id_of(scene) {
                    self.registry.unmap(previous);
                }
                self.clear_scene();
                fresh.push((entry.meta.id, scene));
                scene
            } else {
                match self.registry.handle(entry.meta.id) {
                    Some(handle) => handle,
                    None => {
                        let handle = self.blank(form.root());
                        fresh.push((entry.meta.id, handle));
                        handle
                    }
                }
            };

            let mut parts = Vec::with_capacity(form.embedded().len());
            for part in form.embedded() {
                let handle = match self.registry.handle(part.id) {
                    Some(handle) => handle,
                    None => {
                        let handle = self.blank(&part.record);
                        if part.id.is_dynamic() {
                            fresh.push((part.id, handle));
                        } else {
                            warn!(id = %part.id, "library part missing, loaded as a detached copy");
                        }
                        handle
                    }
                };
                parts.push(handle);
            }
            placed.push(Placed {
                root,
                parts,
                scene: is_scene,
            });
        }

        for (id, handle) in fresh {
            self.registry.register(id, handle)?;
        }
        Ok(placed)
    }

    fn blank(&mut self, record: &PersistentRecord) -> ObjectHandle {
        self.registry
            .objects_mut()
            .insert(LiveObject::new(record.name.clone(), record.type_tag))
    }

    fn resolve_reference(&self, id: AssetId) -> Option<ObjectHandle> {
        if id.is_null() {
            None
        } else {
            self.registry.handle(id)
        }
    }

    /// Copy the persistent fields onto the placed objects and wire up
    /// references, parts and owners.
    fn populate(&mut self, entry: &Pending, placed: &Placed) {
        let form = &entry.decoded.form;
        let root_refs: Vec<Option<ObjectHandle>> = form
            .root()
            .references
            .iter()
            .map(|id| self.resolve_reference(*id))
            .collect();
        let part_wiring: Vec<(Vec<Option<ObjectHandle>>, Option<ObjectHandle>)> = form
            .embedded()
            .iter()
            .map(|part| {
                let refs = part.record.references.iter().map(|id| self.resolve_reference(*id)).collect();
                (refs, part.owner.and_then(|owner| self.resolve_reference(owner)))
            })
            .collect();

        let objects = self.registry.objects_mut();
        for ((part, handle), (refs, owner)) in form.embedded().iter().zip(&placed.parts).zip(part_wiring) {
            if let Some(object) = objects.get_mut(*handle) {
                object.name = part.record.name.clone();
                object.type_tag = part.record.type_tag;
                object.fields = part.record.fields.clone();
                object.references = refs;
                object.owner = owner;
            }
        }

        let Some(root) = objects.get_mut(placed.root) else {
            return;
        };
        let record = form.root();
        root.fields = record.fields.clone();
        root.custom_data = entry.decoded.custom_data.clone();
        if placed.scene {
            // Linked members come back through the scene's references.
            root.references.clear();
            root.parts = placed.parts.clone();
            root.parts.extend(root_refs.into_iter().flatten());
        } else {
            root.name = record.name.clone();
            root.type_tag = record.type_tag;
            root.references = root_refs;
            root.parts = placed.parts.clone();
        }
        debug!(id = %entry.meta.id, parts = placed.parts.len(), "materialized item");
    }

    fn loaded_objects(&self, items: &[ItemHandle]) -> SessionResult<Vec<Option<Loaded>>> {
        let project = self.project()?;
        Ok(items
            .iter()
            .map(|item| {
                let handle = project.tree.meta(*item).and_then(|m| self.registry.handle(m.id))?;
                Some(if handle == project.scene {
                    Loaded::Scene
                } else {
                    Loaded::Object(handle)
                })
            })
            .collect())
    }

    // ---------------------------------------------------------------
    // Unloading
    // ---------------------------------------------------------------

    /// Destroy the live objects of `items` (folders expand to their assets).
    /// Only dynamic identifiers unload; library-owned items are skipped with
    /// a warning. Returns the number of identifiers released.
    pub fn unload(&mut self, items: &[ItemHandle]) -> SessionResult<usize> {
        let mut metas = Vec::new();
        {
            let tree = &self.project()?.tree;
            for item in items {
                for asset in tree.descendant_assets(*item)? {
                    if let Some(meta) = tree.meta(asset) {
                        metas.push(meta.clone());
                    }
                }
            }
        }

        let mut released = 0;
        for meta in &metas {
            if !meta.id.is_dynamic() {
                warn!(id = %meta.id, "only dynamic items can be unloaded");
                continue;
            }
            released += self.release_asset(meta, true);
        }
        info!(items = items.len(), released, "unloaded items");
        self.completed(EventKind::Unloaded, items.to_vec(), false);
        Ok(released)
    }

    /// Unload every dynamic object, including ones never saved.
    pub fn unload_all(&mut self) -> SessionResult<usize> {
        let scene = self.scene_handle()?;
        let root = self.project()?.tree.root();
        let mut released = 0;
        for id in self.registry.dynamic_ids() {
            if self.registry.handle(id) == Some(scene) {
                self.registry.unmap(id);
                self.clear_scene();
            } else if self.registry.unregister(id).is_none() {
                continue;
            }
            released += 1;
        }
        info!(released, "unloaded all dynamic objects");
        self.completed(EventKind::Unloaded, vec![root], false);
        Ok(released)
    }
}
