//! Structural edits: delete, move, rename, duplicate and folder creation.

use std::collections::{HashMap, HashSet};

use atlas_registry::ObjectHandle;
use atlas_storage::{paths, ItemRecord, SaveBatch};
use atlas_tree::{ItemHandle, ProjectTree, TreeError};
use atlas_types::{AssetId, AssetMeta, CancelSignal, ProjectInfo};
use tracing::{debug, info};

use super::load::Loaded;
use super::save::{check_name, reserve_name};
use super::{SaveRequest, Session};
use crate::error::{SessionError, SessionResult};
use crate::events::EventKind;

/// `items` without duplicates and without items lying under another
/// requested item, in request order.
fn top_level(tree: &ProjectTree, items: &[ItemHandle]) -> SessionResult<Vec<ItemHandle>> {
    let mut roots: Vec<ItemHandle> = Vec::with_capacity(items.len());
    for item in items {
        tree.item(*item)?;
        if roots.contains(item) {
            continue;
        }
        let nested = items
            .iter()
            .any(|other| other != item && tree.is_ancestor_or_self(*other, *item));
        if !nested {
            roots.push(*item);
        }
    }
    Ok(roots)
}

fn same_name(tree: &ProjectTree, a: &str, b: &str) -> bool {
    if tree.is_case_insensitive() {
        a.to_lowercase() == b.to_lowercase()
    } else {
        a == b
    }
}

impl Session {
    /// Delete items and everything under them.
    ///
    /// Every identifier of the removed assets is unregistered: session-owned
    /// objects are destroyed, library-owned ones only unmapped. Loading the
    /// library again maps them back.
    pub async fn delete(&mut self, items: &[ItemHandle], cancel: &CancelSignal) -> SessionResult<()> {
        self.remove_items(items, false, cancel).await
    }

    /// [`Session::delete`], optionally leaving library-owned identifiers
    /// mapped for an import that saves the same objects again.
    pub(crate) async fn remove_items(
        &mut self,
        items: &[ItemHandle],
        keep_library_ids: bool,
        cancel: &CancelSignal,
    ) -> SessionResult<()> {
        let signal = self.signal(cancel);
        let project = self.project()?;
        let tree = &project.tree;
        if items.contains(&tree.root()) {
            return Err(TreeError::IsRoot.into());
        }
        let roots = top_level(tree, items)?;
        if roots.is_empty() {
            return Ok(());
        }
        let mut paths = Vec::with_capacity(roots.len());
        let mut metas = Vec::new();
        for root in &roots {
            paths.push(tree.path_of(*root)?);
            for asset in tree.descendant_assets(*root)? {
                metas.extend(tree.meta(asset).cloned());
            }
        }
        let name = project.name.clone();
        Self::check(&signal)?;

        self.storage.delete(&name, &paths, &signal).await?;
        Self::check(&signal)?;

        let mut released = 0;
        for meta in &metas {
            released += self.release_asset(meta, keep_library_ids);
        }
        let tree = &mut self.project_mut()?.tree;
        for root in &roots {
            tree.remove(*root)?;
        }
        info!(project = %name, roots = roots.len(), assets = metas.len(), released, "deleted items");
        self.completed(EventKind::Deleted, roots, true);
        Ok(())
    }

    /// Move items into `folder`. Items already inside it are left alone.
    pub async fn move_items(
        &mut self,
        items: &[ItemHandle],
        folder: ItemHandle,
        cancel: &CancelSignal,
    ) -> SessionResult<()> {
        let signal = self.signal(cancel);
        let project = self.project()?;
        let tree = &project.tree;
        if !tree.item(folder)?.is_folder() {
            return Err(TreeError::NotAFolder(tree.path_of(folder)?).into());
        }
        if items.contains(&tree.root()) {
            return Err(TreeError::IsRoot.into());
        }

        let mut moving = Vec::new();
        let mut arriving: HashSet<String> = HashSet::new();
        for item in top_level(tree, items)? {
            let node = tree.item(item)?;
            if node.parent() == Some(folder) {
                continue;
            }
            if tree.is_ancestor_or_self(item, folder) {
                return Err(TreeError::Cycle(tree.path_of(item)?).into());
            }
            let file_name = node.file_name();
            let key = if tree.is_case_insensitive() { file_name.to_lowercase() } else { file_name.clone() };
            if tree.child_named(folder, &file_name).is_some() || !arriving.insert(key) {
                return Err(TreeError::NameCollision(paths::join(&tree.path_of(folder)?, &file_name)).into());
            }
            moving.push(item);
        }
        if moving.is_empty() {
            return Ok(());
        }

        let mut sources = Vec::with_capacity(moving.len());
        for item in &moving {
            sources.push(tree.path_of(*item)?);
        }
        let target = tree.path_of(folder)?;
        let name = project.name.clone();
        self.storage.move_items(&name, &sources, &target, &signal).await?;
        Self::check(&signal)?;

        let tree = &mut self.project_mut()?.tree;
        for item in &moving {
            tree.move_to(*item, folder)?;
        }
        info!(project = %name, count = moving.len(), target = %target, "moved items");
        self.completed(EventKind::Moved, moving, true);
        Ok(())
    }

    /// Rename an item, keeping its extension. A mapped object takes the new
    /// name too.
    pub async fn rename(&mut self, item: ItemHandle, new_name: &str, cancel: &CancelSignal) -> SessionResult<()> {
        let signal = self.signal(cancel);
        let project = self.project()?;
        let tree = &project.tree;
        let node = tree.item(item)?;
        let parent = node.parent().ok_or(TreeError::IsRoot)?;
        check_name(new_name)?;
        if node.name == new_name {
            return Ok(());
        }
        let extension = node.extension.clone();
        let file_name = format!("{new_name}{extension}");
        let case_only = node.name.to_lowercase() == new_name.to_lowercase();
        let collides = tree
            .get_item(parent)
            .map(|p| p.children())
            .unwrap_or_default()
            .iter()
            .filter(|sibling| **sibling != item)
            .filter_map(|sibling| tree.get_item(*sibling))
            .any(|sibling| same_name(tree, &sibling.file_name(), &file_name));
        if collides {
            return Err(TreeError::NameCollision(paths::join(&tree.path_of(parent)?, &file_name)).into());
        }

        let folder_path = tree.path_of(parent)?;
        let source = tree.path_of(item)?;
        let name = project.name.clone();
        if case_only {
            // Hop through a free name so case-insensitive backends do not
            // see the item collide with itself.
            let hop = tree.unique_name(parent, &format!("{new_name}~"), &extension);
            let hop_file = format!("{hop}{extension}");
            self.storage
                .rename(&name, &[source], std::slice::from_ref(&hop_file), &signal)
                .await?;
            Self::check(&signal)?;
            let hop_path = paths::join(&folder_path, &hop_file);
            self.storage.rename(&name, &[hop_path], &[file_name], &signal).await?;
        } else {
            self.storage.rename(&name, &[source], &[file_name], &signal).await?;
        }
        Self::check(&signal)?;

        let project = self.project_mut()?;
        project.tree.rename(item, new_name)?;
        let id = project.tree.meta(item).map(|meta| meta.id);
        if let Some(object) = id.and_then(|id| self.registry.from_id_mut(id)) {
            object.name = new_name.to_string();
        }
        debug!(project = %name, %item, new_name, case_only, "renamed item");
        self.completed(EventKind::Renamed, vec![item], true);
        Ok(())
    }

    /// Create folder `name` inside `parent`.
    pub async fn create_folder(
        &mut self,
        parent: ItemHandle,
        name: &str,
        cancel: &CancelSignal,
    ) -> SessionResult<ItemHandle> {
        let signal = self.signal(cancel);
        let project = self.project()?;
        let tree = &project.tree;
        check_name(name)?;
        if !tree.item(parent)?.is_folder() {
            return Err(TreeError::NotAFolder(tree.path_of(parent)?).into());
        }
        let parent_path = tree.path_of(parent)?;
        if tree.child_named(parent, name).is_some() {
            return Err(TreeError::NameCollision(paths::join(&parent_path, name)).into());
        }
        let project_name = project.name.clone();
        self.storage
            .create_folders(&project_name, &[parent_path], &[name.to_string()], &signal)
            .await?;
        Self::check(&signal)?;

        let folder = self.project_mut()?.tree.add_folder(parent, name)?;
        self.completed(EventKind::FolderCreated, vec![folder], true);
        Ok(folder)
    }

    /// Resolve a folder path, creating missing folders. Returns the folder
    /// and the folders created, outermost first.
    pub async fn get_or_create_folder(
        &mut self,
        path: &str,
        cancel: &CancelSignal,
    ) -> SessionResult<(ItemHandle, Vec<ItemHandle>)> {
        let signal = self.signal(cancel);
        let project = self.project()?;
        let tree = &project.tree;
        let mut segments = path.split('/').filter(|s| !s.is_empty());
        let root_name = tree.item(tree.root())?.name.clone();
        match segments.next() {
            Some(first) if same_name(tree, first, &root_name) => {}
            _ => return Err(SessionError::NotFound(path.to_string())),
        }

        let mut current = tree.root();
        let mut parent_paths = Vec::new();
        let mut names = Vec::new();
        let mut prefix = tree.path_of(current)?;
        for segment in segments {
            if names.is_empty() {
                match tree.child_named(current, segment) {
                    Some(existing) if tree.is_folder(existing) => {
                        current = existing;
                        prefix = tree.path_of(existing)?;
                        continue;
                    }
                    Some(existing) => return Err(TreeError::NotAFolder(tree.path_of(existing)?).into()),
                    None => {}
                }
            }
            check_name(segment)?;
            parent_paths.push(prefix.clone());
            names.push(segment.to_string());
            prefix = paths::join(&prefix, segment);
        }
        if names.is_empty() {
            return Ok((current, Vec::new()));
        }

        let project_name = project.name.clone();
        self.storage
            .create_folders(&project_name, &parent_paths, &names, &signal)
            .await?;
        Self::check(&signal)?;

        let (folder, created) = self.project_mut()?.tree.get_or_create_folder(path)?;
        debug!(project = %project_name, path, created = created.len(), "created folders");
        self.completed(EventKind::FolderCreated, created.clone(), true);
        Ok((folder, created))
    }

    /// Duplicate items next to their sources. Returns the copies of the
    /// requested top-level items, in request order.
    ///
    /// Folders are recreated first under unique names. Scenes are copied
    /// from their stored form; every other asset is loaded, cloned and saved
    /// under fresh identifiers, then the clone is destroyed.
    pub async fn duplicate(&mut self, items: &[ItemHandle], cancel: &CancelSignal) -> SessionResult<Vec<ItemHandle>> {
        let signal = self.signal(cancel);
        let project = self.project()?;
        if items.contains(&project.tree.root()) {
            return Err(TreeError::IsRoot.into());
        }
        let roots = top_level(&project.tree, items)?;
        let name = project.name.clone();

        let mut copies: HashMap<ItemHandle, ItemHandle> = HashMap::new();
        let mut assets: Vec<(ItemHandle, ItemHandle)> = Vec::new();
        for root in &roots {
            if self.project()?.tree.is_folder(*root) {
                self.duplicate_folders(&name, *root, &mut copies, &signal).await?;
                let tree = &self.project()?.tree;
                for asset in tree.descendant_assets(*root)? {
                    let parent = tree.item(asset)?.parent().ok_or(TreeError::IsRoot)?;
                    let dest = copies
                        .get(&parent)
                        .copied()
                        .ok_or_else(|| SessionError::NotFound(tree.path_of(parent).unwrap_or_default()))?;
                    assets.push((asset, dest));
                }
            } else {
                let parent = self.project()?.tree.item(*root)?.parent().ok_or(TreeError::IsRoot)?;
                assets.push((*root, parent));
            }
        }

        let mut previews = self.previews_of(&name, &assets, &signal).await?;
        let tree = &self.project()?.tree;
        let (scenes, others): (Vec<_>, Vec<_>) = assets.into_iter().partition(|(item, _)| {
            tree.meta(*item)
                .is_some_and(|meta| self.types.is_scene(meta.type_tag))
        });

        for (source, copy) in self.duplicate_scenes(&name, &scenes, &mut previews, &signal).await? {
            copies.insert(source, copy);
        }
        for (source, copy) in self.duplicate_objects(&others, &mut previews, &signal).await? {
            copies.insert(source, copy);
        }

        let result: Vec<ItemHandle> = roots.iter().filter_map(|root| copies.get(root).copied()).collect();
        info!(project = %name, roots = result.len(), items = copies.len(), "duplicated items");
        self.completed(EventKind::Duplicated, result.clone(), true);
        Ok(result)
    }

    /// Recreate the folder structure under `root` beside it.
    async fn duplicate_folders(
        &mut self,
        project_name: &str,
        root: ItemHandle,
        copies: &mut HashMap<ItemHandle, ItemHandle>,
        signal: &CancelSignal,
    ) -> SessionResult<()> {
        let tree = &self.project()?.tree;
        let parent = tree.item(root)?.parent().ok_or(TreeError::IsRoot)?;
        let top_name = tree.unique_name(parent, &tree.item(root)?.name, "");
        let folders: Vec<ItemHandle> = tree
            .subtree(root)?
            .into_iter()
            .filter(|h| tree.is_folder(*h))
            .collect();

        let mut new_paths: HashMap<ItemHandle, String> = HashMap::new();
        let mut parent_paths = Vec::with_capacity(folders.len());
        let mut names = Vec::with_capacity(folders.len());
        for folder in &folders {
            let (parent_path, folder_name) = if *folder == root {
                (tree.path_of(parent)?, top_name.clone())
            } else {
                let source_parent = tree.item(*folder)?.parent().ok_or(TreeError::IsRoot)?;
                let parent_path = new_paths
                    .get(&source_parent)
                    .cloned()
                    .ok_or_else(|| SessionError::NotFound(tree.path_of(source_parent).unwrap_or_default()))?;
                (parent_path, tree.item(*folder)?.name.clone())
            };
            new_paths.insert(*folder, paths::join(&parent_path, &folder_name));
            parent_paths.push(parent_path);
            names.push(folder_name);
        }

        self.storage
            .create_folders(project_name, &parent_paths, &names, signal)
            .await?;
        Self::check(signal)?;

        let tree = &mut self.project_mut()?.tree;
        for (folder, folder_name) in folders.iter().zip(&names) {
            let dest_parent = if *folder == root {
                parent
            } else {
                let source_parent = tree.item(*folder)?.parent().ok_or(TreeError::IsRoot)?;
                copies
                    .get(&source_parent)
                    .copied()
                    .ok_or_else(|| SessionError::NotFound(folder_name.clone()))?
            };
            let copy = tree.add_folder(dest_parent, folder_name)?;
            copies.insert(*folder, copy);
        }
        Ok(())
    }

    /// Stored previews of the assets being duplicated. Tree snapshots carry
    /// no preview bytes, so they are read from the backend.
    async fn previews_of(
        &self,
        project_name: &str,
        assets: &[(ItemHandle, ItemHandle)],
        signal: &CancelSignal,
    ) -> SessionResult<HashMap<ItemHandle, Vec<u8>>> {
        if assets.is_empty() {
            return Ok(HashMap::new());
        }
        let tree = &self.project()?.tree;
        let mut paths = Vec::with_capacity(assets.len());
        for (item, _) in assets {
            paths.push(tree.path_of(*item)?);
        }
        let fetched = self.storage.get_previews(project_name, &paths, signal).await?;
        Self::check(signal)?;
        Ok(assets
            .iter()
            .zip(fetched)
            .filter_map(|((item, _), preview)| preview.map(|bytes| (*item, bytes)))
            .collect())
    }

    /// Re-save scene blobs under fresh identifiers without instantiating
    /// them.
    async fn duplicate_scenes(
        &mut self,
        project_name: &str,
        scenes: &[(ItemHandle, ItemHandle)],
        previews: &mut HashMap<ItemHandle, Vec<u8>>,
        signal: &CancelSignal,
    ) -> SessionResult<Vec<(ItemHandle, ItemHandle)>> {
        if scenes.is_empty() {
            return Ok(Vec::new());
        }
        let tree = &self.project()?.tree;
        let mut sources = Vec::with_capacity(scenes.len());
        for (item, _) in scenes {
            sources.push(tree.path_of(*item)?);
        }
        let blobs = self.storage.load(project_name, &sources, signal).await?;
        Self::check(signal)?;

        let project = self.project()?;
        let tree = &project.tree;
        let mut info: ProjectInfo = project.info.clone();
        let mut allocator = project.allocator.clone();
        let mut taken: HashMap<ItemHandle, HashSet<String>> = HashMap::new();
        let mut folder_paths = Vec::with_capacity(scenes.len());
        let mut records = Vec::with_capacity(scenes.len());
        let mut encoded_blobs = Vec::with_capacity(scenes.len());
        for ((item, dest), blob) in scenes.iter().zip(blobs) {
            let node = tree.item(*item)?;
            let meta = node
                .meta()
                .ok_or_else(|| SessionError::InvalidOperation(format!("{} is a folder", node.name)))?;
            let decoded = self
                .serializer
                .deserialize(&blob, meta.custom_data_offset, meta.type_tag)?;

            let id = allocator.next(&mut info)?;
            let mut remap: HashMap<AssetId, AssetId> = HashMap::from([(meta.id, id)]);
            for part in &meta.embedded_ids {
                remap.insert(*part, allocator.next(&mut info)?);
            }
            let mut form = decoded.form;
            form.remap_ids(&remap);
            let encoded = self.serializer.serialize(&form, decoded.custom_data.as_deref())?;

            let copy = AssetMeta {
                id,
                embedded_ids: form.embedded_ids(),
                preview: previews.remove(item),
                custom_data_offset: encoded.custom_data_offset,
                ..meta.clone()
            };
            let item_name = reserve_name(tree, *dest, &node.name, &node.extension, taken.entry(*dest).or_default());
            folder_paths.push(tree.path_of(*dest)?);
            records.push(ItemRecord {
                name: item_name,
                extension: node.extension.clone(),
                meta: copy,
            });
            encoded_blobs.push(encoded.bytes);
        }
        info.touch();

        let batch = SaveBatch {
            folder_paths,
            items: records,
            blobs: encoded_blobs,
            info: info.clone(),
            preview_only: false,
        };
        self.storage.save(project_name, &batch, signal).await?;
        {
            let project = self.project_mut()?;
            project.info = info;
            project.allocator = allocator;
        }
        Self::check(signal)?;

        let tree = &mut self.project_mut()?.tree;
        let mut copies = Vec::with_capacity(scenes.len());
        for ((source, dest), record) in scenes.iter().zip(batch.items) {
            let copy = tree.add_asset(*dest, &record.name, &record.extension, record.meta)?;
            copies.push((*source, copy));
        }
        Ok(copies)
    }

    /// Load, clone and save non-scene assets. The clones are destroyed once
    /// saved.
    async fn duplicate_objects(
        &mut self,
        assets: &[(ItemHandle, ItemHandle)],
        previews: &mut HashMap<ItemHandle, Vec<u8>>,
        signal: &CancelSignal,
    ) -> SessionResult<Vec<(ItemHandle, ItemHandle)>> {
        if assets.is_empty() {
            return Ok(Vec::new());
        }
        let sources: Vec<ItemHandle> = assets.iter().map(|(item, _)| *item).collect();
        let outcome = self.load(&sources, signal).await?;

        let mut requests = Vec::with_capacity(assets.len());
        let mut clones = Vec::with_capacity(assets.len());
        for ((item, dest), loaded) in assets.iter().zip(outcome.objects) {
            let original = match loaded {
                Some(Loaded::Object(handle)) => handle,
                _ => {
                    let path = self.project()?.tree.path_of(*item)?;
                    self.discard_clones(&clones);
                    return Err(SessionError::InvalidOperation(format!("{path} did not load as an object")));
                }
            };
            let copy = self.registry.objects_mut().deep_clone(original)?;
            clones.push(copy);
            let item_name = self.project()?.tree.item(*item)?.name.clone();
            let mut request = SaveRequest::new_in(*dest, copy).with_name(item_name);
            if let Some(preview) = previews.remove(item) {
                request = request.with_preview(preview);
            }
            requests.push(request);
        }

        let saved = match self.save(requests, false, signal).await {
            Ok(saved) => saved,
            Err(e) => {
                self.discard_clones(&clones);
                return Err(e);
            }
        };
        let metas: Vec<AssetMeta> = {
            let tree = &self.project()?.tree;
            saved.iter().filter_map(|item| tree.meta(*item).cloned()).collect()
        };
        for meta in &metas {
            self.release_asset(meta, true);
        }
        Ok(sources.into_iter().zip(saved).collect())
    }

    /// Destroy clones that never got an identifier.
    fn discard_clones(&mut self, clones: &[ObjectHandle]) {
        for clone in clones {
            self.registry.objects_mut().remove_with_parts(*clone);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::session::SaveTarget;
    use crate::testing::{fixture, fixture_with, material, mesh, none, open, prefab, save_new};
    use crate::ErrorCode;
    use atlas_registry::LiveObject;
    use atlas_storage::InMemoryStorage;
    use atlas_types::CancellationSource;

    #[tokio::test]
    async fn deleting_a_folder_clears_cache_and_registry() {
        let mut fx = fixture();
        open(&mut fx.session).await;
        let (rocks, _) = fx.session.get_or_create_folder("Assets/Rocks", &none()).await.unwrap();
        let (inner, _) = fx.session.get_or_create_folder("Assets/Rocks/Inner", &none()).await.unwrap();
        let rock = fx.session.create_object(LiveObject::new("Rock", mesh()));
        save_new(&mut fx.session, rocks, rock).await;
        let crate_obj = fx.session.create_object(LiveObject::new("Crate", prefab()));
        let lid = fx.session.add_part(crate_obj, None, LiveObject::new("Lid", mesh())).unwrap();
        save_new(&mut fx.session, inner, crate_obj).await;
        let ids = [
            fx.session.id_of(rock).unwrap(),
            fx.session.id_of(crate_obj).unwrap(),
            fx.session.id_of(lid).unwrap(),
        ];

        fx.session.delete(&[rocks, inner], &none()).await.unwrap();

        let tree = fx.session.tree().unwrap();
        assert!(tree.get("Assets/Rocks").is_none());
        for id in ids {
            assert!(tree.find(id).is_none());
            assert!(fx.session.handle_of(id).is_none());
        }
        assert!(fx.session.object(rock).is_none());
        assert!(fx.session.object(lid).is_none());
        assert!(!fx.storage.contains_path("demo", "Assets/Rocks"));
        assert!(!fx.storage.contains_path("demo", "Assets/Rocks/Rock.mesh"));
    }

    #[tokio::test]
    async fn root_cannot_be_deleted_moved_or_renamed() {
        let mut fx = fixture();
        open(&mut fx.session).await;
        let root = fx.session.tree().unwrap().root();
        let (props, _) = fx.session.get_or_create_folder("Assets/Props", &none()).await.unwrap();

        let err = fx.session.delete(&[root], &none()).await.unwrap_err();
        assert!(matches!(err, SessionError::Tree(TreeError::IsRoot)));
        let err = fx.session.move_items(&[root], props, &none()).await.unwrap_err();
        assert!(matches!(err, SessionError::Tree(TreeError::IsRoot)));
        let err = fx.session.rename(root, "Other", &none()).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidOperation);
    }

    #[tokio::test]
    async fn cancelled_delete_leaves_tree_and_registry() {
        let mut fx = fixture();
        open(&mut fx.session).await;
        let root = fx.session.tree().unwrap().root();
        let rock = fx.session.create_object(LiveObject::new("Rock", mesh()));
        let item = save_new(&mut fx.session, root, rock).await;

        let source = CancellationSource::new();
        source.cancel();
        let err = fx.session.delete(&[item], &source.signal()).await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(fx.session.tree().unwrap().contains(item));
        assert!(fx.session.id_of(rock).is_some());
        assert!(fx.storage.contains_path("demo", "Assets/Rock.mesh"));
    }

    #[tokio::test]
    async fn duplicate_mints_fresh_ids_and_keeps_dependencies() {
        let mut fx = fixture();
        open(&mut fx.session).await;
        let root = fx.session.tree().unwrap().root();
        let paint = fx.session.create_object(LiveObject::new("Paint", material()));
        save_new(&mut fx.session, root, paint).await;
        let rock = fx.session.create_object(LiveObject::new("Rock", mesh()).with_reference(paint));
        let item = save_new(&mut fx.session, root, rock).await;
        let live_before = fx.session.registry().objects().len();

        let copies = fx.session.duplicate(&[item], &none()).await.unwrap();
        assert_eq!(copies.len(), 1);

        let tree = fx.session.tree().unwrap();
        let source = tree.meta(item).unwrap();
        let copy = tree.meta(copies[0]).unwrap();
        assert_ne!(copy.id, source.id);
        assert!(copy.id.is_dynamic());
        assert_eq!(copy.type_tag, source.type_tag);
        assert_eq!(copy.dependency_ids, source.dependency_ids);
        assert_eq!(tree.path_of(copies[0]).unwrap(), "Assets/Rock 1.mesh");

        // The clone is gone; the source stays live.
        assert!(fx.session.handle_of(copy.id).is_none());
        assert_eq!(fx.session.handle_of(source.id), Some(rock));
        assert_eq!(fx.session.registry().objects().len(), live_before);
    }

    #[tokio::test]
    async fn duplicating_a_composite_renews_part_ids() {
        let mut fx = fixture();
        open(&mut fx.session).await;
        let root = fx.session.tree().unwrap().root();
        let crate_obj = fx.session.create_object(LiveObject::new("Crate", prefab()));
        let lid = fx.session.add_part(crate_obj, None, LiveObject::new("Lid", mesh())).unwrap();
        fx.session.object_mut(crate_obj).unwrap().references.push(Some(lid));
        let item = save_new(&mut fx.session, root, crate_obj).await;

        let copies = fx.session.duplicate(&[item], &none()).await.unwrap();
        let tree = fx.session.tree().unwrap();
        let source = tree.meta(item).unwrap();
        let copy = tree.meta(copies[0]).unwrap();
        assert_eq!(copy.embedded_ids.len(), 1);
        assert_ne!(copy.embedded_ids, source.embedded_ids);
        assert!(copy.dependency_ids.is_empty());
        assert_eq!(tree.find(copy.embedded_ids[0]), Some(copies[0]));
    }

    #[tokio::test]
    async fn duplicate_folder_recreates_structure_once() {
        let mut fx = fixture();
        open(&mut fx.session).await;
        let (_, created) = fx.session.get_or_create_folder("Assets/Rocks/Inner", &none()).await.unwrap();
        let rocks = created[0];
        let rock = fx.session.create_object(LiveObject::new("Rock", mesh()));
        let rock_item = save_new(&mut fx.session, rocks, rock).await;

        // The nested asset is duplicated with its folder, not on its own.
        let copies = fx.session.duplicate(&[rocks, rock_item], &none()).await.unwrap();
        assert_eq!(copies.len(), 1);

        let tree = fx.session.tree().unwrap();
        assert_eq!(tree.path_of(copies[0]).unwrap(), "Assets/Rocks 1");
        assert!(tree.get("Assets/Rocks 1/Inner").is_some_and(|h| tree.is_folder(h)));
        assert!(tree.get("Assets/Rocks 1/Rock.mesh").is_some());
        assert!(tree.get("Assets/Rock 1.mesh").is_none());
        assert!(fx.storage.contains_path("demo", "Assets/Rocks 1/Inner"));
        assert!(fx.storage.contains_path("demo", "Assets/Rocks 1/Rock.mesh"));
    }

    #[tokio::test]
    async fn duplicate_scene_copies_stored_form() {
        let mut fx = fixture();
        open(&mut fx.session).await;
        let root = fx.session.tree().unwrap().root();
        let tree_obj = fx.session.create_object(LiveObject::new("Tree", mesh()));
        fx.session.add_to_scene(tree_obj).unwrap();
        let scene_item = fx
            .session
            .save(vec![SaveRequest::scene(SaveTarget::Folder(root)).with_name("Level")], false, &none())
            .await
            .unwrap()[0];
        let live_before = fx.session.registry().objects().len();

        let copies = fx.session.duplicate(&[scene_item], &none()).await.unwrap();
        let tree = fx.session.tree().unwrap();
        let source = tree.meta(scene_item).unwrap().clone();
        let copy = tree.meta(copies[0]).unwrap().clone();
        assert_eq!(tree.path_of(copies[0]).unwrap(), "Assets/Level 1.scene");
        assert_ne!(copy.id, source.id);
        assert_eq!(copy.embedded_ids.len(), source.embedded_ids.len());
        assert!(copy.embedded_ids.iter().all(|id| !source.embedded_ids.contains(id)));
        assert_eq!(fx.session.registry().objects().len(), live_before);

        let outcome = fx.session.load(&copies, &none()).await.unwrap();
        assert_eq!(outcome.objects[0], Some(Loaded::Scene));
        let scene = fx.session.scene().unwrap();
        let members = &fx.session.object(scene).unwrap().parts;
        assert_eq!(members.len(), 1);
        assert_eq!(fx.session.object(members[0]).unwrap().name, "Tree");
    }

    #[tokio::test]
    async fn move_updates_paths_and_rejects_cycles_and_collisions() {
        let mut fx = fixture();
        open(&mut fx.session).await;
        let root = fx.session.tree().unwrap().root();
        let (props, _) = fx.session.get_or_create_folder("Assets/Props", &none()).await.unwrap();
        let (inner, _) = fx.session.get_or_create_folder("Assets/Props/Inner", &none()).await.unwrap();
        let rock = fx.session.create_object(LiveObject::new("Rock", mesh()));
        let item = save_new(&mut fx.session, root, rock).await;
        let id = fx.session.id_of(rock).unwrap();

        fx.session.move_items(&[item], props, &none()).await.unwrap();
        let tree = fx.session.tree().unwrap();
        assert_eq!(tree.path_of(item).unwrap(), "Assets/Props/Rock.mesh");
        assert_eq!(tree.find(id), Some(item));
        assert!(fx.storage.contains_path("demo", "Assets/Props/Rock.mesh"));
        assert!(!fx.storage.contains_path("demo", "Assets/Rock.mesh"));

        let err = fx.session.move_items(&[props], inner, &none()).await.unwrap_err();
        assert!(matches!(err, SessionError::Tree(TreeError::Cycle(_))));

        let other = fx.session.create_object(LiveObject::new("Rock", mesh()));
        let other_item = save_new(&mut fx.session, root, other).await;
        let writes = fx.storage.write_count();
        let err = fx.session.move_items(&[other_item], props, &none()).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::AlreadyExists);
        assert_eq!(fx.storage.write_count(), writes);
    }

    #[tokio::test]
    async fn rename_tracks_live_object_name() {
        let mut fx = fixture();
        open(&mut fx.session).await;
        let root = fx.session.tree().unwrap().root();
        let rock = fx.session.create_object(LiveObject::new("Rock", mesh()));
        let item = save_new(&mut fx.session, root, rock).await;
        let stone = fx.session.create_object(LiveObject::new("Stone", mesh()));
        save_new(&mut fx.session, root, stone).await;

        fx.session.rename(item, "Boulder", &none()).await.unwrap();
        assert_eq!(fx.session.tree().unwrap().path_of(item).unwrap(), "Assets/Boulder.mesh");
        assert_eq!(fx.session.object(rock).unwrap().name, "Boulder");
        assert!(fx.storage.contains_path("demo", "Assets/Boulder.mesh"));

        let err = fx.session.rename(item, "Stone", &none()).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::AlreadyExists);
        let err = fx.session.rename(item, "a/b", &none()).await.unwrap_err();
        assert!(matches!(err, SessionError::Tree(TreeError::InvalidName(_))));
    }

    #[tokio::test]
    async fn case_only_rename_on_case_insensitive_backend() {
        let config = SessionConfig {
            case_insensitive_paths: true,
            ..SessionConfig::default()
        };
        let mut fx = fixture_with(config, InMemoryStorage::new().with_case_insensitive(true));
        open(&mut fx.session).await;
        let root = fx.session.tree().unwrap().root();
        let rock = fx.session.create_object(LiveObject::new("Rock", mesh()));
        let item = save_new(&mut fx.session, root, rock).await;

        fx.session.rename(item, "rock", &none()).await.unwrap();
        assert_eq!(fx.session.tree().unwrap().path_of(item).unwrap(), "Assets/rock.mesh");
        let paths = fx.storage.paths("demo");
        assert!(paths.iter().any(|p| p == "Assets/rock.mesh"));
        assert!(!paths.iter().any(|p| p == "Assets/Rock.mesh"));
        assert!(!paths.iter().any(|p| p.contains('~')));
    }

    #[tokio::test]
    async fn folder_creation_reports_created_folders() {
        let mut fx = fixture();
        open(&mut fx.session).await;
        let root = fx.session.tree().unwrap().root();
        let mut events = fx.session.subscribe();

        let (deep, created) = fx.session.get_or_create_folder("Assets/A/B", &none()).await.unwrap();
        assert_eq!(created.len(), 2);
        assert_eq!(created[1], deep);
        assert!(fx.storage.contains_path("demo", "Assets/A/B"));
        assert_eq!(events.recv().await.unwrap().kind, EventKind::FolderCreated);

        let revision = fx.session.revision();
        let (again, created) = fx.session.get_or_create_folder("Assets/A/B", &none()).await.unwrap();
        assert_eq!(again, deep);
        assert!(created.is_empty());
        assert_eq!(fx.session.revision(), revision);

        let err = fx.session.get_or_create_folder("Other/A", &none()).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);

        let c = fx.session.create_folder(root, "C", &none()).await.unwrap();
        assert_eq!(fx.session.tree().unwrap().path_of(c).unwrap(), "Assets/C");
        let err = fx.session.create_folder(root, "C", &none()).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::AlreadyExists);
    }
}
