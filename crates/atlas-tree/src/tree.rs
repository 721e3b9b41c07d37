//! The project tree arena and its identifier cache.

use std::collections::HashMap;

use atlas_types::{AssetId, AssetMeta, TreeNode};
use tracing::{debug, warn};

use crate::error::{TreeError, TreeResult};
use crate::item::{ItemHandle, ProjectItem};

#[derive(Debug)]
struct Slot {
    generation: u32,
    item: Option<ProjectItem>,
}

/// In-memory project tree.
///
/// Read accessors take `&self` and never touch the identifier cache. Every
/// mutation that adds or removes asset items keeps the cache in step.
#[derive(Debug)]
pub struct ProjectTree {
    slots: Vec<Slot>,
    free: Vec<u32>,
    root: ItemHandle,
    cache: HashMap<AssetId, ItemHandle>,
    case_insensitive: bool,
}

impl ProjectTree {
    /// An empty tree whose root folder is named `root_name`.
    pub fn new(root_name: impl Into<String>) -> Self {
        Self {
            slots: vec![Slot {
                generation: 0,
                item: Some(ProjectItem::folder(root_name)),
            }],
            free: Vec::new(),
            root: ItemHandle::from_parts(0, 0),
            cache: HashMap::new(),
            case_insensitive: false,
        }
    }

    /// Compare sibling names ignoring ASCII and Unicode case.
    pub fn with_case_insensitive(mut self, case_insensitive: bool) -> Self {
        self.case_insensitive = case_insensitive;
        self
    }

    pub fn is_case_insensitive(&self) -> bool {
        self.case_insensitive
    }

    pub fn root(&self) -> ItemHandle {
        self.root
    }

    /// Number of items, root included.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.item.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() <= 1
    }

    // ---------------------------------------------------------------
    // Slot access
    // ---------------------------------------------------------------

    pub fn contains(&self, handle: ItemHandle) -> bool {
        self.get_item(handle).is_some()
    }

    pub fn get_item(&self, handle: ItemHandle) -> Option<&ProjectItem> {
        self.slots
            .get(handle.index() as usize)
            .filter(|s| s.generation == handle.generation())
            .and_then(|s| s.item.as_ref())
    }

    pub fn item(&self, handle: ItemHandle) -> TreeResult<&ProjectItem> {
        self.get_item(handle).ok_or(TreeError::StaleHandle(handle))
    }

    fn item_mut(&mut self, handle: ItemHandle) -> TreeResult<&mut ProjectItem> {
        self.slots
            .get_mut(handle.index() as usize)
            .filter(|s| s.generation == handle.generation())
            .and_then(|s| s.item.as_mut())
            .ok_or(TreeError::StaleHandle(handle))
    }

    pub fn parent(&self, handle: ItemHandle) -> TreeResult<Option<ItemHandle>> {
        self.item(handle).map(|i| i.parent)
    }

    pub fn children(&self, handle: ItemHandle) -> TreeResult<&[ItemHandle]> {
        self.item(handle).map(|i| i.children())
    }

    pub fn is_folder(&self, handle: ItemHandle) -> bool {
        self.get_item(handle).is_some_and(ProjectItem::is_folder)
    }

    pub fn meta(&self, handle: ItemHandle) -> Option<&AssetMeta> {
        self.get_item(handle).and_then(|i| i.asset.as_ref())
    }

    fn alloc(&mut self, item: ProjectItem) -> ItemHandle {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.item = Some(item);
            return ItemHandle::from_parts(index, slot.generation);
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            item: Some(item),
        });
        ItemHandle::from_parts(index, 0)
    }

    fn release(&mut self, handle: ItemHandle) -> Option<ProjectItem> {
        let slot = self.slots.get_mut(handle.index() as usize)?;
        if slot.generation != handle.generation() {
            return None;
        }
        let item = slot.item.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index());
        Some(item)
    }

    // ---------------------------------------------------------------
    // Names and paths
    // ---------------------------------------------------------------

    fn same_name(&self, a: &str, b: &str) -> bool {
        if self.case_insensitive {
            a.to_lowercase() == b.to_lowercase()
        } else {
            a == b
        }
    }

    fn validate_name(name: &str) -> TreeResult<()> {
        if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
            return Err(TreeError::InvalidName(name.to_string()));
        }
        Ok(())
    }

    /// The child of `parent` whose file name matches `file_name`.
    pub fn child_named(&self, parent: ItemHandle, file_name: &str) -> Option<ItemHandle> {
        let parent = self.get_item(parent)?;
        parent.children().iter().copied().find(|c| {
            self.get_item(*c)
                .is_some_and(|item| self.same_name(&item.file_name(), file_name))
        })
    }

    fn sibling_collides(&self, parent: ItemHandle, file_name: &str, except: Option<ItemHandle>) -> bool {
        self.get_item(parent).is_some_and(|p| {
            p.children().iter().any(|c| {
                Some(*c) != except
                    && self
                        .get_item(*c)
                        .is_some_and(|item| self.same_name(&item.file_name(), file_name))
            })
        })
    }

    /// Ancestor file names joined with `/`, starting at the root folder.
    pub fn path_of(&self, handle: ItemHandle) -> TreeResult<String> {
        let mut segments = Vec::new();
        let mut current = Some(handle);
        while let Some(h) = current {
            let item = self.item(h)?;
            segments.push(item.file_name());
            current = item.parent;
        }
        segments.reverse();
        Ok(segments.join("/"))
    }

    /// Path of the folder holding `handle`. The root's folder path is empty.
    pub fn folder_path_of(&self, handle: ItemHandle) -> TreeResult<String> {
        match self.item(handle)?.parent {
            Some(parent) => self.path_of(parent),
            None => Ok(String::new()),
        }
    }

    /// Resolve a `/`-separated path whose first segment is the root name.
    pub fn get(&self, path: &str) -> Option<ItemHandle> {
        let mut segments = path.split('/').filter(|s| !s.is_empty());
        let root_name = self.get_item(self.root)?.name.as_str();
        if !self.same_name(segments.next()?, root_name) {
            return None;
        }
        segments.try_fold(self.root, |current, segment| self.child_named(current, segment))
    }

    /// Resolve `path`, creating missing folders. Returns the folder and the
    /// handles of the folders created, outermost first.
    pub fn get_or_create_folder(&mut self, path: &str) -> TreeResult<(ItemHandle, Vec<ItemHandle>)> {
        let mut segments = path.split('/').filter(|s| !s.is_empty());
        let root_name = self.item(self.root)?.name.clone();
        match segments.next() {
            Some(first) if self.same_name(first, &root_name) => {}
            _ => return Err(TreeError::NotFound(path.to_string())),
        }

        let mut current = self.root;
        let mut created = Vec::new();
        for segment in segments {
            current = match self.child_named(current, segment) {
                Some(existing) if self.is_folder(existing) => existing,
                Some(existing) => return Err(TreeError::NotAFolder(self.path_of(existing)?)),
                None => {
                    let folder = self.add_child(current, ProjectItem::folder(segment))?;
                    created.push(folder);
                    folder
                }
            };
        }
        Ok((current, created))
    }

    /// `name` if free among the children of `parent`, else `name 1`,
    /// `name 2`, ...
    pub fn unique_name(&self, parent: ItemHandle, name: &str, extension: &str) -> String {
        if !self.sibling_collides(parent, &format!("{name}{extension}"), None) {
            return name.to_string();
        }
        (1u64..)
            .map(|n| format!("{name} {n}"))
            .find(|candidate| !self.sibling_collides(parent, &format!("{candidate}{extension}"), None))
            .unwrap_or_else(|| name.to_string())
    }

    // ---------------------------------------------------------------
    // Structure
    // ---------------------------------------------------------------

    /// Attach `item` under `parent` and index its identifiers.
    pub fn add_child(&mut self, parent: ItemHandle, item: ProjectItem) -> TreeResult<ItemHandle> {
        let handle = self.attach(parent, item)?;
        self.index(handle);
        Ok(handle)
    }

    pub fn add_folder(&mut self, parent: ItemHandle, name: &str) -> TreeResult<ItemHandle> {
        self.add_child(parent, ProjectItem::folder(name))
    }

    pub fn add_asset(
        &mut self,
        parent: ItemHandle,
        name: &str,
        extension: &str,
        meta: AssetMeta,
    ) -> TreeResult<ItemHandle> {
        self.add_child(parent, ProjectItem::asset(name, extension, meta))
    }

    fn attach(&mut self, parent: ItemHandle, mut item: ProjectItem) -> TreeResult<ItemHandle> {
        Self::validate_name(&item.name)?;
        if !self.item(parent)?.is_folder() {
            return Err(TreeError::NotAFolder(self.path_of(parent)?));
        }
        let file_name = item.file_name();
        if self.sibling_collides(parent, &file_name, None) {
            return Err(TreeError::NameCollision(format!("{}/{file_name}", self.path_of(parent)?)));
        }
        if let Some(meta) = item.asset.as_ref() {
            if let Some(dup) = meta.all_ids().find(|id| self.cache.contains_key(id)) {
                return Err(TreeError::DuplicateId(dup));
            }
        }

        item.parent = Some(parent);
        item.children = if item.is_folder() { Some(Vec::new()) } else { None };
        let handle = self.alloc(item);
        if let Some(children) = self.item_mut(parent)?.children.as_mut() {
            children.push(handle);
        }
        debug!(%handle, name = %file_name, "attached item");
        Ok(handle)
    }

    fn index(&mut self, handle: ItemHandle) {
        let ids: Vec<AssetId> = match self.meta(handle) {
            Some(meta) => meta.all_ids().collect(),
            None => return,
        };
        for id in ids {
            self.cache.insert(id, handle);
        }
    }

    fn unindex(&mut self, meta: &AssetMeta) {
        for id in meta.all_ids() {
            self.cache.remove(&id);
        }
    }

    /// Detach the subtree at `handle` and unindex its identifiers. Returns
    /// the removed items, deepest first.
    pub fn remove(&mut self, handle: ItemHandle) -> TreeResult<Vec<ProjectItem>> {
        if handle == self.root {
            return Err(TreeError::IsRoot);
        }
        let parent = self.item(handle)?.parent;
        let mut order = self.subtree(handle)?;
        order.reverse();

        if let Some(parent) = parent {
            if let Some(children) = self.item_mut(parent)?.children.as_mut() {
                children.retain(|c| *c != handle);
            }
        }
        let mut removed = Vec::with_capacity(order.len());
        for h in order {
            if let Some(item) = self.release(h) {
                if let Some(meta) = item.asset.as_ref() {
                    self.unindex(meta);
                }
                removed.push(item);
            }
        }
        debug!(%handle, count = removed.len(), "removed subtree");
        Ok(removed)
    }

    /// [`ProjectTree::remove`] after checking that `child` sits under `parent`.
    pub fn remove_child(&mut self, parent: ItemHandle, child: ItemHandle) -> TreeResult<Vec<ProjectItem>> {
        if self.item(child)?.parent != Some(parent) {
            return Err(TreeError::NotFound(self.path_of(child)?));
        }
        self.remove(child)
    }

    pub fn rename(&mut self, handle: ItemHandle, new_name: &str) -> TreeResult<()> {
        if handle == self.root {
            return Err(TreeError::IsRoot);
        }
        Self::validate_name(new_name)?;
        let item = self.item(handle)?;
        let file_name = format!("{new_name}{}", item.extension);
        if let Some(parent) = item.parent {
            if self.sibling_collides(parent, &file_name, Some(handle)) {
                return Err(TreeError::NameCollision(format!("{}/{file_name}", self.path_of(parent)?)));
            }
        }
        self.item_mut(handle)?.name = new_name.to_string();
        Ok(())
    }

    /// Returns `true` if `ancestor` is `handle` or one of its ancestors.
    pub fn is_ancestor_or_self(&self, ancestor: ItemHandle, handle: ItemHandle) -> bool {
        let mut current = Some(handle);
        while let Some(h) = current {
            if h == ancestor {
                return true;
            }
            current = self.get_item(h).and_then(|i| i.parent);
        }
        false
    }

    pub fn move_to(&mut self, handle: ItemHandle, new_parent: ItemHandle) -> TreeResult<()> {
        if handle == self.root {
            return Err(TreeError::IsRoot);
        }
        if !self.item(new_parent)?.is_folder() {
            return Err(TreeError::NotAFolder(self.path_of(new_parent)?));
        }
        if self.is_ancestor_or_self(handle, new_parent) {
            return Err(TreeError::Cycle(self.path_of(handle)?));
        }
        let item = self.item(handle)?;
        let old_parent = item.parent;
        if old_parent == Some(new_parent) {
            return Ok(());
        }
        let file_name = item.file_name();
        if self.sibling_collides(new_parent, &file_name, None) {
            return Err(TreeError::NameCollision(format!("{}/{file_name}", self.path_of(new_parent)?)));
        }

        if let Some(old) = old_parent {
            if let Some(children) = self.item_mut(old)?.children.as_mut() {
                children.retain(|c| *c != handle);
            }
        }
        if let Some(children) = self.item_mut(new_parent)?.children.as_mut() {
            children.push(handle);
        }
        self.item_mut(handle)?.parent = Some(new_parent);
        Ok(())
    }

    /// Replace the metadata of an asset item and re-index its identifiers.
    pub fn set_meta(&mut self, handle: ItemHandle, meta: AssetMeta) -> TreeResult<()> {
        let old = match self.item(handle)?.asset.as_ref() {
            Some(old) => old.clone(),
            None => return Err(TreeError::NotFound(self.path_of(handle)?)),
        };
        if let Some(dup) = meta
            .all_ids()
            .find(|id| self.cache.get(id).is_some_and(|owner| *owner != handle))
        {
            return Err(TreeError::DuplicateId(dup));
        }
        self.unindex(&old);
        self.item_mut(handle)?.asset = Some(meta);
        self.index(handle);
        Ok(())
    }

    pub fn set_preview(&mut self, handle: ItemHandle, preview: Option<Vec<u8>>) -> TreeResult<()> {
        let path = self.path_of(handle)?;
        match self.item_mut(handle)?.asset.as_mut() {
            Some(meta) => {
                meta.preview = preview;
                Ok(())
            }
            None => Err(TreeError::NotFound(path)),
        }
    }

    // ---------------------------------------------------------------
    // Traversal
    // ---------------------------------------------------------------

    /// `handle` and everything under it, parents before children.
    pub fn subtree(&self, handle: ItemHandle) -> TreeResult<Vec<ItemHandle>> {
        self.item(handle)?;
        let mut out = Vec::new();
        let mut stack = vec![handle];
        while let Some(h) = stack.pop() {
            if let Some(item) = self.get_item(h) {
                out.push(h);
                stack.extend(item.children().iter().rev().copied());
            }
        }
        Ok(out)
    }

    /// Asset items at or below `handle`, deepest first.
    pub fn descendant_assets(&self, handle: ItemHandle) -> TreeResult<Vec<ItemHandle>> {
        let mut order = self.subtree(handle)?;
        order.reverse();
        order.retain(|h| !self.is_folder(*h));
        Ok(order)
    }

    /// Every item from the root down, optionally dropping folders or assets.
    pub fn flatten(&self, exclude_folders: bool, exclude_assets: bool) -> Vec<ItemHandle> {
        self.subtree(self.root)
            .unwrap_or_default()
            .into_iter()
            .filter(|h| {
                let folder = self.is_folder(*h);
                !((folder && exclude_folders) || (!folder && exclude_assets))
            })
            .collect()
    }

    // ---------------------------------------------------------------
    // Identifier cache
    // ---------------------------------------------------------------

    /// The item owning `id`, either as its asset id or an embedded id.
    pub fn find(&self, id: AssetId) -> Option<ItemHandle> {
        self.cache.get(&id).copied()
    }

    pub fn contains_id(&self, id: AssetId) -> bool {
        self.cache.contains_key(&id)
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Re-index every asset item. Returns the number of cached identifiers.
    pub fn rebuild_cache(&mut self) -> usize {
        self.cache.clear();
        for handle in self.flatten(true, false) {
            let ids: Vec<AssetId> = match self.meta(handle) {
                Some(meta) => meta.all_ids().collect(),
                None => continue,
            };
            for id in ids {
                if let Some(first) = self.cache.get(&id) {
                    warn!(%id, kept = %first, ignored = %handle, "identifier owned by two items");
                    continue;
                }
                self.cache.insert(id, handle);
            }
        }
        self.cache.len()
    }

    // ---------------------------------------------------------------
    // Snapshots
    // ---------------------------------------------------------------

    /// Build a tree from a storage snapshot and rebuild the cache.
    pub fn from_node(node: &TreeNode, case_insensitive: bool) -> TreeResult<Self> {
        let mut tree = Self::new(node.name.clone()).with_case_insensitive(case_insensitive);
        let mut stack: Vec<(ItemHandle, &TreeNode)> =
            node.children.iter().rev().map(|c| (tree.root, c)).collect();
        while let Some((parent, child)) = stack.pop() {
            let item = match child.meta.as_ref() {
                Some(meta) => ProjectItem::asset(child.name.clone(), child.extension.clone(), meta.clone()),
                None => ProjectItem::folder(child.name.clone()),
            };
            let handle = tree.attach(parent, item)?;
            stack.extend(child.children.iter().rev().map(|c| (handle, c)));
        }
        let cached = tree.rebuild_cache();
        debug!(items = tree.len(), cached, "built project tree from snapshot");
        Ok(tree)
    }

    pub fn node_of(&self, handle: ItemHandle) -> TreeResult<TreeNode> {
        let item = self.item(handle)?;
        let mut children = Vec::with_capacity(item.children().len());
        for child in item.children() {
            children.push(self.node_of(*child)?);
        }
        Ok(TreeNode {
            name: item.name.clone(),
            extension: item.extension.clone(),
            meta: item.asset.clone(),
            children,
        })
    }

    pub fn to_node(&self) -> TreeResult<TreeNode> {
        self.node_of(self.root)
    }
}
