//! In-memory reference backend.
//!
//! [`InMemoryStorage`] keeps every project in a `HashMap` behind a `RwLock`.
//! Each call yields to the scheduler once before doing its work, so
//! concurrent callers interleave the way they would against a real backend.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use atlas_types::{CancelSignal, ProjectInfo, TreeNode};
use tracing::debug;

use crate::archive::ProjectArchive;
use crate::error::{StorageError, StorageResult};
use crate::paths::{self, META_SUFFIX, PREVIEW_SUFFIX};
use crate::traits::{ItemRecord, SaveBatch, Storage};

#[derive(Clone, Debug)]
struct ProjectData {
    info: ProjectInfo,
    folders: BTreeSet<String>,
    files: BTreeMap<String, Vec<u8>>,
    values: BTreeMap<String, Vec<u8>>,
}

impl ProjectData {
    fn new(info: ProjectInfo) -> Self {
        Self {
            info,
            folders: BTreeSet::new(),
            files: BTreeMap::new(),
            values: BTreeMap::new(),
        }
    }

    fn find<'a>(keys: impl Iterator<Item = &'a String>, path: &str, ci: bool) -> Option<String> {
        let lowered = path.to_lowercase();
        let mut fallback = None;
        for key in keys {
            if key == path {
                return Some(key.clone());
            }
            if ci && fallback.is_none() && key.to_lowercase() == lowered {
                fallback = Some(key.clone());
            }
        }
        fallback
    }

    fn find_file(&self, path: &str, ci: bool) -> Option<String> {
        Self::find(self.files.keys().filter(|k| !paths::is_sidecar(k)), path, ci)
    }

    fn find_folder(&self, path: &str, ci: bool) -> Option<String> {
        Self::find(self.folders.iter(), path, ci)
    }

    fn exists(&self, path: &str, ci: bool) -> bool {
        self.find_file(path, ci).is_some() || self.find_folder(path, ci).is_some()
    }

    /// Insert `path` and all of its ancestors.
    fn ensure_folder(&mut self, path: &str, ci: bool) {
        let mut prefix = String::new();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            prefix = paths::join(&prefix, segment);
            if self.find_folder(&prefix, ci).is_none() {
                self.folders.insert(prefix.clone());
            }
        }
    }

    fn remove_asset(&mut self, path: &str) {
        self.files.remove(path);
        self.files.remove(&paths::meta_path(path));
        self.files.remove(&paths::preview_path(path));
    }

    fn remove_subtree(&mut self, folder: &str) {
        self.folders.retain(|f| !paths::is_within(f, folder));
        self.files.retain(|f, _| !paths::is_within(f, folder));
    }

    /// Move a file (with sidecars) or a folder subtree from `from` to `to`.
    fn relocate(&mut self, from: &str, to: &str) -> StorageResult<()> {
        if self.folders.contains(from) {
            if paths::is_within(to, from) {
                return Err(StorageError::exception(format!("cannot move {from} into itself")));
            }
            let rekey = |path: &String| format!("{to}{}", &path[from.len()..]);
            let folders: Vec<String> = self.folders.iter().filter(|f| paths::is_within(f, from)).cloned().collect();
            for folder in folders {
                self.folders.remove(&folder);
                self.folders.insert(rekey(&folder));
            }
            let files: Vec<String> = self.files.keys().filter(|f| paths::is_within(f, from)).cloned().collect();
            for file in files {
                if let Some(bytes) = self.files.remove(&file) {
                    self.files.insert(rekey(&file), bytes);
                }
            }
            return Ok(());
        }

        for suffix in ["", META_SUFFIX, PREVIEW_SUFFIX] {
            if let Some(bytes) = self.files.remove(&format!("{from}{suffix}")) {
                self.files.insert(format!("{to}{suffix}"), bytes);
            }
        }
        // The record in the `.meta` sidecar carries the item's name.
        let meta_key = paths::meta_path(to);
        if let Some(bytes) = self.files.get(&meta_key) {
            let mut record: ItemRecord = decode(bytes)?;
            let file_name = paths::split(to).1;
            record.name = file_name
                .strip_suffix(record.extension.as_str())
                .filter(|n| !n.is_empty())
                .unwrap_or(file_name)
                .to_string();
            let encoded = encode(&record)?;
            self.files.insert(meta_key, encoded);
        }
        Ok(())
    }

    fn build_node(&self, folder: &str, name: &str) -> StorageResult<TreeNode> {
        let mut node = TreeNode::folder(name);
        for sub in self.folders.iter().filter(|f| paths::split(f).0 == folder) {
            node.children.push(self.build_node(sub, paths::split(sub).1)?);
        }
        for (path, bytes) in self.files.iter() {
            if path.ends_with(META_SUFFIX) && paths::split(path).0 == folder {
                let record: ItemRecord = decode(bytes)?;
                node.children.push(TreeNode::asset(record.name, record.extension, record.meta));
            }
        }
        Ok(node)
    }

    fn to_archive(&self) -> ProjectArchive {
        ProjectArchive {
            info: self.info.clone(),
            folders: self.folders.iter().cloned().collect(),
            files: self.files.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            values: self.values.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        }
    }

    fn from_archive(archive: ProjectArchive) -> Self {
        Self {
            info: archive.info,
            folders: archive.folders.into_iter().collect(),
            files: archive.files.into_iter().collect(),
            values: archive.values.into_iter().collect(),
        }
    }
}

fn encode<T: serde::Serialize>(value: &T) -> StorageResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| StorageError::exception(format!("encode failed: {e}")))
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> StorageResult<T> {
    bincode::deserialize(bytes).map_err(|e| StorageError::exception(format!("decode failed: {e}")))
}

/// `HashMap`-based [`Storage`] for tests and embedding.
pub struct InMemoryStorage {
    projects: RwLock<HashMap<String, ProjectData>>,
    case_insensitive: bool,
    read_only: AtomicBool,
    writes: AtomicUsize,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            projects: RwLock::new(HashMap::new()),
            case_insensitive: false,
            read_only: AtomicBool::new(false),
            writes: AtomicUsize::new(0),
        }
    }

    /// Treat paths differing only in case as the same path, like a
    /// case-insensitive filesystem.
    pub fn with_case_insensitive(mut self, case_insensitive: bool) -> Self {
        self.case_insensitive = case_insensitive;
        self
    }

    /// While set, every mutating call fails with an `Exception`.
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    /// Number of mutating calls that reached the backing map.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn contains_path(&self, project: &str, path: &str) -> bool {
        let projects = self.projects.read().expect("lock poisoned");
        projects
            .get(project)
            .is_some_and(|p| p.files.contains_key(path) || p.folders.contains(path))
    }

    /// Every stored path of `project`, sidecars included.
    pub fn paths(&self, project: &str) -> Vec<String> {
        let projects = self.projects.read().expect("lock poisoned");
        projects
            .get(project)
            .map(|p| p.folders.iter().chain(p.files.keys()).cloned().collect())
            .unwrap_or_default()
    }

    async fn enter(&self, cancel: &CancelSignal) -> StorageResult<()> {
        tokio::task::yield_now().await;
        if cancel.is_cancelled() {
            return Err(StorageError::cancelled());
        }
        Ok(())
    }

    fn read<R>(&self, project: &str, f: impl FnOnce(&ProjectData) -> StorageResult<R>) -> StorageResult<R> {
        let projects = self.projects.read().expect("lock poisoned");
        let data = projects
            .get(project)
            .ok_or_else(|| StorageError::not_found(format!("project {project}")))?;
        f(data)
    }

    fn write<R>(&self, project: &str, f: impl FnOnce(&mut ProjectData) -> StorageResult<R>) -> StorageResult<R> {
        if self.read_only.load(Ordering::SeqCst) {
            return Err(StorageError::exception("storage is read-only"));
        }
        let mut projects = self.projects.write().expect("lock poisoned");
        let data = projects
            .get_mut(project)
            .ok_or_else(|| StorageError::not_found(format!("project {project}")))?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        f(data)
    }

    fn insert_project(&self, project: &str, data: ProjectData) -> StorageResult<()> {
        if self.read_only.load(Ordering::SeqCst) {
            return Err(StorageError::exception("storage is read-only"));
        }
        let mut projects = self.projects.write().expect("lock poisoned");
        if projects.contains_key(project) {
            return Err(StorageError::already_exists(format!("project {project}")));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        projects.insert(project.to_string(), data);
        Ok(())
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.projects.read().expect("lock poisoned").len();
        f.debug_struct("InMemoryStorage")
            .field("project_count", &count)
            .field("case_insensitive", &self.case_insensitive)
            .finish()
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn create_project(&self, project: &str, info: &ProjectInfo, cancel: &CancelSignal) -> StorageResult<()> {
        self.enter(cancel).await?;
        self.insert_project(project, ProjectData::new(info.clone()))?;
        debug!(project, "created project");
        Ok(())
    }

    async fn copy_project(&self, source: &str, target: &str, cancel: &CancelSignal) -> StorageResult<()> {
        self.enter(cancel).await?;
        let mut data = self.read(source, |d| Ok(d.clone()))?;
        data.info.name = target.to_string();
        self.insert_project(target, data)
    }

    async fn export_project(&self, project: &str, cancel: &CancelSignal) -> StorageResult<Vec<u8>> {
        self.enter(cancel).await?;
        let archive = self.read(project, |d| Ok(d.to_archive()))?;
        archive.to_bytes()
    }

    async fn import_project(&self, project: &str, archive: &[u8], cancel: &CancelSignal) -> StorageResult<()> {
        self.enter(cancel).await?;
        let mut data = ProjectData::from_archive(ProjectArchive::from_bytes(archive)?);
        data.info.name = project.to_string();
        self.insert_project(project, data)
    }

    async fn delete_project(&self, project: &str, cancel: &CancelSignal) -> StorageResult<()> {
        self.enter(cancel).await?;
        if self.read_only.load(Ordering::SeqCst) {
            return Err(StorageError::exception("storage is read-only"));
        }
        let mut projects = self.projects.write().expect("lock poisoned");
        projects
            .remove(project)
            .map(|_| ())
            .ok_or_else(|| StorageError::not_found(format!("project {project}")))
    }

    async fn list_projects(&self, cancel: &CancelSignal) -> StorageResult<Vec<String>> {
        self.enter(cancel).await?;
        let projects = self.projects.read().expect("lock poisoned");
        let mut names: Vec<String> = projects.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn get_project_info(&self, project: &str, cancel: &CancelSignal) -> StorageResult<ProjectInfo> {
        self.enter(cancel).await?;
        self.read(project, |d| Ok(d.info.clone()))
    }

    async fn save_project_info(&self, project: &str, info: &ProjectInfo, cancel: &CancelSignal) -> StorageResult<()> {
        self.enter(cancel).await?;
        self.write(project, |d| {
            d.info = info.clone();
            Ok(())
        })
    }

    async fn get_project_tree(&self, project: &str, root_folder: &str, cancel: &CancelSignal) -> StorageResult<TreeNode> {
        self.enter(cancel).await?;
        self.read(project, |d| d.build_node(root_folder, root_folder))
    }

    async fn get_previews(&self, project: &str, paths: &[String], cancel: &CancelSignal) -> StorageResult<Vec<Option<Vec<u8>>>> {
        self.enter(cancel).await?;
        self.read(project, |d| {
            Ok(paths
                .iter()
                .map(|p| d.files.get(&paths::preview_path(p)).cloned())
                .collect())
        })
    }

    async fn get_previews_per_folder(
        &self,
        project: &str,
        folder_paths: &[String],
        pattern: &str,
        cancel: &CancelSignal,
    ) -> StorageResult<Vec<Vec<(String, Vec<u8>)>>> {
        self.enter(cancel).await?;
        self.read(project, |d| {
            Ok(folder_paths
                .iter()
                .map(|folder| {
                    d.files
                        .iter()
                        .filter_map(|(key, bytes)| {
                            let asset = key.strip_suffix(PREVIEW_SUFFIX)?;
                            let (parent, file_name) = paths::split(asset);
                            (parent == folder && paths::matches_pattern(file_name, pattern))
                                .then(|| (asset.to_string(), bytes.clone()))
                        })
                        .collect()
                })
                .collect())
        })
    }

    async fn save(&self, project: &str, batch: &SaveBatch, cancel: &CancelSignal) -> StorageResult<()> {
        self.enter(cancel).await?;
        let shape_ok = batch.folder_paths.len() == batch.items.len()
            && (batch.preview_only || batch.blobs.len() == batch.items.len());
        if !shape_ok {
            return Err(StorageError::exception("save batch has mismatched lengths"));
        }
        let ci = self.case_insensitive;
        self.write(project, |d| {
            for (i, item) in batch.items.iter().enumerate() {
                let folder = &batch.folder_paths[i];
                d.ensure_folder(folder, ci);
                let path = paths::join(folder, &item.file_name());
                if !batch.preview_only {
                    if let Some(existing) = d.find_file(&path, ci).filter(|k| *k != path) {
                        d.remove_asset(&existing);
                    }
                    let mut stored = item.clone();
                    stored.meta.preview = None;
                    d.files.insert(path.clone(), batch.blobs[i].clone());
                    d.files.insert(paths::meta_path(&path), encode(&stored)?);
                }
                match item.meta.preview.as_ref() {
                    Some(bytes) => {
                        d.files.insert(paths::preview_path(&path), bytes.clone());
                    }
                    None => {
                        d.files.remove(&paths::preview_path(&path));
                    }
                }
            }
            d.info = batch.info.clone();
            Ok(())
        })?;
        debug!(project, items = batch.items.len(), preview_only = batch.preview_only, "saved batch");
        Ok(())
    }

    async fn load(&self, project: &str, paths: &[String], cancel: &CancelSignal) -> StorageResult<Vec<Vec<u8>>> {
        self.enter(cancel).await?;
        let ci = self.case_insensitive;
        self.read(project, |d| {
            paths
                .iter()
                .map(|p| {
                    d.find_file(p, ci)
                        .and_then(|key| d.files.get(&key).cloned())
                        .ok_or_else(|| StorageError::not_found(p.clone()))
                })
                .collect()
        })
    }

    async fn delete(&self, project: &str, paths: &[String], cancel: &CancelSignal) -> StorageResult<()> {
        self.enter(cancel).await?;
        let ci = self.case_insensitive;
        self.write(project, |d| {
            let mut targets = Vec::with_capacity(paths.len());
            for p in paths {
                if let Some(folder) = d.find_folder(p, ci) {
                    targets.push((folder, true));
                } else if let Some(file) = d.find_file(p, ci) {
                    targets.push((file, false));
                } else {
                    return Err(StorageError::not_found(p.clone()));
                }
            }
            for (path, is_folder) in targets {
                if is_folder {
                    d.remove_subtree(&path);
                } else {
                    d.remove_asset(&path);
                }
            }
            Ok(())
        })?;
        debug!(project, count = paths.len(), "deleted paths");
        Ok(())
    }

    async fn move_items(&self, project: &str, paths: &[String], target_folder: &str, cancel: &CancelSignal) -> StorageResult<()> {
        self.enter(cancel).await?;
        let ci = self.case_insensitive;
        self.write(project, |d| {
            d.ensure_folder(target_folder, ci);
            for p in paths {
                let from = d
                    .find_folder(p, ci)
                    .or_else(|| d.find_file(p, ci))
                    .ok_or_else(|| StorageError::not_found(p.clone()))?;
                let to = paths::join(target_folder, paths::split(&from).1);
                if to == from {
                    continue;
                }
                if d.exists(&to, ci) {
                    return Err(StorageError::already_exists(to));
                }
                d.relocate(&from, &to)?;
            }
            Ok(())
        })
    }

    async fn rename(&self, project: &str, paths: &[String], names: &[String], cancel: &CancelSignal) -> StorageResult<()> {
        self.enter(cancel).await?;
        if paths.len() != names.len() {
            return Err(StorageError::exception("rename has mismatched lengths"));
        }
        let ci = self.case_insensitive;
        self.write(project, |d| {
            for (p, name) in paths.iter().zip(names) {
                let from = d
                    .find_folder(p, ci)
                    .or_else(|| d.find_file(p, ci))
                    .ok_or_else(|| StorageError::not_found(p.clone()))?;
                let to = paths::join(paths::split(&from).0, name);
                if to == from {
                    continue;
                }
                // On a case-insensitive backend a case-only rename collides
                // with the source itself.
                if d.exists(&to, ci) {
                    return Err(StorageError::already_exists(to));
                }
                d.relocate(&from, &to)?;
            }
            Ok(())
        })
    }

    async fn create_folders(
        &self,
        project: &str,
        parent_paths: &[String],
        names: &[String],
        cancel: &CancelSignal,
    ) -> StorageResult<()> {
        self.enter(cancel).await?;
        if parent_paths.len() != names.len() {
            return Err(StorageError::exception("create_folders has mismatched lengths"));
        }
        let ci = self.case_insensitive;
        self.write(project, |d| {
            for (parent, name) in parent_paths.iter().zip(names) {
                let path = paths::join(parent, name);
                if d.exists(&path, ci) {
                    return Err(StorageError::already_exists(path));
                }
                d.ensure_folder(&path, ci);
            }
            Ok(())
        })
    }

    async fn get_value(&self, project: &str, key: &str, cancel: &CancelSignal) -> StorageResult<Vec<u8>> {
        self.enter(cancel).await?;
        self.read(project, |d| {
            d.values
                .get(key)
                .cloned()
                .ok_or_else(|| StorageError::not_found(format!("value {key}")))
        })
    }

    async fn get_values(&self, project: &str, pattern: &str, cancel: &CancelSignal) -> StorageResult<Vec<(String, Vec<u8>)>> {
        self.enter(cancel).await?;
        self.read(project, |d| {
            Ok(d.values
                .iter()
                .filter(|(k, _)| paths::matches_pattern(k, pattern))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect())
        })
    }

    async fn set_value(&self, project: &str, key: &str, value: &[u8], cancel: &CancelSignal) -> StorageResult<()> {
        self.enter(cancel).await?;
        self.write(project, |d| {
            d.values.insert(key.to_string(), value.to_vec());
            Ok(())
        })
    }

    async fn delete_value(&self, project: &str, key: &str, cancel: &CancelSignal) -> StorageResult<()> {
        self.enter(cancel).await?;
        self.write(project, |d| {
            d.values
                .remove(key)
                .map(|_| ())
                .ok_or_else(|| StorageError::not_found(format!("value {key}")))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageErrorKind;
    use atlas_types::{AssetId, AssetMeta, CancellationSource, TypeTag};

    const P: &str = "demo";

    fn none() -> CancelSignal {
        CancelSignal::none()
    }

    fn record(name: &str, local: u32) -> ItemRecord {
        ItemRecord {
            name: name.into(),
            extension: ".mesh".into(),
            meta: AssetMeta::new(AssetId::dynamic_id(1, local).unwrap(), TypeTag::from_name("Mesh")),
        }
    }

    async fn with_project() -> (InMemoryStorage, ProjectInfo) {
        let storage = InMemoryStorage::new();
        let info = ProjectInfo::new(P);
        storage.create_project(P, &info, &none()).await.unwrap();
        (storage, info)
    }

    async fn save_one(storage: &InMemoryStorage, info: &ProjectInfo, folder: &str, item: ItemRecord, blob: &[u8]) {
        let batch = SaveBatch {
            folder_paths: vec![folder.into()],
            items: vec![item],
            blobs: vec![blob.to_vec()],
            info: info.clone(),
            preview_only: false,
        };
        storage.save(P, &batch, &none()).await.unwrap();
    }

    // -----------------------------------------------------------------------
    // Projects
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn project_lifecycle() {
        let (storage, info) = with_project().await;
        let err = storage.create_project(P, &info, &none()).await.unwrap_err();
        assert_eq!(err.kind, StorageErrorKind::AlreadyExists);

        storage.copy_project(P, "copy", &none()).await.unwrap();
        assert_eq!(storage.list_projects(&none()).await.unwrap(), vec!["copy", "demo"]);
        assert_eq!(storage.get_project_info("copy", &none()).await.unwrap().name, "copy");

        storage.delete_project("copy", &none()).await.unwrap();
        let err = storage.get_project_info("copy", &none()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn export_import_round_trip() {
        let (storage, info) = with_project().await;
        save_one(&storage, &info, "Assets/Props", record("Crate", 1), b"blob").await;
        storage.set_value(P, "k.bin", b"v", &none()).await.unwrap();

        let archive = storage.export_project(P, &none()).await.unwrap();
        storage.import_project("restored", &archive, &none()).await.unwrap();

        let blobs = storage
            .load("restored", &["Assets/Props/Crate.mesh".into()], &none())
            .await
            .unwrap();
        assert_eq!(blobs, vec![b"blob".to_vec()]);
        assert_eq!(storage.get_value("restored", "k.bin", &none()).await.unwrap(), b"v");

        let mut corrupt = archive.clone();
        let last = corrupt.len() - 1;
        corrupt[last] ^= 1;
        let err = storage.import_project("broken", &corrupt, &none()).await.unwrap_err();
        assert_eq!(err.kind, StorageErrorKind::Exception);
    }

    // -----------------------------------------------------------------------
    // Assets and tree
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn save_writes_blob_and_sidecars() {
        let (storage, info) = with_project().await;
        let mut item = record("Crate", 1);
        item.meta.preview = Some(vec![7]);
        save_one(&storage, &info, "Assets/Props", item, b"blob").await;

        assert!(storage.contains_path(P, "Assets/Props/Crate.mesh"));
        assert!(storage.contains_path(P, "Assets/Props/Crate.mesh.meta"));
        assert!(storage.contains_path(P, "Assets/Props/Crate.mesh.preview"));
        assert!(storage.contains_path(P, "Assets/Props"));

        let previews = storage
            .get_previews(P, &["Assets/Props/Crate.mesh".into(), "Assets/none".into()], &none())
            .await
            .unwrap();
        assert_eq!(previews, vec![Some(vec![7]), None]);
    }

    #[tokio::test]
    async fn project_tree_reflects_folders_and_assets() {
        let (storage, info) = with_project().await;
        save_one(&storage, &info, "Assets/Props", record("Crate", 1), b"a").await;
        storage
            .create_folders(P, &["Assets".into()], &["Empty".into()], &none())
            .await
            .unwrap();

        let tree = storage.get_project_tree(P, "Assets", &none()).await.unwrap();
        assert_eq!(tree.name, "Assets");
        let names: Vec<&str> = tree.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Empty", "Props"]);
        let props = &tree.children[1];
        assert_eq!(props.children.len(), 1);
        assert_eq!(props.children[0].name, "Crate");
        assert_eq!(props.children[0].extension, ".mesh");
        assert!(props.children[0].meta.as_ref().unwrap().preview.is_none());
    }

    #[tokio::test]
    async fn move_and_rename_update_paths_and_records() {
        let (storage, info) = with_project().await;
        save_one(&storage, &info, "Assets/Props", record("Crate", 1), b"a").await;

        storage
            .move_items(P, &["Assets/Props/Crate.mesh".into()], "Assets/Other", &none())
            .await
            .unwrap();
        storage
            .rename(P, &["Assets/Other/Crate.mesh".into()], &["Box.mesh".into()], &none())
            .await
            .unwrap();

        let tree = storage.get_project_tree(P, "Assets", &none()).await.unwrap();
        let other = tree.children.iter().find(|c| c.name == "Other").unwrap();
        assert_eq!(other.children[0].name, "Box");
        assert!(storage.contains_path(P, "Assets/Other/Box.mesh.meta"));
        assert!(!storage.contains_path(P, "Assets/Props/Crate.mesh"));
    }

    #[tokio::test]
    async fn folder_move_carries_contents() {
        let (storage, info) = with_project().await;
        save_one(&storage, &info, "Assets/A/B", record("Crate", 1), b"a").await;
        storage
            .move_items(P, &["Assets/A/B".into()], "Assets/C", &none())
            .await
            .unwrap();
        assert!(storage.contains_path(P, "Assets/C/B/Crate.mesh"));
        assert!(!storage.contains_path(P, "Assets/A/B"));

        let err = storage
            .move_items(P, &["Assets/C".into()], "Assets/C/B", &none())
            .await
            .unwrap_err();
        assert_eq!(err.kind, StorageErrorKind::Exception);
    }

    #[tokio::test]
    async fn case_only_rename_collides_on_case_insensitive_backend() {
        let storage = InMemoryStorage::new().with_case_insensitive(true);
        let info = ProjectInfo::new(P);
        storage.create_project(P, &info, &none()).await.unwrap();
        save_one(&storage, &info, "Assets", record("crate", 1), b"a").await;

        let err = storage
            .rename(P, &["Assets/crate.mesh".into()], &["Crate.mesh".into()], &none())
            .await
            .unwrap_err();
        assert_eq!(err.kind, StorageErrorKind::AlreadyExists);

        // Two steps through a temporary name succeed.
        storage
            .rename(P, &["Assets/crate.mesh".into()], &["crate.tmp.mesh".into()], &none())
            .await
            .unwrap();
        storage
            .rename(P, &["Assets/crate.tmp.mesh".into()], &["Crate.mesh".into()], &none())
            .await
            .unwrap();
        assert!(storage.contains_path(P, "Assets/Crate.mesh"));
    }

    #[tokio::test]
    async fn delete_removes_sidecars_and_subtrees() {
        let (storage, info) = with_project().await;
        save_one(&storage, &info, "Assets/Props", record("Crate", 1), b"a").await;
        save_one(&storage, &info, "Assets/Props/Deep", record("Barrel", 2), b"b").await;

        storage.delete(P, &["Assets/Props".into()], &none()).await.unwrap();
        assert_eq!(storage.paths(P), vec!["Assets".to_string()]);

        let err = storage.delete(P, &["Assets/Props".into()], &none()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn previews_per_folder_filter_by_pattern() {
        let (storage, info) = with_project().await;
        for (name, local) in [("Crate", 1), ("Barrel", 2)] {
            let mut item = record(name, local);
            item.meta.preview = Some(vec![local as u8]);
            save_one(&storage, &info, "Assets", item, b"x").await;
        }
        let previews = storage
            .get_previews_per_folder(P, &["Assets".into()], "C*", &none())
            .await
            .unwrap();
        assert_eq!(previews, vec![vec![("Assets/Crate.mesh".to_string(), vec![1])]]);
    }

    // -----------------------------------------------------------------------
    // Values, cancellation, failures
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn key_value_namespace() {
        let (storage, _) = with_project().await;
        assert!(storage.get_value(P, "missing", &none()).await.unwrap_err().is_not_found());

        storage.set_value(P, "AssetLibrary_1.idmap", b"1", &none()).await.unwrap();
        storage.set_value(P, "AssetLibrary_2.idmap", b"2", &none()).await.unwrap();
        storage.set_value(P, "Libraries.catalog", b"c", &none()).await.unwrap();

        let values = storage.get_values(P, "AssetLibrary_*.idmap", &none()).await.unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(values[0].0, "AssetLibrary_1.idmap");

        storage.delete_value(P, "Libraries.catalog", &none()).await.unwrap();
        assert!(storage.delete_value(P, "Libraries.catalog", &none()).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn cancelled_calls_do_nothing() {
        let (storage, info) = with_project().await;
        let source = CancellationSource::new();
        source.cancel();
        let before = storage.write_count();

        let err = storage.save_project_info(P, &info, &source.signal()).await.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(storage.write_count(), before);
    }

    #[tokio::test]
    async fn read_only_switch_fails_writes() {
        let (storage, info) = with_project().await;
        storage.set_read_only(true);
        let err = storage.save_project_info(P, &info, &none()).await.unwrap_err();
        assert_eq!(err.kind, StorageErrorKind::Exception);
        // Reads still work.
        storage.get_project_info(P, &none()).await.unwrap();
    }
}
