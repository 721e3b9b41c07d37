use async_trait::async_trait;
use atlas_types::{AssetMeta, CancelSignal, ProjectInfo, TreeNode};
use serde::{Deserialize, Serialize};

use crate::error::StorageResult;

/// One asset node written by [`Storage::save`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub name: String,
    pub extension: String,
    pub meta: AssetMeta,
}

impl ItemRecord {
    pub fn file_name(&self) -> String {
        format!("{}{}", self.name, self.extension)
    }
}

/// Arguments of one [`Storage::save`] call.
///
/// `folder_paths[i]`, `items[i]` and `blobs[i]` describe the same asset.
/// With `preview_only` set only the preview sidecars are written and `blobs`
/// may be empty.
#[derive(Clone, Debug)]
pub struct SaveBatch {
    pub folder_paths: Vec<String>,
    pub items: Vec<ItemRecord>,
    pub blobs: Vec<Vec<u8>>,
    pub info: ProjectInfo,
    pub preview_only: bool,
}

/// Durable, path-addressed project storage.
///
/// Implementations must:
/// - fail with `Cancelled` when `cancel` is set on entry;
/// - report missing paths, projects and values as `NotFound`;
/// - keep no state that couples one call to another beyond what they persist.
#[async_trait]
pub trait Storage: Send + Sync {
    // Project lifecycle

    async fn create_project(&self, project: &str, info: &ProjectInfo, cancel: &CancelSignal) -> StorageResult<()>;

    async fn copy_project(&self, source: &str, target: &str, cancel: &CancelSignal) -> StorageResult<()>;

    /// Pack the whole project into archive bytes.
    async fn export_project(&self, project: &str, cancel: &CancelSignal) -> StorageResult<Vec<u8>>;

    /// Create `project` from archive bytes produced by `export_project`.
    async fn import_project(&self, project: &str, archive: &[u8], cancel: &CancelSignal) -> StorageResult<()>;

    async fn delete_project(&self, project: &str, cancel: &CancelSignal) -> StorageResult<()>;

    async fn list_projects(&self, cancel: &CancelSignal) -> StorageResult<Vec<String>>;

    async fn get_project_info(&self, project: &str, cancel: &CancelSignal) -> StorageResult<ProjectInfo>;

    async fn save_project_info(&self, project: &str, info: &ProjectInfo, cancel: &CancelSignal) -> StorageResult<()>;

    // Tree and assets

    /// Snapshot of the folder tree rooted at `root_folder`. Asset metadata in
    /// the snapshot carries no preview bytes.
    async fn get_project_tree(&self, project: &str, root_folder: &str, cancel: &CancelSignal) -> StorageResult<TreeNode>;

    /// Preview bytes per asset path, `None` where no preview exists.
    async fn get_previews(&self, project: &str, paths: &[String], cancel: &CancelSignal) -> StorageResult<Vec<Option<Vec<u8>>>>;

    /// Previews of the assets directly inside each folder whose file name
    /// matches `pattern` (at most one `*`).
    async fn get_previews_per_folder(
        &self,
        project: &str,
        folder_paths: &[String],
        pattern: &str,
        cancel: &CancelSignal,
    ) -> StorageResult<Vec<Vec<(String, Vec<u8>)>>>;

    /// Write asset blobs, metadata and previews, then the project info.
    /// Missing folders are created.
    async fn save(&self, project: &str, batch: &SaveBatch, cancel: &CancelSignal) -> StorageResult<()>;

    /// Primary blobs of the given asset paths, in order.
    async fn load(&self, project: &str, paths: &[String], cancel: &CancelSignal) -> StorageResult<Vec<Vec<u8>>>;

    /// Delete assets (with sidecars) or whole folders.
    async fn delete(&self, project: &str, paths: &[String], cancel: &CancelSignal) -> StorageResult<()>;

    async fn move_items(&self, project: &str, paths: &[String], target_folder: &str, cancel: &CancelSignal) -> StorageResult<()>;

    /// Rename `paths[i]` to the file name `names[i]` inside its folder.
    async fn rename(&self, project: &str, paths: &[String], names: &[String], cancel: &CancelSignal) -> StorageResult<()>;

    /// Create folder `names[i]` inside `parent_paths[i]`.
    async fn create_folders(
        &self,
        project: &str,
        parent_paths: &[String],
        names: &[String],
        cancel: &CancelSignal,
    ) -> StorageResult<()>;

    // Key/value namespace

    async fn get_value(&self, project: &str, key: &str, cancel: &CancelSignal) -> StorageResult<Vec<u8>>;

    /// All entries whose key matches `pattern` (at most one `*`), sorted by key.
    async fn get_values(&self, project: &str, pattern: &str, cancel: &CancelSignal) -> StorageResult<Vec<(String, Vec<u8>)>>;

    async fn set_value(&self, project: &str, key: &str, value: &[u8], cancel: &CancelSignal) -> StorageResult<()>;

    async fn delete_value(&self, project: &str, key: &str, cancel: &CancelSignal) -> StorageResult<()>;
}
