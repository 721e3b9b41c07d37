use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::id::{AssetId, LibraryRef};
use crate::tag::TypeTag;

/// Metadata persisted next to each asset blob (the `.meta` sidecar).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetMeta {
    pub id: AssetId,
    pub type_tag: TypeTag,
    /// Identifiers this asset needs loaded before it is usable.
    pub dependency_ids: BTreeSet<AssetId>,
    /// Identifiers of sub-objects stored inside this asset's blob.
    pub embedded_ids: Vec<AssetId>,
    /// External libraries that must be loaded to satisfy the dependencies.
    pub library_ids: BTreeSet<LibraryRef>,
    #[serde(default)]
    pub preview: Option<Vec<u8>>,
    /// Byte offset of the private binary tail inside the blob, if any.
    #[serde(default)]
    pub custom_data_offset: Option<u64>,
}

impl AssetMeta {
    pub fn new(id: AssetId, type_tag: TypeTag) -> Self {
        Self {
            id,
            type_tag,
            dependency_ids: BTreeSet::new(),
            embedded_ids: Vec::new(),
            library_ids: BTreeSet::new(),
            preview: None,
            custom_data_offset: None,
        }
    }

    /// The asset identifier followed by every embedded identifier.
    pub fn all_ids(&self) -> impl Iterator<Item = AssetId> + '_ {
        std::iter::once(self.id).chain(self.embedded_ids.iter().copied())
    }

    pub fn owns(&self, id: AssetId) -> bool {
        self.id == id || self.embedded_ids.contains(&id)
    }
}

/// Serializable snapshot of a project tree.
///
/// Folders carry `meta: None`. The root node is the project's root folder.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    pub name: String,
    pub extension: String,
    pub meta: Option<AssetMeta>,
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    pub fn folder(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            extension: String::new(),
            meta: None,
            children: Vec::new(),
        }
    }

    pub fn asset(name: impl Into<String>, extension: impl Into<String>, meta: AssetMeta) -> Self {
        Self {
            name: name.into(),
            extension: extension.into(),
            meta: Some(meta),
            children: Vec::new(),
        }
    }

    pub fn with_child(mut self, child: TreeNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn is_folder(&self) -> bool {
        self.meta.is_none()
    }

    /// Number of nodes in this subtree, including `self`.
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(TreeNode::count).sum::<usize>()
    }
}
