use atlas_types::{define_handle, AssetMeta, TypeTag};

define_handle!(ItemHandle, "Generational handle to a [`ProjectItem`] in a [`ProjectTree`](crate::ProjectTree).");

/// One node of the project tree: a folder or an asset item.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProjectItem {
    pub name: String,
    /// Extension including the leading dot. Empty for folders.
    pub extension: String,
    pub(crate) parent: Option<ItemHandle>,
    /// `Some` for folders, `None` for leaves.
    pub(crate) children: Option<Vec<ItemHandle>>,
    /// Asset metadata. Folders have none.
    pub asset: Option<AssetMeta>,
}

impl ProjectItem {
    pub fn folder(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            extension: String::new(),
            parent: None,
            children: Some(Vec::new()),
            asset: None,
        }
    }

    pub fn asset(name: impl Into<String>, extension: impl Into<String>, meta: AssetMeta) -> Self {
        Self {
            name: name.into(),
            extension: extension.into(),
            parent: None,
            children: None,
            asset: Some(meta),
        }
    }

    pub fn is_folder(&self) -> bool {
        self.asset.is_none()
    }

    pub fn parent(&self) -> Option<ItemHandle> {
        self.parent
    }

    pub fn children(&self) -> &[ItemHandle] {
        self.children.as_deref().unwrap_or(&[])
    }

    /// `name + extension`, the item's last path segment.
    pub fn file_name(&self) -> String {
        format!("{}{}", self.name, self.extension)
    }

    pub fn meta(&self) -> Option<&AssetMeta> {
        self.asset.as_ref()
    }

    pub fn type_tag(&self) -> Option<TypeTag> {
        self.asset.as_ref().map(|m| m.type_tag)
    }
}
