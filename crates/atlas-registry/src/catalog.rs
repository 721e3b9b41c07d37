//! Type capability catalog.
//!
//! Maps each [`TypeTag`] to the facts the store needs about it: a display
//! name, the persistent kind it produces and the file extension its assets
//! are stored under.

use std::collections::HashMap;

use atlas_types::{PersistentKind, TypeTag};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{RegistryError, RegistryResult};

/// Type name of the built-in scene type.
pub const SCENE_TYPE_NAME: &str = "Scene";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeInfo {
    pub name: String,
    pub kind: PersistentKind,
    /// Extension including the leading dot, e.g. `.mat`.
    pub extension: String,
}

#[derive(Clone, Debug, Default)]
pub struct TypeCatalog {
    types: HashMap<TypeTag, TypeInfo>,
}

impl TypeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A catalog with the scene type already registered.
    pub fn with_builtin() -> Self {
        let mut catalog = Self::new();
        catalog.register_named(SCENE_TYPE_NAME, PersistentKind::Scene, ".scene");
        catalog
    }

    /// Register (or replace) the capabilities of `tag`.
    pub fn register(&mut self, tag: TypeTag, info: TypeInfo) {
        debug!(%tag, name = %info.name, kind = %info.kind, "registered type");
        self.types.insert(tag, info);
    }

    /// Register a type whose tag is derived from its name.
    pub fn register_named(&mut self, name: &str, kind: PersistentKind, extension: &str) -> TypeTag {
        let tag = TypeTag::from_name(name);
        self.register(
            tag,
            TypeInfo {
                name: name.to_string(),
                kind,
                extension: extension.to_string(),
            },
        );
        tag
    }

    pub fn get(&self, tag: TypeTag) -> Option<&TypeInfo> {
        self.types.get(&tag)
    }

    pub fn info(&self, tag: TypeTag) -> RegistryResult<&TypeInfo> {
        self.get(tag).ok_or(RegistryError::UnknownType(tag))
    }

    pub fn kind(&self, tag: TypeTag) -> RegistryResult<PersistentKind> {
        self.info(tag).map(|i| i.kind)
    }

    pub fn extension(&self, tag: TypeTag) -> RegistryResult<&str> {
        self.info(tag).map(|i| i.extension.as_str())
    }

    pub fn scene_tag(&self) -> TypeTag {
        TypeTag::from_name(SCENE_TYPE_NAME)
    }

    pub fn is_scene(&self, tag: TypeTag) -> bool {
        matches!(self.kind(tag), Ok(PersistentKind::Scene))
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_knows_the_scene() {
        let catalog = TypeCatalog::with_builtin();
        let tag = catalog.scene_tag();
        assert!(catalog.is_scene(tag));
        assert_eq!(catalog.extension(tag).unwrap(), ".scene");
    }

    #[test]
    fn unknown_types_are_reported() {
        let catalog = TypeCatalog::new();
        let tag = TypeTag::from_name("Ghost");
        assert_eq!(catalog.kind(tag).unwrap_err(), RegistryError::UnknownType(tag));
        assert!(!catalog.is_scene(tag));
    }

    #[test]
    fn register_named_derives_the_tag() {
        let mut catalog = TypeCatalog::new();
        let tag = catalog.register_named("Prefab", PersistentKind::Composite, ".prefab");
        assert_eq!(tag, TypeTag::from_name("Prefab"));
        assert_eq!(catalog.kind(tag).unwrap(), PersistentKind::Composite);
        assert_eq!(catalog.len(), 1);
    }
}
