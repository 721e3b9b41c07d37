use std::collections::BTreeMap;

use atlas_types::{FieldValue, TypeTag};
use serde::{Deserialize, Serialize};

/// Key of part `index` of the entry keyed `entry_key`, e.g. `Props/Crate#0`.
pub fn part_key(entry_key: &str, index: usize) -> String {
    format!("{entry_key}#{index}")
}

/// One sub-object of a composite template.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PartTemplate {
    pub name: String,
    pub type_tag: TypeTag,
    pub fields: BTreeMap<String, FieldValue>,
    /// Entry or part keys referenced by this part.
    pub references: Vec<String>,
    /// Index of the part this one hangs under.
    pub owner: Option<usize>,
}

/// The persistent description of one library object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectTemplate {
    pub name: String,
    pub type_tag: TypeTag,
    pub fields: BTreeMap<String, FieldValue>,
    /// Entry or part keys referenced by the object. Keys that name nothing
    /// in the library become empty reference slots.
    pub references: Vec<String>,
    pub parts: Vec<PartTemplate>,
}

impl ObjectTemplate {
    pub fn new(name: impl Into<String>, type_tag: TypeTag) -> Self {
        Self {
            name: name.into(),
            type_tag,
            fields: BTreeMap::new(),
            references: Vec::new(),
            parts: Vec::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn with_reference(mut self, key: impl Into<String>) -> Self {
        self.references.push(key.into());
        self
    }

    pub fn with_part(mut self, part: PartTemplate) -> Self {
        self.parts.push(part);
        self
    }
}

/// A library object at a folder path inside the library.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LibraryEntry {
    /// `/`-separated folder path plus object name, e.g. `Props/Crate`.
    pub path: String,
    pub template: ObjectTemplate,
}

impl LibraryEntry {
    pub fn key(&self) -> &str {
        &self.path
    }

    /// Folder path inside the library. Empty for top-level entries.
    pub fn folder(&self) -> &str {
        self.path.rsplit_once('/').map(|(folder, _)| folder).unwrap_or("")
    }

    pub fn name(&self) -> &str {
        self.path.rsplit_once('/').map(|(_, name)| name).unwrap_or(&self.path)
    }
}

/// A fetched external library.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetLibrary {
    pub name: String,
    pub entries: Vec<LibraryEntry>,
}

impl AssetLibrary {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
        }
    }

    pub fn with_entry(mut self, path: impl Into<String>, template: ObjectTemplate) -> Self {
        self.entries.push(LibraryEntry {
            path: path.into(),
            template,
        });
        self
    }

    pub fn entry(&self, key: &str) -> Option<&LibraryEntry> {
        self.entries.iter().find(|e| e.path == key)
    }

    /// Every entry key followed by its part keys, in library order.
    pub fn keys(&self) -> Vec<String> {
        let mut keys = Vec::new();
        for entry in &self.entries {
            keys.push(entry.path.clone());
            keys.extend((0..entry.template.parts.len()).map(|i| part_key(&entry.path, i)));
        }
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefab() -> ObjectTemplate {
        ObjectTemplate::new("Crate", TypeTag::from_name("Prefab")).with_part(PartTemplate {
            name: "Lid".into(),
            type_tag: TypeTag::from_name("Mesh"),
            fields: BTreeMap::new(),
            references: vec![],
            owner: None,
        })
    }

    #[test]
    fn entry_path_parts() {
        let lib = AssetLibrary::new("props").with_entry("Props/Wood/Crate", prefab());
        let entry = lib.entry("Props/Wood/Crate").unwrap();
        assert_eq!(entry.folder(), "Props/Wood");
        assert_eq!(entry.name(), "Crate");

        let top = LibraryEntry {
            path: "Barrel".into(),
            template: ObjectTemplate::new("Barrel", TypeTag::from_name("Mesh")),
        };
        assert_eq!(top.folder(), "");
        assert_eq!(top.name(), "Barrel");
    }

    #[test]
    fn keys_include_parts() {
        let lib = AssetLibrary::new("props")
            .with_entry("Props/Crate", prefab())
            .with_entry("Props/Plank", ObjectTemplate::new("Plank", TypeTag::from_name("Mesh")));
        assert_eq!(lib.keys(), vec!["Props/Crate", "Props/Crate#0", "Props/Plank"]);
    }
}
