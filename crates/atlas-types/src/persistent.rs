//! Persistent forms: what an object looks like once captured for storage.
//!
//! The shape is a closed variant. Composite and scene forms carry their
//! embedded sub-objects explicitly, so no runtime type inspection is needed
//! to tell a prefab from a plain asset.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::id::AssetId;
use crate::tag::TypeTag;

/// A persistable field value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    List(Vec<FieldValue>),
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// Which persistent variant a type produces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PersistentKind {
    Scalar,
    Composite,
    Scene,
}

impl std::fmt::Display for PersistentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scalar => write!(f, "scalar"),
            Self::Composite => write!(f, "composite"),
            Self::Scene => write!(f, "scene"),
        }
    }
}

/// The generic persistent fields of one object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PersistentRecord {
    pub type_tag: TypeTag,
    pub name: String,
    pub fields: BTreeMap<String, FieldValue>,
    /// Referenced objects, in slot order. [`AssetId::NULL`] marks a reference
    /// that could not be persisted.
    pub references: Vec<AssetId>,
}

impl PersistentRecord {
    pub fn new(type_tag: TypeTag, name: impl Into<String>) -> Self {
        Self {
            type_tag,
            name: name.into(),
            fields: BTreeMap::new(),
            references: Vec::new(),
        }
    }
}

/// A sub-object physically stored inside its parent's blob.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedPart {
    pub id: AssetId,
    /// The embedded object this part hangs under; `None` for top level.
    pub owner: Option<AssetId>,
    pub record: PersistentRecord,
}

/// Captured persistent representation of an asset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum PersistentForm {
    Scalar(PersistentRecord),
    Composite {
        root: PersistentRecord,
        parts: Vec<EmbeddedPart>,
    },
    Scene {
        record: PersistentRecord,
        objects: Vec<EmbeddedPart>,
    },
}

impl PersistentForm {
    pub fn kind(&self) -> PersistentKind {
        match self {
            Self::Scalar(_) => PersistentKind::Scalar,
            Self::Composite { .. } => PersistentKind::Composite,
            Self::Scene { .. } => PersistentKind::Scene,
        }
    }

    pub fn root(&self) -> &PersistentRecord {
        match self {
            Self::Scalar(record) => record,
            Self::Composite { root, .. } => root,
            Self::Scene { record, .. } => record,
        }
    }

    pub fn embedded(&self) -> &[EmbeddedPart] {
        match self {
            Self::Scalar(_) => &[],
            Self::Composite { parts, .. } => parts,
            Self::Scene { objects, .. } => objects,
        }
    }

    pub fn embedded_ids(&self) -> Vec<AssetId> {
        self.embedded().iter().map(|p| p.id).collect()
    }

    /// Every non-null id referenced by the form that it does not embed.
    pub fn dependencies(&self) -> BTreeSet<AssetId> {
        let embedded: BTreeSet<AssetId> = self.embedded().iter().map(|p| p.id).collect();
        std::iter::once(self.root())
            .chain(self.embedded().iter().map(|p| &p.record))
            .flat_map(|record| record.references.iter().copied())
            .filter(|id| !id.is_null() && !embedded.contains(id))
            .collect()
    }

    /// Rewrite embedded ids, owners and references through `map`.
    ///
    /// Ids absent from `map` are left untouched.
    pub fn remap_ids(&mut self, map: &HashMap<AssetId, AssetId>) {
        let remap = |id: &mut AssetId| {
            if let Some(new_id) = map.get(id) {
                *id = *new_id;
            }
        };
        let (root, parts) = match self {
            Self::Scalar(record) => (record, None),
            Self::Composite { root, parts } => (root, Some(parts)),
            Self::Scene { record, objects } => (record, Some(objects)),
        };
        root.references.iter_mut().for_each(remap);
        for part in parts.into_iter().flatten() {
            remap(&mut part.id);
            if let Some(owner) = part.owner.as_mut() {
                remap(owner);
            }
            part.record.references.iter_mut().for_each(remap);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u32) -> AssetId {
        AssetId::dynamic_id(1, n).unwrap()
    }

    fn record(name: &str, refs: Vec<AssetId>) -> PersistentRecord {
        let mut r = PersistentRecord::new(TypeTag::from_name("Thing"), name);
        r.references = refs;
        r
    }

    #[test]
    fn scalar_dependencies_skip_null() {
        let form = PersistentForm::Scalar(record("a", vec![id(2), AssetId::NULL, id(3)]));
        assert_eq!(form.kind(), PersistentKind::Scalar);
        assert_eq!(form.dependencies(), BTreeSet::from([id(2), id(3)]));
        assert!(form.embedded_ids().is_empty());
    }

    #[test]
    fn composite_dependencies_exclude_embedded_parts() {
        let form = PersistentForm::Composite {
            root: record("root", vec![id(10), id(4)]),
            parts: vec![EmbeddedPart {
                id: id(10),
                owner: None,
                record: record("part", vec![id(5)]),
            }],
        };
        assert_eq!(form.dependencies(), BTreeSet::from([id(4), id(5)]));
        assert_eq!(form.embedded_ids(), vec![id(10)]);
    }

    #[test]
    fn remap_rewrites_parts_owners_and_references() {
        let mut form = PersistentForm::Scene {
            record: record("scene", vec![]),
            objects: vec![
                EmbeddedPart { id: id(1), owner: None, record: record("a", vec![id(2), id(9)]) },
                EmbeddedPart { id: id(2), owner: Some(id(1)), record: record("b", vec![]) },
            ],
        };
        let map = HashMap::from([(id(1), id(101)), (id(2), id(102))]);
        form.remap_ids(&map);

        let objects = form.embedded();
        assert_eq!(objects[0].id, id(101));
        assert_eq!(objects[0].record.references, vec![id(102), id(9)]);
        assert_eq!(objects[1].owner, Some(id(101)));
        assert_eq!(form.dependencies(), BTreeSet::from([id(9)]));
    }

    #[test]
    fn bincode_round_trip_preserves_fields() {
        let mut root = record("crate", vec![id(7)]);
        root.fields.insert("mass".into(), FieldValue::Float(2.5));
        root.fields.insert("tags".into(), FieldValue::List(vec!["wood".into()]));
        let form = PersistentForm::Scalar(root);
        let bytes = bincode::serialize(&form).unwrap();
        let back: PersistentForm = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, form);
    }
}
