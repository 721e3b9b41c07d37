use std::collections::BTreeMap;

use atlas_types::{define_handle, FieldValue, TypeTag};

define_handle!(ObjectHandle, "Generational handle to a [`LiveObject`] in an [`ObjectArena`](crate::ObjectArena).");

/// An in-memory object.
///
/// Composite and scene objects list their sub-objects in `parts`; each part
/// is an arena object of its own whose `owner` names the part it hangs under
/// (`None` when it sits directly under the root).
#[derive(Clone, Debug, PartialEq)]
pub struct LiveObject {
    pub name: String,
    pub type_tag: TypeTag,
    pub fields: BTreeMap<String, FieldValue>,
    /// Referenced objects in slot order. `None` is an empty slot.
    pub references: Vec<Option<ObjectHandle>>,
    pub parts: Vec<ObjectHandle>,
    pub owner: Option<ObjectHandle>,
    /// Private binary tail written after the generic persistent form.
    pub custom_data: Option<Vec<u8>>,
}

impl LiveObject {
    pub fn new(name: impl Into<String>, type_tag: TypeTag) -> Self {
        Self {
            name: name.into(),
            type_tag,
            fields: BTreeMap::new(),
            references: Vec::new(),
            parts: Vec::new(),
            owner: None,
            custom_data: None,
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn with_reference(mut self, target: ObjectHandle) -> Self {
        self.references.push(Some(target));
        self
    }

    /// Compare the generic persistent fields (name, type, field values).
    pub fn same_fields(&self, other: &LiveObject) -> bool {
        self.name == other.name && self.type_tag == other.type_tag && self.fields == other.fields
    }
}
