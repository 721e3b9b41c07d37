use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Namespace for name-derived type tags.
const TYPE_TAG_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2b1e_8a4d_4c3b_9e0f_5a7d_1c2e_3b4f);

/// Stable type identifier.
///
/// A `TypeTag` names the persistent type of an asset independently of any
/// in-process Rust type, so stored projects stay readable across builds.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeTag(Uuid);

impl TypeTag {
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Derive a tag from a type name. The same name always yields the same tag.
    pub fn from_name(name: &str) -> Self {
        Self(Uuid::new_v5(&TYPE_TAG_NAMESPACE, name.as_bytes()))
    }
}

impl fmt::Debug for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeTag({})", self.0)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
