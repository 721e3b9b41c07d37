use std::collections::BTreeMap;

use atlas_storage::StoredValue;
use atlas_types::{LibraryRef, Partition, ProjectInfo};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{LibraryError, LibraryResult};
use crate::source::LibrarySource;

/// Key of the catalog in the key/value namespace.
pub const CATALOG_KEY: &str = "Libraries";

/// Ordinals assigned to static and scene library sources.
///
/// Built-in libraries use their number as ordinal and bundles keep theirs in
/// a [`BundleDescriptor`](crate::BundleDescriptor), so neither appears here.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryCatalog {
    static_ordinals: BTreeMap<String, u32>,
    scene_ordinals: BTreeMap<String, u32>,
}

impl StoredValue for LibraryCatalog {
    const EXTENSION: &'static str = ".catalog";
}

impl LibraryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The ordinal of `source` if one is known without minting.
    pub fn ordinal_of(&self, source: &LibrarySource) -> Option<u32> {
        match source {
            LibrarySource::Static { name } => self.static_ordinals.get(name).copied(),
            LibrarySource::Scene { name } => self.scene_ordinals.get(name).copied(),
            LibrarySource::BuiltIn { number } => Some(*number),
            LibrarySource::Bundle { .. } => None,
        }
    }

    /// The ordinal of a static or scene source, minting one from `info` on
    /// first sight. The flag is `true` when an ordinal was minted.
    pub fn assign(&mut self, source: &LibrarySource, info: &mut ProjectInfo) -> LibraryResult<(u32, bool)> {
        if let Some(ordinal) = self.ordinal_of(source) {
            return Ok((ordinal, false));
        }
        let (map, name) = match source {
            LibrarySource::Static { name } => (&mut self.static_ordinals, name),
            LibrarySource::Scene { name } => (&mut self.scene_ordinals, name),
            LibrarySource::Bundle { .. } | LibrarySource::BuiltIn { .. } => {
                return Err(LibraryError::InvalidEntry {
                    key: source.to_string(),
                    reason: "bundle ordinals are assigned by their descriptor".into(),
                })
            }
        };
        let ordinal = info.mint_ordinal(source.partition())?;
        map.insert(name.clone(), ordinal);
        info!(%source, ordinal, "assigned library ordinal");
        Ok((ordinal, true))
    }

    /// The source that owns `library`, for static, scene and built-in refs.
    pub fn source_of(&self, library: LibraryRef) -> Option<LibrarySource> {
        let find = |map: &BTreeMap<String, u32>| {
            map.iter()
                .find(|(_, o)| **o == library.ordinal)
                .map(|(n, _)| n.clone())
        };
        match library.partition {
            Partition::Static => find(&self.static_ordinals).map(|name| LibrarySource::Static { name }),
            Partition::Scene => find(&self.scene_ordinals).map(|name| LibrarySource::Scene { name }),
            Partition::BuiltIn => Some(LibrarySource::BuiltIn {
                number: library.ordinal,
            }),
            Partition::Dynamic | Partition::Bundled => None,
        }
    }

    pub fn len(&self) -> usize {
        self.static_ordinals.len() + self.scene_ordinals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
