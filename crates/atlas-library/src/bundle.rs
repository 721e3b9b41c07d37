use atlas_storage::StoredValue;
use atlas_types::{LibraryRef, Partition, ProjectInfo};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::LibraryResult;
use crate::table::IdTable;

/// Per-project record of one imported bundle, persisted as
/// `<uniqueName>.bundle`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleDescriptor {
    pub unique_name: String,
    pub path: String,
    pub ordinal: u32,
    pub table: IdTable,
}

impl StoredValue for BundleDescriptor {
    const EXTENSION: &'static str = ".bundle";
}

impl BundleDescriptor {
    /// `<file stem>_<first 8 hex digits of blake3(path)>`.
    pub fn unique_name(path: &str) -> String {
        let file_name = path.rsplit(['/', '\\']).next().unwrap_or(path);
        let stem = match file_name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => file_name,
        };
        let digest = hex::encode(blake3::hash(path.as_bytes()).as_bytes());
        format!("{stem}_{}", &digest[..8])
    }

    /// A descriptor for a bundle seen for the first time. Mints its ordinal.
    pub fn create(path: &str, info: &mut ProjectInfo) -> LibraryResult<Self> {
        let ordinal = info.mint_ordinal(Partition::Bundled)?;
        let unique_name = Self::unique_name(path);
        info!(path, %unique_name, ordinal, "assigned bundle ordinal");
        Ok(Self {
            unique_name,
            path: path.to_string(),
            ordinal,
            table: IdTable::new(),
        })
    }

    pub fn library(&self) -> LibraryRef {
        LibraryRef::new(Partition::Bundled, self.ordinal)
    }
}
