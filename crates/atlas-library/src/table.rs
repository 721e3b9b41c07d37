use std::collections::BTreeMap;

use atlas_storage::StoredValue;
use atlas_types::{AssetId, LibraryRef, MAX_LOCAL_INDEX};
use serde::{Deserialize, Serialize};

use crate::error::{LibraryError, LibraryResult};

/// Persisted entry-key to local-index table of one library.
///
/// Indices are handed out once and never reused, so an object keeps its
/// identifier even after other entries disappear from the library.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdTable {
    entries: BTreeMap<String, u32>,
    next_local: u32,
}

impl StoredValue for IdTable {
    const EXTENSION: &'static str = ".idmap";
}

impl IdTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<u32> {
        self.entries.get(key).copied()
    }

    /// The local index of `key`, assigning the next free one if `key` is new.
    /// The flag is `true` when an index was assigned.
    pub fn assign(&mut self, key: &str) -> LibraryResult<(u32, bool)> {
        if let Some(local) = self.get(key) {
            return Ok((local, false));
        }
        if self.entries.len() as u64 > MAX_LOCAL_INDEX as u64 {
            return Err(LibraryError::TableFull(key.to_string()));
        }
        let local = self.next_local;
        self.next_local = self
            .next_local
            .checked_add(1)
            .ok_or_else(|| LibraryError::TableFull(key.to_string()))?;
        self.entries.insert(key.to_string(), local);
        Ok((local, true))
    }

    /// Assign every key. Returns `true` if the table grew.
    pub fn extend<'a>(&mut self, keys: impl IntoIterator<Item = &'a str>) -> LibraryResult<bool> {
        let mut grew = false;
        for key in keys {
            grew |= self.assign(key)?.1;
        }
        Ok(grew)
    }

    /// Identifier of `key` inside `library`.
    pub fn id_of(&self, library: LibraryRef, key: &str) -> LibraryResult<Option<AssetId>> {
        match self.get(key) {
            Some(local) => Ok(Some(library.id(local)?)),
            None => Ok(None),
        }
    }

    /// Reverse lookup: the key holding `local`.
    pub fn key_of(&self, local: u32) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, l)| **l == local)
            .map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.entries.iter().map(|(k, l)| (k.as_str(), *l))
    }
}
