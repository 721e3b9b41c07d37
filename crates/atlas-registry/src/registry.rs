use std::collections::HashMap;

use atlas_types::{AssetId, LibraryRef, Partition};
use tracing::debug;

use crate::arena::ObjectArena;
use crate::error::{RegistryError, RegistryResult};
use crate::object::{LiveObject, ObjectHandle};

/// Who is responsible for destroying a registered object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Ownership {
    /// Session-owned: destroyed when unregistered.
    Session,
    /// Owned by the library that supplied it: only unmapped.
    Library(LibraryRef),
}

#[derive(Clone, Copy, Debug)]
struct Entry {
    handle: ObjectHandle,
    ownership: Ownership,
}

/// What [`Registry::unregister`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Unregistered {
    pub handle: ObjectHandle,
    pub destroyed: bool,
}

/// Two-way map between identifiers and live objects, plus the arena that
/// owns the objects.
#[derive(Debug, Default)]
pub struct Registry {
    objects: ObjectArena,
    by_id: HashMap<AssetId, Entry>,
    by_handle: HashMap<ObjectHandle, AssetId>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn objects(&self) -> &ObjectArena {
        &self.objects
    }

    pub fn objects_mut(&mut self) -> &mut ObjectArena {
        &mut self.objects
    }

    /// Number of mapped identifiers.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn is_mapped(&self, id: AssetId) -> bool {
        self.by_id.contains_key(&id)
    }

    pub fn handle(&self, id: AssetId) -> Option<ObjectHandle> {
        self.by_id.get(&id).map(|e| e.handle)
    }

    pub fn id_of(&self, handle: ObjectHandle) -> Option<AssetId> {
        self.by_handle.get(&handle).copied()
    }

    pub fn ownership(&self, id: AssetId) -> Option<Ownership> {
        self.by_id.get(&id).map(|e| e.ownership)
    }

    /// The live object registered under `id`.
    pub fn from_id(&self, id: AssetId) -> Option<&LiveObject> {
        self.handle(id).and_then(|h| self.objects.get(h))
    }

    pub fn from_id_mut(&mut self, id: AssetId) -> Option<&mut LiveObject> {
        let handle = self.handle(id)?;
        self.objects.get_mut(handle)
    }

    /// Map a dynamic identifier to a session-owned object.
    pub fn register_dynamic(&mut self, id: AssetId, handle: ObjectHandle) -> RegistryResult<()> {
        if !id.is_dynamic() {
            return Err(RegistryError::WrongPartition {
                id,
                expected: Partition::Dynamic,
            });
        }
        self.insert(id, handle, Ownership::Session)
    }

    /// Map a library-owned identifier. The owning library is derived from the
    /// identifier's partition and ordinal.
    pub fn register_static(&mut self, id: AssetId, handle: ObjectHandle) -> RegistryResult<()> {
        let library = match id.library() {
            Some(lib) if lib.partition.is_library_owned() => lib,
            _ => {
                return Err(RegistryError::WrongPartition {
                    id,
                    expected: Partition::Static,
                })
            }
        };
        self.insert(id, handle, Ownership::Library(library))
    }

    /// Register under the ownership implied by the identifier's partition.
    pub fn register(&mut self, id: AssetId, handle: ObjectHandle) -> RegistryResult<()> {
        if id.is_dynamic() {
            self.register_dynamic(id, handle)
        } else {
            self.register_static(id, handle)
        }
    }

    fn insert(&mut self, id: AssetId, handle: ObjectHandle, ownership: Ownership) -> RegistryResult<()> {
        if self.by_id.contains_key(&id) {
            return Err(RegistryError::AlreadyMapped(id));
        }
        if let Some(existing) = self.by_handle.get(&handle) {
            return Err(RegistryError::HandleMapped {
                handle,
                id: *existing,
            });
        }
        if !self.objects.contains(handle) {
            return Err(RegistryError::StaleHandle(handle));
        }
        self.by_id.insert(id, Entry { handle, ownership });
        self.by_handle.insert(handle, id);
        debug!(%id, %handle, ?ownership, "registered");
        Ok(())
    }

    /// Remove the mapping for `id`, destroying the object if the session owns
    /// it. Returns `None` if `id` was not mapped.
    pub fn unregister(&mut self, id: AssetId) -> Option<Unregistered> {
        let entry = self.by_id.remove(&id)?;
        self.by_handle.remove(&entry.handle);
        let destroyed = match entry.ownership {
            Ownership::Session => self.objects.remove(entry.handle).is_some(),
            Ownership::Library(_) => false,
        };
        debug!(%id, handle = %entry.handle, destroyed, "unregistered");
        Some(Unregistered {
            handle: entry.handle,
            destroyed,
        })
    }

    /// Remove the mapping for `id` without destroying anything.
    pub fn unmap(&mut self, id: AssetId) -> Option<ObjectHandle> {
        let entry = self.by_id.remove(&id)?;
        self.by_handle.remove(&entry.handle);
        Some(entry.handle)
    }

    /// Every identifier owned by `library`.
    pub fn ids_of_library(&self, library: LibraryRef) -> Vec<AssetId> {
        let mut ids: Vec<AssetId> = self
            .by_id
            .iter()
            .filter(|(_, e)| e.ownership == Ownership::Library(library))
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        ids
    }

    /// Every mapped dynamic identifier, sorted.
    pub fn dynamic_ids(&self) -> Vec<AssetId> {
        let mut ids: Vec<AssetId> = self.by_id.keys().copied().filter(|id| id.is_dynamic()).collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atlas_types::TypeTag;

    fn registry_with(names: &[&str]) -> (Registry, Vec<ObjectHandle>) {
        let mut reg = Registry::new();
        let handles = names
            .iter()
            .map(|n| reg.objects_mut().insert(LiveObject::new(*n, TypeTag::from_name("Thing"))))
            .collect();
        (reg, handles)
    }

    #[test]
    fn register_and_lookup_both_ways() {
        let (mut reg, h) = registry_with(&["a"]);
        let id = AssetId::dynamic_id(1, 1).unwrap();
        reg.register_dynamic(id, h[0]).unwrap();

        assert!(reg.is_mapped(id));
        assert_eq!(reg.handle(id), Some(h[0]));
        assert_eq!(reg.id_of(h[0]), Some(id));
        assert_eq!(reg.from_id(id).unwrap().name, "a");
        assert_eq!(reg.ownership(id), Some(Ownership::Session));
    }

    #[test]
    fn reregistering_a_mapped_id_fails() {
        let (mut reg, h) = registry_with(&["a", "b"]);
        let id = AssetId::dynamic_id(1, 1).unwrap();
        reg.register_dynamic(id, h[0]).unwrap();
        assert_eq!(reg.register_dynamic(id, h[1]).unwrap_err(), RegistryError::AlreadyMapped(id));

        let other = AssetId::dynamic_id(1, 2).unwrap();
        assert_eq!(
            reg.register_dynamic(other, h[0]).unwrap_err(),
            RegistryError::HandleMapped { handle: h[0], id }
        );
    }

    #[test]
    fn partition_is_checked() {
        let (mut reg, h) = registry_with(&["a"]);
        let static_id = AssetId::static_id(2, 0).unwrap();
        assert!(matches!(
            reg.register_dynamic(static_id, h[0]),
            Err(RegistryError::WrongPartition { .. })
        ));
        assert!(matches!(
            reg.register_static(AssetId::dynamic_id(1, 0).unwrap(), h[0]),
            Err(RegistryError::WrongPartition { .. })
        ));
        assert!(matches!(
            reg.register(AssetId::NULL, h[0]),
            Err(RegistryError::WrongPartition { .. })
        ));
    }

    #[test]
    fn unregister_destroys_only_session_objects() {
        let (mut reg, h) = registry_with(&["dyn", "lib"]);
        let dyn_id = AssetId::dynamic_id(1, 1).unwrap();
        let lib_id = AssetId::static_id(3, 0).unwrap();
        reg.register(dyn_id, h[0]).unwrap();
        reg.register(lib_id, h[1]).unwrap();
        assert_eq!(
            reg.ownership(lib_id),
            Some(Ownership::Library(LibraryRef::new(Partition::Static, 3)))
        );

        let gone = reg.unregister(dyn_id).unwrap();
        assert!(gone.destroyed);
        assert!(!reg.objects().contains(h[0]));

        let kept = reg.unregister(lib_id).unwrap();
        assert!(!kept.destroyed);
        assert!(reg.objects().contains(h[1]));
        assert!(reg.is_empty());
        assert!(reg.unregister(lib_id).is_none());
    }

    #[test]
    fn unmap_never_destroys() {
        let (mut reg, h) = registry_with(&["a"]);
        let id = AssetId::dynamic_id(1, 1).unwrap();
        reg.register(id, h[0]).unwrap();
        assert_eq!(reg.unmap(id), Some(h[0]));
        assert!(reg.objects().contains(h[0]));
        assert_eq!(reg.id_of(h[0]), None);
    }

    #[test]
    fn stale_handles_are_not_registered() {
        let (mut reg, h) = registry_with(&["a"]);
        reg.objects_mut().remove(h[0]);
        let id = AssetId::dynamic_id(1, 1).unwrap();
        assert_eq!(reg.register(id, h[0]).unwrap_err(), RegistryError::StaleHandle(h[0]));
    }

    #[test]
    fn library_listing() {
        let (mut reg, h) = registry_with(&["a", "b", "c"]);
        let lib = LibraryRef::new(Partition::Bundled, 2);
        reg.register(lib.id(1).unwrap(), h[0]).unwrap();
        reg.register(lib.id(0).unwrap(), h[1]).unwrap();
        reg.register(AssetId::dynamic_id(1, 9).unwrap(), h[2]).unwrap();

        assert_eq!(reg.ids_of_library(lib), vec![lib.id(0).unwrap(), lib.id(1).unwrap()]);
        assert_eq!(reg.dynamic_ids(), vec![AssetId::dynamic_id(1, 9).unwrap()]);
    }
}
