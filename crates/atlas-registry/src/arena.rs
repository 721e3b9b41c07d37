//! Generational slot arena for live objects.
//!
//! Freed slots go on a free list and are reused with a bumped generation, so
//! a handle to a destroyed object never resolves to its successor.

use std::collections::HashMap;

use tracing::debug;

use crate::error::{RegistryError, RegistryResult};
use crate::object::{LiveObject, ObjectHandle};

#[derive(Debug)]
struct Slot {
    generation: u32,
    value: Option<LiveObject>,
}

/// Owner of every live object in a session.
#[derive(Debug, Default)]
pub struct ObjectArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl ObjectArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn insert(&mut self, object: LiveObject) -> ObjectHandle {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(object);
            return ObjectHandle::from_parts(index, slot.generation);
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            value: Some(object),
        });
        ObjectHandle::from_parts(index, 0)
    }

    pub fn contains(&self, handle: ObjectHandle) -> bool {
        self.get(handle).is_some()
    }

    pub fn get(&self, handle: ObjectHandle) -> Option<&LiveObject> {
        self.slots
            .get(handle.index() as usize)
            .filter(|slot| slot.generation == handle.generation())
            .and_then(|slot| slot.value.as_ref())
    }

    pub fn get_mut(&mut self, handle: ObjectHandle) -> Option<&mut LiveObject> {
        self.slots
            .get_mut(handle.index() as usize)
            .filter(|slot| slot.generation == handle.generation())
            .and_then(|slot| slot.value.as_mut())
    }

    /// Like [`ObjectArena::get`] but fails with `StaleHandle`.
    pub fn try_get(&self, handle: ObjectHandle) -> RegistryResult<&LiveObject> {
        self.get(handle).ok_or(RegistryError::StaleHandle(handle))
    }

    pub fn try_get_mut(&mut self, handle: ObjectHandle) -> RegistryResult<&mut LiveObject> {
        self.get_mut(handle).ok_or(RegistryError::StaleHandle(handle))
    }

    /// Destroy one object. Its parts are left alone.
    pub fn remove(&mut self, handle: ObjectHandle) -> Option<LiveObject> {
        let slot = self.slots.get_mut(handle.index() as usize)?;
        if slot.generation != handle.generation() {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index());
        self.live -= 1;
        Some(value)
    }

    /// Destroy an object together with all of its parts.
    pub fn remove_with_parts(&mut self, handle: ObjectHandle) -> Option<LiveObject> {
        let object = self.remove(handle)?;
        for part in &object.parts {
            self.remove(*part);
        }
        Some(object)
    }

    /// Copy an object and its parts.
    ///
    /// References between the root and its parts are redirected to the
    /// copies; references leaving the object are kept as they are.
    pub fn deep_clone(&mut self, handle: ObjectHandle) -> RegistryResult<ObjectHandle> {
        let root = self.try_get(handle)?.clone();
        let mut copies: Vec<(ObjectHandle, LiveObject)> = Vec::with_capacity(root.parts.len());
        for part in &root.parts {
            copies.push((*part, self.try_get(*part)?.clone()));
        }

        let mut remap: HashMap<ObjectHandle, ObjectHandle> = HashMap::new();
        let new_root = self.insert(root);
        remap.insert(handle, new_root);
        let mut new_parts = Vec::with_capacity(copies.len());
        for (old, copy) in copies {
            let new_part = self.insert(copy);
            remap.insert(old, new_part);
            new_parts.push(new_part);
        }

        let redirect = |h: ObjectHandle| remap.get(&h).copied().unwrap_or(h);
        for target in std::iter::once(new_root).chain(new_parts.iter().copied()) {
            if let Some(object) = self.get_mut(target) {
                for reference in object.references.iter_mut().flatten() {
                    *reference = redirect(*reference);
                }
                object.owner = object.owner.map(redirect);
                if target == new_root {
                    object.owner = None;
                    object.parts = new_parts.clone();
                }
            }
        }
        debug!(source = %handle, copy = %new_root, parts = new_parts.len(), "deep-cloned object");
        Ok(new_root)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjectHandle, &LiveObject)> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            slot.value
                .as_ref()
                .map(|v| (ObjectHandle::from_parts(i as u32, slot.generation), v))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atlas_types::TypeTag;

    fn obj(name: &str) -> LiveObject {
        LiveObject::new(name, TypeTag::from_name("Thing"))
    }

    // -----------------------------------------------------------------------
    // Slots
    // -----------------------------------------------------------------------

    #[test]
    fn insert_get_remove() {
        let mut arena = ObjectArena::new();
        let h = arena.insert(obj("a"));
        assert_eq!(arena.len(), 1);
        assert_eq!(arena.get(h).unwrap().name, "a");

        let removed = arena.remove(h).unwrap();
        assert_eq!(removed.name, "a");
        assert!(arena.is_empty());
        assert!(arena.get(h).is_none());
        assert!(arena.remove(h).is_none());
    }

    #[test]
    fn reused_slot_rejects_stale_handle() {
        let mut arena = ObjectArena::new();
        let old = arena.insert(obj("old"));
        arena.remove(old);
        let new = arena.insert(obj("new"));

        assert_eq!(old.index(), new.index());
        assert_ne!(old.generation(), new.generation());
        assert!(arena.get(old).is_none());
        assert_eq!(arena.try_get(old).unwrap_err(), RegistryError::StaleHandle(old));
        assert_eq!(arena.get(new).unwrap().name, "new");
    }

    #[test]
    fn remove_with_parts_frees_every_part() {
        let mut arena = ObjectArena::new();
        let p1 = arena.insert(obj("p1"));
        let p2 = arena.insert(obj("p2"));
        let mut root = obj("root");
        root.parts = vec![p1, p2];
        let root = arena.insert(root);

        arena.remove_with_parts(root).unwrap();
        assert!(arena.is_empty());
    }

    // -----------------------------------------------------------------------
    // Deep clone
    // -----------------------------------------------------------------------

    #[test]
    fn deep_clone_redirects_internal_references() {
        let mut arena = ObjectArena::new();
        let external = arena.insert(obj("external"));
        let p1 = arena.insert(obj("p1"));
        let mut p2 = obj("p2");
        p2.owner = Some(p1);
        p2.references.push(Some(p1));
        p2.references.push(Some(external));
        let p2 = arena.insert(p2);
        let mut root = obj("root");
        root.parts = vec![p1, p2];
        root.references = vec![Some(p2), None];
        let root = arena.insert(root);

        let copy = arena.deep_clone(root).unwrap();
        assert_ne!(copy, root);
        assert_eq!(arena.len(), 7);

        let copy_obj = arena.get(copy).unwrap().clone();
        let (c1, c2) = (copy_obj.parts[0], copy_obj.parts[1]);
        assert!(c1 != p1 && c2 != p2);
        assert_eq!(copy_obj.references, vec![Some(c2), None]);

        let c2_obj = arena.get(c2).unwrap();
        assert_eq!(c2_obj.owner, Some(c1));
        assert_eq!(c2_obj.references, vec![Some(c1), Some(external)]);

        // The source is untouched.
        assert_eq!(arena.get(root).unwrap().parts, vec![p1, p2]);
    }

    #[test]
    fn deep_clone_of_stale_handle_fails() {
        let mut arena = ObjectArena::new();
        let h = arena.insert(obj("a"));
        arena.remove(h);
        assert_eq!(arena.deep_clone(h).unwrap_err(), RegistryError::StaleHandle(h));
    }
}
