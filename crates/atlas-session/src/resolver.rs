//! Dependency resolution and library loading.
//!
//! Identifiers in the static, scene, built-in and bundled partitions belong
//! to external libraries. Loading one fetches its [`AssetLibrary`] from the
//! provider, extends the persisted [`IdTable`] with keys seen for the first
//! time, instantiates every template and registers the objects as library
//! owned. A library that cannot be loaded while resolving is logged and
//! skipped; the identifiers it would have provided stay unresolved.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use atlas_library::{part_key, AssetLibrary, BundleDescriptor, IdTable, LibrarySource, CATALOG_KEY};
use atlas_registry::{LiveObject, ObjectHandle};
use atlas_storage::{read_value, write_value};
use atlas_types::{AssetId, AssetMeta, CancelSignal, LibraryRef, Partition};
use tracing::{debug, info, warn};

use crate::error::{SessionError, SessionResult};
use crate::events::EventKind;
use crate::session::Session;

/// Bookkeeping for one loaded library.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadedLibrary {
    pub source: LibrarySource,
    pub library: LibraryRef,
    /// Objects by entry or part key.
    pub objects: BTreeMap<String, ObjectHandle>,
    /// Every identifier the library registered, with its object.
    pub ids: BTreeMap<AssetId, ObjectHandle>,
}

/// What one resolve pass did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResolveReport {
    pub loaded: Vec<LibraryRef>,
    /// Library and failure text of every library that could not be loaded.
    pub failed: Vec<(String, String)>,
}

impl Session {
    /// Load every library implied by `unresolved` and by the recorded
    /// library ids of `items` that is not loaded yet.
    pub(crate) async fn resolve(
        &mut self,
        items: &[AssetMeta],
        unresolved: &BTreeSet<AssetId>,
        signal: &CancelSignal,
    ) -> SessionResult<ResolveReport> {
        let project = self.project()?;
        let mut wanted: BTreeSet<LibraryRef> = unresolved
            .iter()
            .filter(|id| id.is_library_owned())
            .filter_map(|id| id.library())
            .collect();
        for meta in items {
            wanted.extend(meta.library_ids.iter().copied());
            // Imported items are backed by the library that owns their ids.
            wanted.extend(
                meta.all_ids()
                    .filter(|id| id.is_library_owned())
                    .filter_map(|id| id.library()),
            );
        }
        let (relink, wanted): (Vec<LibraryRef>, Vec<LibraryRef>) =
            wanted.into_iter().partition(|library| project.loaded.contains_key(library));
        for library in relink {
            self.relink_library(library)?;
        }

        let mut report = ResolveReport::default();
        for library in wanted {
            Self::check(signal)?;
            let Some(source) = self.source_of(library) else {
                warn!(%library, "no source recorded for library");
                report.failed.push((library.to_string(), "no source recorded".into()));
                continue;
            };
            match self.load_library_as(&source, library, signal).await {
                Ok(()) => report.loaded.push(library),
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    warn!(%library, %source, error = %e, "library could not be loaded, its objects stay unresolved");
                    report.failed.push((source.to_string(), e.to_string()));
                }
            }
        }
        if !report.loaded.is_empty() || !report.failed.is_empty() {
            debug!(loaded = report.loaded.len(), failed = report.failed.len(), "resolved libraries");
        }
        Ok(report)
    }

    pub(crate) fn source_of(&self, library: LibraryRef) -> Option<LibrarySource> {
        let project = self.project().ok()?;
        match library.partition {
            Partition::Bundled => project
                .bundles
                .get(&library.ordinal)
                .map(|d| LibrarySource::Bundle { path: d.path.clone() }),
            _ => project.catalog.source_of(library),
        }
    }

    /// Load the library behind `source` unless it is loaded already,
    /// assigning and persisting its ordinal on first sight.
    pub async fn load_library(&mut self, source: &LibrarySource, cancel: &CancelSignal) -> SessionResult<LibraryRef> {
        let signal = self.signal(cancel);
        let library = self.assign_library(source, &signal).await?;
        if self.project()?.loaded.contains_key(&library) {
            self.relink_library(library)?;
        } else {
            self.load_library_as(source, library, &signal).await?;
        }
        Ok(library)
    }

    /// Map the objects of a loaded library back to identifiers that were
    /// unmapped since, e.g. by deleting their items. Returns how many.
    pub(crate) fn relink_library(&mut self, library: LibraryRef) -> SessionResult<usize> {
        let Some(loaded) = self.project()?.loaded.get(&library) else {
            return Ok(0);
        };
        let missing: Vec<(AssetId, ObjectHandle)> = loaded
            .ids
            .iter()
            .map(|(id, handle)| (*id, *handle))
            .filter(|(id, handle)| {
                !self.registry.is_mapped(*id)
                    && self.registry.id_of(*handle).is_none()
                    && self.registry.objects().get(*handle).is_some()
            })
            .collect();
        for (id, handle) in &missing {
            self.registry.register_static(*id, *handle)?;
        }
        if !missing.is_empty() {
            debug!(%library, relinked = missing.len(), "relinked library objects");
        }
        Ok(missing.len())
    }

    /// Handles of a loaded library's objects by entry key.
    pub fn library_objects(&self, library: LibraryRef) -> Option<&BTreeMap<String, ObjectHandle>> {
        self.project.as_ref()?.loaded.get(&library).map(|l| &l.objects)
    }

    /// The library `source` maps to without persisting anything. `None` for
    /// a static, scene or bundle source seen for the first time.
    pub(crate) fn known_library(&self, source: &LibrarySource) -> SessionResult<Option<LibraryRef>> {
        let project = self.project()?;
        Ok(match source {
            LibrarySource::Bundle { path } => project.bundles.values().find(|d| d.path == *path).map(|d| d.library()),
            _ => project
                .catalog
                .ordinal_of(source)
                .map(|ordinal| LibraryRef::new(source.partition(), ordinal)),
        })
    }

    pub(crate) async fn assign_library(&mut self, source: &LibrarySource, signal: &CancelSignal) -> SessionResult<LibraryRef> {
        if let Some(library) = self.known_library(source)? {
            return Ok(library);
        }
        let storage = Arc::clone(&self.storage);
        let project = self.project()?;
        let name = project.name.clone();
        let mut info = project.info.clone();
        info.touch();

        match source {
            LibrarySource::Bundle { path } => {
                let descriptor = BundleDescriptor::create(path, &mut info)?;
                write_value(storage.as_ref(), &name, &descriptor.unique_name, &descriptor, signal).await?;
                storage.save_project_info(&name, &info, signal).await?;
                let library = descriptor.library();
                let project = self.project_mut()?;
                project.info = info;
                project.bundles.insert(descriptor.ordinal, descriptor);
                Self::check(signal)?;
                Ok(library)
            }
            _ => {
                let mut catalog = project.catalog.clone();
                let (ordinal, _) = catalog.assign(source, &mut info)?;
                write_value(storage.as_ref(), &name, CATALOG_KEY, &catalog, signal).await?;
                storage.save_project_info(&name, &info, signal).await?;
                let project = self.project_mut()?;
                project.info = info;
                project.catalog = catalog;
                Self::check(signal)?;
                Ok(LibraryRef::new(source.partition(), ordinal))
            }
        }
    }

    async fn load_library_as(
        &mut self,
        source: &LibrarySource,
        library: LibraryRef,
        signal: &CancelSignal,
    ) -> SessionResult<()> {
        let fetched = self.provider.fetch(source).await?;
        Self::check(signal)?;
        let Some(assets) = fetched else {
            return Err(SessionError::NotFound(format!("library asset {source}")));
        };

        let table = self.extend_table(library, &assets, signal).await?;
        let loaded = self.instantiate(source, library, &assets, &table)?;
        info!(%library, %source, objects = loaded.ids.len(), "loaded library");
        self.project_mut()?.loaded.insert(library, loaded);
        self.completed(EventKind::LibraryLoaded, Vec::new(), false);
        Ok(())
    }

    /// The identifier table of `library` with every key of `assets`
    /// assigned. A grown table is persisted before it is returned.
    pub(crate) async fn extend_table(
        &mut self,
        library: LibraryRef,
        assets: &AssetLibrary,
        signal: &CancelSignal,
    ) -> SessionResult<IdTable> {
        let storage = Arc::clone(&self.storage);
        let name = self.open_name()?;
        let keys = assets.keys();

        if library.partition == Partition::Bundled {
            let mut descriptor = self
                .project()?
                .bundles
                .get(&library.ordinal)
                .cloned()
                .ok_or_else(|| SessionError::NotFound(format!("bundle descriptor for {library}")))?;
            if descriptor.table.extend(keys.iter().map(String::as_str))? {
                write_value(storage.as_ref(), &name, &descriptor.unique_name, &descriptor, signal).await?;
                Self::check(signal)?;
                debug!(%library, entries = descriptor.table.len(), "extended bundle table");
                self.project_mut()?.bundles.insert(library.ordinal, descriptor.clone());
            }
            return Ok(descriptor.table);
        }

        let key = library.table_key();
        let mut table: IdTable = read_value(storage.as_ref(), &name, &key, signal).await?.unwrap_or_default();
        Self::check(signal)?;
        if table.extend(keys.iter().map(String::as_str))? {
            write_value(storage.as_ref(), &name, &key, &table, signal).await?;
            Self::check(signal)?;
            debug!(%library, entries = table.len(), "extended identifier table");
        }
        Ok(table)
    }

    /// Build live objects for every template and register them.
    fn instantiate(
        &mut self,
        source: &LibrarySource,
        library: LibraryRef,
        assets: &AssetLibrary,
        table: &IdTable,
    ) -> SessionResult<LoadedLibrary> {
        let mut objects: BTreeMap<String, ObjectHandle> = BTreeMap::new();
        let mut ids = BTreeMap::new();
        let mut spawn = |session: &mut Self, key: String, object: LiveObject| -> SessionResult<()> {
            let Some(id) = table.id_of(library, &key)? else {
                return Ok(());
            };
            if session.registry.is_mapped(id) {
                warn!(%id, key = %key, "identifier already mapped, library object skipped");
                return Ok(());
            }
            let handle = session.registry.objects_mut().insert(object);
            session.registry.register_static(id, handle)?;
            objects.insert(key, handle);
            ids.insert(id, handle);
            Ok(())
        };

        for entry in &assets.entries {
            let template = &entry.template;
            let mut root = LiveObject::new(template.name.clone(), template.type_tag);
            root.fields = template.fields.clone();
            spawn(&mut *self, entry.key().to_string(), root)?;
            for (index, part) in template.parts.iter().enumerate() {
                let mut object = LiveObject::new(part.name.clone(), part.type_tag);
                object.fields = part.fields.clone();
                spawn(&mut *self, part_key(entry.key(), index), object)?;
            }
        }

        for entry in &assets.entries {
            let template = &entry.template;
            let lookup = |key: &String| objects.get(key.as_str()).copied();
            let part_handles: Vec<Option<ObjectHandle>> = (0..template.parts.len())
                .map(|index| objects.get(&part_key(entry.key(), index)).copied())
                .collect();
            for (index, part) in template.parts.iter().enumerate() {
                let Some(handle) = part_handles[index] else {
                    continue;
                };
                let references = part.references.iter().map(lookup).collect();
                let owner = part.owner.and_then(|o| part_handles.get(o).copied().flatten());
                if let Some(object) = self.registry.objects_mut().get_mut(handle) {
                    object.references = references;
                    object.owner = owner;
                }
            }
            let Some(root) = objects.get(entry.key()).copied() else {
                continue;
            };
            let references = template.references.iter().map(lookup).collect();
            if let Some(object) = self.registry.objects_mut().get_mut(root) {
                object.references = references;
                object.parts = part_handles.into_iter().flatten().collect();
            }
        }

        Ok(LoadedLibrary {
            source: source.clone(),
            library,
            objects,
            ids,
        })
    }
}
