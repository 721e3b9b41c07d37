//! Importing external libraries into the project tree.
//!
//! [`Session::load_import_items`] previews what an import would write: one
//! [`ImportCandidate`] per library entry, with the identifier it will get
//! and how it relates to what the tree already holds. Nothing is persisted.
//! [`Session::import`] then commits a selection of candidates from a single
//! library through the regular save path.

use std::collections::HashMap;

use atlas_library::{part_key, IdTable, LibrarySource};
use atlas_storage::{paths, read_value};
use atlas_tree::{ItemHandle, ProjectTree};
use atlas_types::{AssetId, CancelSignal, LibraryRef, Partition, TypeTag};
use tracing::{debug, info};

use crate::error::{SessionError, SessionResult};
use crate::events::EventKind;
use crate::session::{SaveRequest, Session};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ImportStatus {
    /// Nothing in the tree holds the candidate's identifier or path.
    New,
    /// The identifier is already imported with the same type.
    Overwrite,
    /// The identifier, one of its parts, or the destination path is held by
    /// something incompatible. Importing replaces it.
    Conflict,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImportCandidate {
    pub source: LibrarySource,
    /// Entry key inside the library.
    pub key: String,
    /// Destination folder, starting with the root folder name.
    pub folder: String,
    pub name: String,
    pub extension: String,
    pub id: AssetId,
    pub type_tag: TypeTag,
    pub part_ids: Vec<AssetId>,
    pub status: ImportStatus,
}

impl ImportCandidate {
    /// Destination path of the imported item.
    pub fn path(&self) -> String {
        paths::item_path(&self.folder, &self.name, &self.extension)
    }
}

/// Candidates of one library. Overwrite candidates are pruned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImportTree {
    pub source: LibrarySource,
    pub candidates: Vec<ImportCandidate>,
}

impl ImportTree {
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn conflicts(&self) -> impl Iterator<Item = &ImportCandidate> {
        self.candidates
            .iter()
            .filter(|c| c.status == ImportStatus::Conflict)
    }
}

fn classify(tree: &ProjectTree, id: AssetId, type_tag: TypeTag, part_ids: &[AssetId], path: &str) -> ImportStatus {
    let owner = tree.find(id);
    let parts_elsewhere = part_ids
        .iter()
        .any(|part| tree.find(*part).is_some_and(|item| Some(item) != owner));
    if parts_elsewhere {
        return ImportStatus::Conflict;
    }
    match owner.and_then(|item| tree.meta(item)) {
        Some(meta) if meta.id == id && meta.type_tag == type_tag => ImportStatus::Overwrite,
        Some(_) => ImportStatus::Conflict,
        None if tree.get(path).is_some() => ImportStatus::Conflict,
        None => ImportStatus::New,
    }
}

impl Session {
    /// Preview the import of `source`.
    ///
    /// Identifiers are computed against the library's ordinal and table as
    /// they would be assigned on import; a library seen for the first time
    /// gets the ordinal its partition counter would mint next.
    pub async fn load_import_items(&self, source: &LibrarySource, cancel: &CancelSignal) -> SessionResult<ImportTree> {
        let signal = self.signal(cancel);
        let project = self.project()?;
        let name = project.name.clone();
        let (library, known) = match self.known_library(source)? {
            Some(library) => (library, true),
            None => {
                let ordinal = project.info.peek_ordinal(source.partition())?;
                (LibraryRef::new(source.partition(), ordinal), false)
            }
        };

        let assets = self
            .provider
            .fetch(source)
            .await?
            .ok_or_else(|| SessionError::NotFound(format!("library asset {source}")))?;
        Self::check(&signal)?;

        let mut table = match (library.partition, known) {
            (_, false) => IdTable::new(),
            (Partition::Bundled, true) => project
                .bundles
                .get(&library.ordinal)
                .map(|d| d.table.clone())
                .unwrap_or_default(),
            (_, true) => {
                let stored: Option<IdTable> =
                    read_value(self.storage.as_ref(), &name, &library.table_key(), &signal).await?;
                Self::check(&signal)?;
                stored.unwrap_or_default()
            }
        };
        let keys = assets.keys();
        table.extend(keys.iter().map(String::as_str))?;

        let tree = &self.project()?.tree;
        let root_path = tree.path_of(tree.root())?;
        let mut candidates = Vec::with_capacity(assets.entries.len());
        for entry in &assets.entries {
            let template = &entry.template;
            let missing = |key: &str| SessionError::NotFound(format!("{key} in the table of {library}"));
            let id = table.id_of(library, entry.key())?.ok_or_else(|| missing(entry.key()))?;
            let mut part_ids = Vec::with_capacity(template.parts.len());
            for index in 0..template.parts.len() {
                let key = part_key(entry.key(), index);
                part_ids.push(table.id_of(library, &key)?.ok_or_else(|| missing(&key))?);
            }
            let folder = if entry.folder().is_empty() {
                root_path.clone()
            } else {
                paths::join(&root_path, entry.folder())
            };
            let extension = self.types.info(template.type_tag)?.extension.clone();
            let path = paths::item_path(&folder, entry.name(), &extension);
            let status = classify(tree, id, template.type_tag, &part_ids, &path);
            candidates.push(ImportCandidate {
                source: source.clone(),
                key: entry.key().to_string(),
                folder,
                name: entry.name().to_string(),
                extension,
                id,
                type_tag: template.type_tag,
                part_ids,
                status,
            });
        }

        let total = candidates.len();
        candidates.retain(|c| c.status != ImportStatus::Overwrite);
        debug!(%source, %library, total, pruned = total - candidates.len(), "built import candidates");
        Ok(ImportTree {
            source: source.clone(),
            candidates,
        })
    }

    /// Import `candidates`, which must all come from one library. Items
    /// holding their identifiers or destination paths are replaced. Returns
    /// the imported items in candidate order.
    pub async fn import(&mut self, candidates: &[ImportCandidate], cancel: &CancelSignal) -> SessionResult<Vec<ItemHandle>> {
        let Some(first) = candidates.first() else {
            return Ok(Vec::new());
        };
        if candidates.iter().any(|c| c.source != first.source) {
            return Err(SessionError::MultiLibraryImportNotSupported);
        }
        self.project()?;
        let source = first.source.clone();
        let signal = self.signal(cancel);

        let library = self.load_library(&source, &signal).await?;
        let objects = self.library_objects(library).cloned().unwrap_or_default();
        let mut handles = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let handle = objects
                .get(&candidate.key)
                .copied()
                .ok_or_else(|| SessionError::NotFound(format!("{} in {source}", candidate.key)))?;
            handles.push(handle);
        }

        let replaced = {
            let tree = &self.project()?.tree;
            let mut replaced: Vec<ItemHandle> = Vec::new();
            for (candidate, handle) in candidates.iter().zip(&handles) {
                let object = self.registry.objects().try_get(*handle)?;
                let ids = self
                    .registry
                    .id_of(*handle)
                    .into_iter()
                    .chain(object.parts.iter().filter_map(|part| self.registry.id_of(*part)));
                let at_path = tree.get(&candidate.path()).filter(|item| !tree.is_folder(*item));
                for item in ids.filter_map(|id| tree.find(id)).chain(at_path) {
                    if !replaced.contains(&item) {
                        replaced.push(item);
                    }
                }
            }
            replaced
        };
        if !replaced.is_empty() {
            debug!(%source, count = replaced.len(), "replacing items");
            self.remove_items(&replaced, true, &signal).await?;
        }

        let mut folders: HashMap<String, ItemHandle> = HashMap::new();
        let mut requests = Vec::with_capacity(candidates.len());
        for (candidate, handle) in candidates.iter().zip(&handles) {
            let folder = match folders.get(&candidate.folder) {
                Some(folder) => *folder,
                None => {
                    let (folder, _) = self.get_or_create_folder(&candidate.folder, &signal).await?;
                    folders.insert(candidate.folder.clone(), folder);
                    folder
                }
            };
            requests.push(SaveRequest::new_in(folder, *handle).with_name(candidate.name.clone()));
        }
        let items = self.save(requests, true, &signal).await?;

        info!(%source, %library, count = items.len(), replaced = replaced.len(), "imported library items");
        self.completed(EventKind::Imported, items.clone(), true);
        Ok(items)
    }
}
