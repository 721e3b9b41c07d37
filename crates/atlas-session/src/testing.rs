//! Fixtures shared by the session tests.

use std::collections::BTreeMap;
use std::sync::Arc;

use atlas_library::{AssetLibrary, InMemoryLibraryProvider, LibrarySource, ObjectTemplate, PartTemplate};
use atlas_registry::{ObjectHandle, TypeCatalog};
use atlas_storage::InMemoryStorage;
use atlas_tree::ItemHandle;
use atlas_types::{CancelSignal, PersistentKind, TypeTag};

use crate::config::SessionConfig;
use crate::session::{OpenFlags, SaveRequest, Session};

pub(crate) struct Fixture {
    pub session: Session,
    pub storage: Arc<InMemoryStorage>,
    pub provider: Arc<InMemoryLibraryProvider>,
}

pub(crate) fn mesh() -> TypeTag {
    TypeTag::from_name("Mesh")
}

pub(crate) fn prefab() -> TypeTag {
    TypeTag::from_name("Prefab")
}

pub(crate) fn material() -> TypeTag {
    TypeTag::from_name("Material")
}

pub(crate) fn types() -> TypeCatalog {
    let mut types = TypeCatalog::with_builtin();
    types.register_named("Mesh", PersistentKind::Scalar, ".mesh");
    types.register_named("Prefab", PersistentKind::Composite, ".prefab");
    types.register_named("Material", PersistentKind::Scalar, ".mat");
    types
}

pub(crate) fn none() -> CancelSignal {
    CancelSignal::none()
}

pub(crate) fn fixture() -> Fixture {
    fixture_with(SessionConfig::default(), InMemoryStorage::new())
}

pub(crate) fn fixture_with(config: SessionConfig, storage: InMemoryStorage) -> Fixture {
    let storage = Arc::new(storage);
    let provider = Arc::new(InMemoryLibraryProvider::new());
    let session = Session::new(config, storage.clone(), provider.clone(), types());
    Fixture {
        session,
        storage,
        provider,
    }
}

pub(crate) async fn open(session: &mut Session) {
    session
        .open_project("demo", OpenFlags::create(), &none())
        .await
        .unwrap();
}

/// Save `object` as a new item in `folder` and return the item.
pub(crate) async fn save_new(session: &mut Session, folder: ItemHandle, object: ObjectHandle) -> ItemHandle {
    let items = session
        .save(vec![SaveRequest::new_in(folder, object)], false, &none())
        .await
        .unwrap();
    items[0]
}

pub(crate) fn props_source() -> LibrarySource {
    LibrarySource::Static { name: "props".into() }
}

/// `Props/Crate` (a prefab whose lid references `Props/Plank`) and
/// `Props/Plank`.
pub(crate) fn props_library() -> AssetLibrary {
    let lid = PartTemplate {
        name: "Lid".into(),
        type_tag: mesh(),
        fields: BTreeMap::new(),
        references: vec!["Props/Plank".into()],
        owner: None,
    };
    AssetLibrary::new("props")
        .with_entry(
            "Props/Crate",
            ObjectTemplate::new("Crate", prefab())
                .with_field("mass", 12i64)
                .with_part(lid),
        )
        .with_entry("Props/Plank", ObjectTemplate::new("Plank", mesh()).with_field("length", 2.5))
}
