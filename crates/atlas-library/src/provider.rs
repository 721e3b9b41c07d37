use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::{LibraryError, LibraryResult};
use crate::source::LibrarySource;
use crate::template::AssetLibrary;

/// Fetches external libraries.
///
/// `Ok(None)` means the backing asset does not exist. Callers treat that as
/// a library with zero objects.
#[async_trait]
pub trait LibraryProvider: Send + Sync {
    async fn fetch(&self, source: &LibrarySource) -> LibraryResult<Option<AssetLibrary>>;
}

/// `HashMap`-backed provider for tests and embedding.
#[derive(Debug, Default)]
pub struct InMemoryLibraryProvider {
    libraries: RwLock<HashMap<LibrarySource, AssetLibrary>>,
    failing: RwLock<HashMap<LibrarySource, String>>,
}

impl InMemoryLibraryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, source: LibrarySource, library: AssetLibrary) {
        self.libraries.write().expect("lock poisoned").insert(source, library);
    }

    pub fn remove(&self, source: &LibrarySource) -> Option<AssetLibrary> {
        self.libraries.write().expect("lock poisoned").remove(source)
    }

    /// Make every fetch of `source` fail with `reason`.
    pub fn fail(&self, source: LibrarySource, reason: impl Into<String>) {
        self.failing
            .write()
            .expect("lock poisoned")
            .insert(source, reason.into());
    }
}

#[async_trait]
impl LibraryProvider for InMemoryLibraryProvider {
    async fn fetch(&self, source: &LibrarySource) -> LibraryResult<Option<AssetLibrary>> {
        if let Some(reason) = self.failing.read().expect("lock poisoned").get(source) {
            return Err(LibraryError::Provider {
                source_name: source.to_string(),
                reason: reason.clone(),
            });
        }
        Ok(self.libraries.read().expect("lock poisoned").get(source).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::ObjectTemplate;
    use atlas_types::TypeTag;

    #[tokio::test]
    async fn fetch_returns_inserted_libraries() {
        let provider = InMemoryLibraryProvider::new();
        let source = LibrarySource::Static { name: "props".into() };
        let lib = AssetLibrary::new("props").with_entry("Crate", ObjectTemplate::new("Crate", TypeTag::from_name("Mesh")));
        provider.insert(source.clone(), lib.clone());

        assert_eq!(provider.fetch(&source).await.unwrap(), Some(lib));
        let missing = LibrarySource::Static { name: "none".into() };
        assert_eq!(provider.fetch(&missing).await.unwrap(), None);
    }

    #[tokio::test]
    async fn failing_sources_error() {
        let provider = InMemoryLibraryProvider::new();
        let source = LibrarySource::BuiltIn { number: 1 };
        provider.fail(source.clone(), "disk on fire");
        assert!(matches!(
            provider.fetch(&source).await,
            Err(LibraryError::Provider { .. })
        ));
    }
}
