//! Typed access to the key/value namespace.
//!
//! Each stored type carries an extension that is appended to its key, so
//! `AssetLibrary_3` holding an identifier table lives at
//! `AssetLibrary_3.idmap`. Values are bincode-encoded.

use atlas_types::CancelSignal;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{StorageError, StorageResult};
use crate::traits::Storage;

/// A type persisted in the key/value namespace.
pub trait StoredValue: Serialize + DeserializeOwned + Send + Sync {
    /// Extension including the leading dot.
    const EXTENSION: &'static str;
}

pub fn value_key<T: StoredValue>(key: &str) -> String {
    format!("{key}{}", T::EXTENSION)
}

fn decode<T: StoredValue>(key: &str, bytes: &[u8]) -> StorageResult<T> {
    bincode::deserialize(bytes)
        .map_err(|e| StorageError::exception(format!("failed to decode value {key}: {e}")))
}

/// Read a value. A missing key is `Ok(None)`, not an error.
pub async fn read_value<T: StoredValue, S: Storage + ?Sized>(
    storage: &S,
    project: &str,
    key: &str,
    cancel: &CancelSignal,
) -> StorageResult<Option<T>> {
    let full_key = value_key::<T>(key);
    match storage.get_value(project, &full_key, cancel).await {
        Ok(bytes) => decode(&full_key, &bytes).map(Some),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

pub async fn write_value<T: StoredValue, S: Storage + ?Sized>(
    storage: &S,
    project: &str,
    key: &str,
    value: &T,
    cancel: &CancelSignal,
) -> StorageResult<()> {
    let full_key = value_key::<T>(key);
    let bytes = bincode::serialize(value)
        .map_err(|e| StorageError::exception(format!("failed to encode value {full_key}: {e}")))?;
    storage.set_value(project, &full_key, &bytes, cancel).await
}

/// Every value of type `T` whose key (without extension) matches `pattern`.
/// Returned keys have the extension stripped.
pub async fn read_values<T: StoredValue, S: Storage + ?Sized>(
    storage: &S,
    project: &str,
    pattern: &str,
    cancel: &CancelSignal,
) -> StorageResult<Vec<(String, T)>> {
    let entries = storage.get_values(project, &value_key::<T>(pattern), cancel).await?;
    entries
        .into_iter()
        .map(|(key, bytes)| {
            let value = decode(&key, &bytes)?;
            let bare = key.strip_suffix(T::EXTENSION).unwrap_or(&key).to_string();
            Ok((bare, value))
        })
        .collect()
}

/// Delete a value. A missing key is not an error.
pub async fn delete_value<T: StoredValue, S: Storage + ?Sized>(
    storage: &S,
    project: &str,
    key: &str,
    cancel: &CancelSignal,
) -> StorageResult<()> {
    match storage.delete_value(project, &value_key::<T>(key), cancel).await {
        Err(e) if e.is_not_found() => Ok(()),
        other => other,
    }
}
