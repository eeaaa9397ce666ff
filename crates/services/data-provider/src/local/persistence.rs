//! Durable key-value stores mirroring local collections.
//!
//! One entry per resource, holding a [`Collection`]: the resource's records
//! plus the next id to assign, so deleted ids stay retired across restarts.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use common::{AppError, AppResult};
use domain::{Identifier, Record, ID_FIELD};

/// Records of one resource plus its id counter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    pub next_id: u64,
    pub records: Vec<Record>,
}

impl Collection {
    /// Seed the counter past the largest numeric id present
    pub fn from_records(records: Vec<Record>) -> Self {
        Self {
            next_id: first_free_id(&records),
            records,
        }
    }

    pub(crate) fn position(&self, id: &Identifier) -> Option<usize> {
        self.records
            .iter()
            .position(|r| r.get(ID_FIELD).is_some_and(|v| id.matches(v)))
    }

    pub(crate) fn find(&self, id: &Identifier) -> Option<&Record> {
        self.position(id).map(|i| &self.records[i])
    }

    pub(crate) fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

impl Default for Collection {
    fn default() -> Self {
        Self::from_records(Vec::new())
    }
}

fn first_free_id(records: &[Record]) -> u64 {
    records
        .iter()
        .filter_map(|r| Identifier::of(r).and_then(|id| id.as_u64()))
        .max()
        .map_or(1, |max| max.saturating_add(1))
}

/// Accepted layouts: the collection document, or a bare record array.
#[derive(Deserialize)]
#[serde(untagged)]
enum Stored {
    Collection(Collection),
    Records(Vec<Record>),
}

impl From<Stored> for Collection {
    fn from(stored: Stored) -> Self {
        match stored {
            // A hand-edited counter never falls behind the stored ids
            Stored::Collection(c) => Collection {
                next_id: c.next_id.max(first_free_id(&c.records)),
                records: c.records,
            },
            Stored::Records(records) => Collection::from_records(records),
        }
    }
}

fn decode(key: &str, bytes: &[u8]) -> AppResult<Collection> {
    serde_json::from_slice::<Stored>(bytes)
        .map(Collection::from)
        .map_err(|e| AppError::backend(key, "load", e))
}

/// Key-value store keyed by resource name.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a resource's collection; `None` when never written
    async fn read(&self, key: &str) -> AppResult<Option<Collection>>;

    /// Replace a resource's collection
    async fn write(&self, key: &str, collection: &Collection) -> AppResult<()>;
}

/// One JSON file per resource inside a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> AppResult<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(AppError::validation(format!(
                "resource name '{}' cannot be used as a store key",
                key
            )));
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn read(&self, key: &str) -> AppResult<Option<Collection>> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let collection = decode(key, &bytes)?;
                debug!(resource = key, path = %path.display(), "Loaded persisted records");
                Ok(Some(collection))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::backend(key, "load", e)),
        }
    }

    async fn write(&self, key: &str, collection: &Collection) -> AppResult<()> {
        let path = self.path_for(key)?;
        let bytes = serde_json::to_vec_pretty(collection)
            .map_err(|e| AppError::backend(key, "persist", e))?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| AppError::backend(key, "persist", e))?;

        // Write then rename so a crash never leaves a truncated file
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| AppError::backend(key, "persist", e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| AppError::backend(key, "persist", e))?;

        debug!(resource = key, count = collection.records.len(), "Persisted records");
        Ok(())
    }
}

/// Serialized entries kept in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> AppResult<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| AppError::internal("memory store lock poisoned"))
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn read(&self, key: &str) -> AppResult<Option<Collection>> {
        let raw = self.entries()?.get(key).cloned();
        raw.map(|json| decode(key, json.as_bytes())).transpose()
    }

    async fn write(&self, key: &str, collection: &Collection) -> AppResult<()> {
        let json =
            serde_json::to_string(collection).map_err(|e| AppError::backend(key, "persist", e))?;
        self.entries()?.insert(key.to_string(), json);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn records() -> Vec<Record> {
        vec![json!({ "id": 1, "name": "Alice" }).as_object().cloned().unwrap()]
    }

    fn collection() -> Collection {
        Collection {
            next_id: 7,
            records: records(),
        }
    }

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("nested"));

        assert_eq!(store.read("users").await.unwrap(), None);
        store.write("users", &collection()).await.unwrap();
        assert_eq!(store.read("users").await.unwrap(), Some(collection()));
    }

    #[tokio::test]
    async fn test_file_store_reads_bare_record_arrays() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("users.json"),
            br#"[{"id": 4, "name": "Dan"}, {"id": 2, "name": "Bob"}]"#,
        )
        .unwrap();
        let store = FileStore::new(dir.path());

        let loaded = store.read("users").await.unwrap().unwrap();
        assert_eq!(loaded.records.len(), 2);
        assert_eq!(loaded.next_id, 5);
    }

    #[tokio::test]
    async fn test_stale_counter_is_raised_past_stored_ids() {
        let store = MemoryStore::new();
        let lagging = Collection {
            next_id: 1,
            records: records(),
        };
        store.write("users", &lagging).await.unwrap();

        assert_eq!(store.read("users").await.unwrap().unwrap().next_id, 2);
    }

    #[tokio::test]
    async fn test_file_store_rejects_path_like_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        let err = store.write("../escape", &collection()).await.unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_file_store_reports_corrupt_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("users.json"), b"not json").unwrap();
        let store = FileStore::new(dir.path());

        let err = store.read("users").await.unwrap_err();
        assert_eq!(err.code(), "BACKEND_OPERATION_FAILED");
    }

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemoryStore::new();
        store.write("users", &collection()).await.unwrap();
        assert_eq!(store.read("users").await.unwrap(), Some(collection()));
        assert_eq!(store.read("posts").await.unwrap(), None);
    }
}
