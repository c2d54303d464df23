//! File-per-record storage engine.
//!
//! The engine owns the canonical in-memory copy of every record and mirrors
//! each one to `<dir>/<encoded key>.json`. Writes and deletes touch disk
//! before memory, so memory never holds state that is not yet durable.
//!
//! The engine does no locking of its own. Callers that need read-modify-write
//! atomicity serialize through an [`AsyncLock`](crate::lock::AsyncLock).

use crate::codec::{key_from_file_name, record_path, validate_key};
use crate::error::StorageError;
use crate::index::{
    IndexEntry, IndexItem, IndexKey, QueryOptions, QueryPage, get_index_items_left_to_right,
    sort_index,
};
use crate::record_file::{read_record_from_path, remove_record_file, write_record_to_path};
use crate::view::{View, map_into};
use futures::future::try_join_all;
use parking_lot::RwLock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Bounds every record type stored by the engine.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> Record for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

/// Result of a point lookup. Always the same shape, hit or miss.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry<R> {
    pub key: String,
    pub document: Option<R>,
}

pub struct StorageEngine<R> {
    directory: PathBuf,
    records: RwLock<BTreeMap<String, R>>,
    views: RwLock<BTreeMap<String, Arc<dyn View<R>>>>,
}

impl<R> std::fmt::Debug for StorageEngine<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEngine")
            .field("directory", &self.directory)
            .field("records", &self.records.read().len())
            .field("views", &self.views.read().keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<R: Record> StorageEngine<R> {
    /// Bind an engine to `directory`, creating it if missing.
    pub fn open(directory: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let directory = directory.into();
        if directory.as_os_str().is_empty() {
            return Err(StorageError::InvalidDirectory(
                "directory path is empty".to_string(),
            ));
        }
        if directory.exists() && !directory.is_dir() {
            return Err(StorageError::InvalidDirectory(format!(
                "{} is not a directory",
                directory.display()
            )));
        }
        fs::create_dir_all(&directory).map_err(|source| StorageError::CreateDir {
            path: directory.clone(),
            source,
        })?;

        Ok(Self {
            directory,
            records: RwLock::new(BTreeMap::new()),
            views: RwLock::new(BTreeMap::new()),
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Read every record file in the directory into memory.
    ///
    /// Files are read in parallel; the first failure aborts the load and
    /// leaves the in-memory map untouched. Returns the number of records.
    pub async fn load(&self) -> Result<usize, StorageError> {
        let directory = self.directory.clone();
        let listing = tokio::task::spawn_blocking({
            let directory = directory.clone();
            move || list_record_files(&directory)
        })
        .await
        .map_err(|e| StorageError::task(&directory, e))??;

        let reads = listing.into_iter().map(|(key, path)| async move {
            let record = tokio::task::spawn_blocking({
                let path = path.clone();
                move || read_record_from_path::<R>(&path)
            })
            .await
            .map_err(|e| StorageError::task(&path, e))??;
            Ok::<_, StorageError>((key, record))
        });
        let loaded = try_join_all(reads).await?;

        let count = loaded.len();
        let mut records = self.records.write();
        records.clear();
        records.extend(loaded);
        debug!(directory = %self.directory.display(), count, "loaded records");
        Ok(count)
    }

    /// In-memory lookup.
    pub fn get(&self, key: &str) -> Entry<R> {
        Entry {
            key: key.to_string(),
            document: self.records.read().get(key).cloned(),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.records.read().contains_key(key)
    }

    /// Persist `value` under `key`, then publish it in memory.
    pub async fn set(&self, key: &str, value: R) -> Result<(), StorageError> {
        validate_key(key)?;
        let path = record_path(&self.directory, key);
        let on_disk = value.clone();
        let owned_key = key.to_string();
        tokio::task::spawn_blocking({
            let path = path.clone();
            move || write_record_to_path(&path, &owned_key, &on_disk)
        })
        .await
        .map_err(|e| StorageError::task(&path, e))??;

        self.records.write().insert(key.to_string(), value);
        debug!(key, path = %path.display(), "stored record");
        Ok(())
    }

    /// Remove the record file, then the in-memory entry.
    ///
    /// Returns whether anything existed under `key`.
    pub async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        let path = record_path(&self.directory, key);
        let removed_file = tokio::task::spawn_blocking({
            let path = path.clone();
            move || remove_record_file(&path)
        })
        .await
        .map_err(|e| StorageError::task(&path, e))??;

        let removed_entry = self.records.write().remove(key).is_some();
        debug!(key, path = %path.display(), "deleted record");
        Ok(removed_file || removed_entry)
    }

    pub fn keys(&self) -> Vec<String> {
        self.records.read().keys().cloned().collect()
    }

    /// Snapshot of every record in key order.
    pub fn records(&self) -> Vec<(String, R)> {
        self.records
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Clones of the records matching `predicate`, in key order.
    pub fn filter(&self, predicate: impl Fn(&R) -> bool) -> Vec<R> {
        self.records
            .read()
            .values()
            .filter(|record| predicate(record))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Register (or replace) a view under `id`.
    pub fn set_view(&self, id: impl Into<String>, view: impl View<R> + 'static) {
        self.views.write().insert(id.into(), Arc::new(view));
    }

    pub fn has_view(&self, id: &str) -> bool {
        self.views.read().contains_key(id)
    }

    pub fn remove_view(&self, id: &str) -> bool {
        self.views.write().remove(id).is_some()
    }

    /// Page through record keys.
    pub fn query_keys(&self, options: &QueryOptions) -> QueryPage<R> {
        let records = self.records.read();
        let index = records
            .keys()
            .map(|key| IndexEntry {
                key: IndexKey::from(key.as_str()),
                value: None,
                document_key: key.clone(),
            })
            .collect();
        extract_page(index, &records, options)
    }

    /// Page through the index built by view `id`. `None` if no such view.
    pub fn query_view(&self, id: &str, options: &QueryOptions) -> Option<QueryPage<R>> {
        let view = self.views.read().get(id).cloned()?;
        let records = self.records.read();
        let mut index = Vec::with_capacity(records.len());
        for (key, record) in records.iter() {
            map_into(view.as_ref(), key, record, &mut index);
        }
        Some(extract_page(index, &records, options))
    }
}

fn extract_page<R: Clone>(
    mut index: Vec<IndexEntry>,
    records: &BTreeMap<String, R>,
    options: &QueryOptions,
) -> QueryPage<R> {
    let direction = options.direction();
    sort_index(&mut index, direction);
    let (start, end) = options.bounds();
    let slice = get_index_items_left_to_right(
        &index,
        options.inclusive_start_index,
        options.limit,
        &start,
        &end,
        direction,
    );

    let items = slice
        .entries
        .into_iter()
        .map(|entry| {
            let document = if options.include_documents {
                records.get(&entry.document_key).cloned()
            } else {
                None
            };
            IndexItem {
                key: entry.key,
                value: entry.value,
                document_key: entry.document_key,
                document,
            }
        })
        .collect();

    QueryPage {
        items,
        exclusive_end_index: slice.exclusive_end_index,
        total_rows: index.len(),
    }
}

fn list_record_files(directory: &Path) -> Result<Vec<(String, PathBuf)>, StorageError> {
    let read_dir = fs::read_dir(directory).map_err(|source| StorageError::ReadDir {
        path: directory.to_path_buf(),
        source,
    })?;

    let mut files = Vec::new();
    for entry in read_dir {
        let entry = entry.map_err(|source| StorageError::ReadDir {
            path: directory.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if let Some(key) = key_from_file_name(name)? {
            files.push((key, path));
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::Emitter;
    use serde_json::{Value, json};

    fn engine(dir: &Path) -> StorageEngine<Value> {
        StorageEngine::open(dir).expect("engine should open")
    }

    #[tokio::test]
    async fn set_rejects_the_empty_key() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = engine(dir.path());

        let err = store.set("", json!({})).await.expect_err("empty key");
        assert!(matches!(err, StorageError::InvalidKey { .. }), "{err}");
        assert!(!dir.path().join(".json").exists());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn set_writes_file_before_publishing_in_memory() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = engine(dir.path());

        store
            .set("users/alice", json!({"name": "Alice"}))
            .await
            .expect("set should succeed");

        let path = dir.path().join("users%2Falice.json");
        assert!(path.exists());
        assert_eq!(
            store.get("users/alice"),
            Entry {
                key: "users/alice".to_string(),
                document: Some(json!({"name": "Alice"})),
            }
        );
    }

    #[tokio::test]
    async fn get_of_missing_key_has_same_shape() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = engine(dir.path());
        let entry = store.get("nope");
        assert_eq!(entry.key, "nope");
        assert!(entry.document.is_none());
    }

    #[tokio::test]
    async fn load_restores_records_from_disk() {
        let dir = tempfile::tempdir().expect("temp dir");
        {
            let store = engine(dir.path());
            store.set("a", json!({"n": 1})).await.expect("set a");
            store.set("b c", json!({"n": 2})).await.expect("set b c");
        }
        fs::write(dir.path().join("notes.txt"), "ignored").expect("stray file");

        let reopened = engine(dir.path());
        assert_eq!(reopened.load().await.expect("load"), 2);
        assert_eq!(reopened.keys(), vec!["a".to_string(), "b c".to_string()]);
        assert_eq!(reopened.get("b c").document, Some(json!({"n": 2})));
    }

    #[tokio::test]
    async fn load_reports_unparseable_files_with_path() {
        let dir = tempfile::tempdir().expect("temp dir");
        fs::write(dir.path().join("bad.json"), "{oops").expect("fixture");

        let store = engine(dir.path());
        let err = store.load().await.expect_err("load should fail");
        assert!(matches!(err, StorageError::Parse { .. }));
        assert!(err.to_string().contains("bad.json"));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn delete_removes_file_and_entry() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = engine(dir.path());
        store.set("k", json!({})).await.expect("set");

        assert!(store.delete("k").await.expect("delete"));
        assert!(!dir.path().join("k.json").exists());
        assert!(!store.contains("k"));
        assert!(!store.delete("k").await.expect("second delete is a no-op"));
    }

    #[test]
    fn open_rejects_empty_and_file_paths() {
        let err = StorageEngine::<Value>::open("").expect_err("empty path");
        assert!(matches!(err, StorageError::InvalidDirectory(_)));

        let file = tempfile::NamedTempFile::new().expect("temp file");
        let err = StorageEngine::<Value>::open(file.path()).expect_err("file path");
        assert!(matches!(err, StorageError::InvalidDirectory(_)));
    }

    #[tokio::test]
    async fn view_fan_out_doubles_the_index() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = engine(dir.path());
        for (key, tag) in [("p1", "red"), ("p2", "blue"), ("p3", "green")] {
            store.set(key, json!({"tag": tag})).await.expect("set");
        }
        store.set_view("tags", |doc: &Value, emit: &mut Emitter<'_>| {
            emit.emit(doc["tag"].clone(), None);
            emit.emit(format!("#{}", doc["tag"].as_str().unwrap_or_default()), None);
        });

        let page = store
            .query_view("tags", &QueryOptions::new().limit(100))
            .expect("view is registered");
        assert_eq!(page.total_rows, 6);
        assert_eq!(page.items.len(), 6);
        assert!(store.query_view("missing", &QueryOptions::new()).is_none());
    }

    #[tokio::test]
    async fn include_documents_hydrates_items() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = engine(dir.path());
        store.set("a", json!({"v": 1})).await.expect("set");

        let bare = store.query_keys(&QueryOptions::new());
        assert!(bare.items[0].document.is_none());

        let hydrated = store.query_keys(&QueryOptions::new().include_documents(true));
        assert_eq!(hydrated.items[0].document, Some(json!({"v": 1})));
    }
}
