//! Revision-checked document store.
//!
//! Every document carries a `_rev` counter: 0 on creation, +1 on each
//! successful write. A write is accepted only when the caller's `_rev`
//! matches the stored one, unless consistency checking is turned off.
//! All mutations run under one [`AsyncLock`]; reads pass through it as a
//! barrier so they never observe a half-applied write.

use crate::codec::validate_key;
use crate::engine::StorageEngine;
use crate::error::StorageError;
use crate::index::{QueryOptions, QueryPage};
use crate::lock::AsyncLock;
use crate::view::View;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::future::Future;
use std::path::PathBuf;

/// A stored document: a JSON object.
pub type Document = Map<String, Value>;

pub const REVISION_FIELD: &str = "_rev";

/// Errors surfaced by [`Datastore`] operations.
#[derive(Debug, thiserror::Error)]
pub enum DatastoreError {
    /// The caller wrote against a stale revision. Re-read and retry.
    #[error(
        "revision conflict on {key}: stored _rev is {expected}, write carried {}",
        describe_revision(.found)
    )]
    Conflict {
        key: String,
        expected: u64,
        found: Option<u64>,
    },

    #[error("view not registered: {0}")]
    ViewNotFound(String),

    #[error("invalid document {key}: {reason}")]
    Validation { key: String, reason: String },

    #[error("update function for {key} failed: {source}")]
    Update {
        key: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl DatastoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

fn describe_revision(found: &Option<u64>) -> String {
    match found {
        Some(rev) => rev.to_string(),
        None => "no _rev".to_string(),
    }
}

/// Write behaviour for [`Datastore::set_item`] and [`Datastore::update_item`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetOptions {
    pub check_consistency: bool,
}

impl Default for SetOptions {
    fn default() -> Self {
        Self {
            check_consistency: true,
        }
    }
}

impl SetOptions {
    /// Overwrite regardless of the stored revision.
    pub fn unchecked() -> Self {
        Self {
            check_consistency: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatastoreOptions {
    pub directory: PathBuf,
}

#[derive(Debug)]
pub struct Datastore {
    engine: StorageEngine<Document>,
    lock: AsyncLock,
}

impl Datastore {
    pub fn open(directory: impl Into<PathBuf>) -> Result<Self, DatastoreError> {
        Ok(Self {
            engine: StorageEngine::open(directory)?,
            lock: AsyncLock::new(),
        })
    }

    pub fn with_options(options: &DatastoreOptions) -> Result<Self, DatastoreError> {
        Self::open(options.directory.clone())
    }

    /// Read all documents from disk.
    pub async fn load(&self) -> Result<&Self, DatastoreError> {
        let _ticket = self.lock.acquire().await;
        self.engine.load().await?;
        Ok(self)
    }

    pub fn engine(&self) -> &StorageEngine<Document> {
        &self.engine
    }

    /// Current document under `key`, or `None`.
    pub async fn get_item(&self, key: &str) -> Result<Option<Document>, DatastoreError> {
        self.lock.barrier().await;
        Ok(self.engine.get(key).document)
    }

    /// Create or overwrite a document, returning it with its new `_rev`.
    pub async fn set_item(
        &self,
        key: &str,
        document: Value,
        options: SetOptions,
    ) -> Result<Document, DatastoreError> {
        check_key(key)?;
        let document = into_document(key, document)?;
        let _ticket = self.lock.acquire().await;
        let existing = self.engine.get(key).document;
        let document = apply_revision(key, document, existing.as_ref(), options)?;
        self.engine.set(key, document.clone()).await?;
        Ok(document)
    }

    /// Read-modify-write a document under the lock.
    ///
    /// `update` receives a copy of the stored document (or `None`) and
    /// returns the replacement. Its error aborts the write.
    pub async fn update_item<F, Fut, E>(
        &self,
        key: &str,
        update: F,
        options: SetOptions,
    ) -> Result<Document, DatastoreError>
    where
        F: FnOnce(Option<Document>) -> Fut,
        Fut: Future<Output = Result<Value, E>>,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        check_key(key)?;
        let _ticket = self.lock.acquire().await;
        let existing = self.engine.get(key).document;
        let updated = update(existing.clone())
            .await
            .map_err(|e| DatastoreError::Update {
                key: key.to_string(),
                source: e.into(),
            })?;
        let document = into_document(key, updated)?;
        let document = apply_revision(key, document, existing.as_ref(), options)?;
        self.engine.set(key, document.clone()).await?;
        Ok(document)
    }

    /// Delete a document. Returns whether it existed.
    pub async fn delete_item(&self, key: &str) -> Result<bool, DatastoreError> {
        let _ticket = self.lock.acquire().await;
        Ok(self.engine.delete(key).await?)
    }

    pub async fn query_keys(
        &self,
        options: QueryOptions,
    ) -> Result<QueryPage<Document>, DatastoreError> {
        self.lock.barrier().await;
        Ok(self.engine.query_keys(&options))
    }

    pub async fn query_view(
        &self,
        view_id: &str,
        options: QueryOptions,
    ) -> Result<QueryPage<Document>, DatastoreError> {
        self.lock.barrier().await;
        self.engine
            .query_view(view_id, &options)
            .ok_or_else(|| DatastoreError::ViewNotFound(view_id.to_string()))
    }

    pub fn set_view(&self, id: impl Into<String>, view: impl View<Document> + 'static) {
        self.engine.set_view(id, view);
    }

    pub fn has_view(&self, id: &str) -> bool {
        self.engine.has_view(id)
    }

    pub fn remove_view(&self, id: &str) -> bool {
        self.engine.remove_view(id)
    }

    pub fn len(&self) -> usize {
        self.engine.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engine.is_empty()
    }
}

fn check_key(key: &str) -> Result<(), DatastoreError> {
    validate_key(key).map_err(|e| match e {
        StorageError::InvalidKey { key, reason } => DatastoreError::Validation { key, reason },
        other => other.into(),
    })
}

fn into_document(key: &str, value: Value) -> Result<Document, DatastoreError> {
    let Value::Object(document) = value else {
        return Err(DatastoreError::Validation {
            key: key.to_string(),
            reason: format!("expected a JSON object, got {}", value_kind(&value)),
        });
    };
    revision_of(key, &document)?;
    Ok(document)
}

fn revision_of(key: &str, document: &Document) -> Result<Option<u64>, DatastoreError> {
    match document.get(REVISION_FIELD) {
        None => Ok(None),
        Some(value) => value.as_u64().map(Some).ok_or_else(|| DatastoreError::Validation {
            key: key.to_string(),
            reason: format!("{REVISION_FIELD} must be a non-negative integer, got {value}"),
        }),
    }
}

fn apply_revision(
    key: &str,
    mut document: Document,
    existing: Option<&Document>,
    options: SetOptions,
) -> Result<Document, DatastoreError> {
    let revision = match existing {
        Some(existing) => {
            let stored = existing
                .get(REVISION_FIELD)
                .and_then(Value::as_u64)
                .unwrap_or(0);
            let found = revision_of(key, &document)?;
            if options.check_consistency && found != Some(stored) {
                return Err(DatastoreError::Conflict {
                    key: key.to_string(),
                    expected: stored,
                    found,
                });
            }
            stored + 1
        }
        None => 0,
    };
    document.insert(REVISION_FIELD.to_string(), Value::from(revision));
    Ok(document)
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
