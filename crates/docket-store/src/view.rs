//! Views: named map functions that project records into an index.
//!
//! Views live only in memory and must be registered again after a restart.

use crate::index::{IndexEntry, IndexKey};
use serde_json::Value;

/// Collects the entries a view's map function emits for one record.
#[derive(Debug)]
pub struct Emitter<'a> {
    document_key: &'a str,
    entries: &'a mut Vec<IndexEntry>,
}

impl<'a> Emitter<'a> {
    pub(crate) fn new(document_key: &'a str, entries: &'a mut Vec<IndexEntry>) -> Self {
        Self {
            document_key,
            entries,
        }
    }

    /// Key of the record currently being mapped.
    pub fn document_key(&self) -> &str {
        self.document_key
    }

    /// Add one index entry for the current record.
    pub fn emit(&mut self, key: impl Into<IndexKey>, value: Option<Value>) {
        self.entries.push(IndexEntry {
            key: key.into(),
            value,
            document_key: self.document_key.to_string(),
        });
    }
}

/// A map function over records. Emits zero or more entries per record.
pub trait View<R>: Send + Sync {
    fn map(&self, document: &R, emit: &mut Emitter<'_>);
}

impl<R, F> View<R> for F
where
    F: Fn(&R, &mut Emitter<'_>) + Send + Sync,
{
    fn map(&self, document: &R, emit: &mut Emitter<'_>) {
        self(document, emit)
    }
}

/// Run `view` over one record, appending what it emits to `entries`.
pub(crate) fn map_into<R>(
    view: &dyn View<R>,
    document_key: &str,
    document: &R,
    entries: &mut Vec<IndexEntry>,
) {
    view.map(document, &mut Emitter::new(document_key, entries));
}
