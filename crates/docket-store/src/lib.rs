//! # docket-store
//!
//! File-backed record storage with optimistic concurrency.
//!
//! This crate provides:
//! - `AsyncLock`: FIFO mutual exclusion for async critical sections
//! - `StorageEngine`: one JSON file per record plus a canonical in-memory map
//! - key and view indexes with range filtering and pagination
//! - `Datastore`: revision-checked document CRUD over the engine
//!
//! ## Data model
//!
//! ```text
//! <dir>/<urlencoded key>.json   (one file per record)
//!     ↕  load / set / delete
//! StorageEngine (canonical in-memory map)
//!     ↓  rebuilt per query
//! sorted index → page
//! ```

pub mod codec;
pub mod datastore;
pub mod engine;
pub mod error;
pub mod index;
pub mod lock;
pub mod record_file;
pub mod view;

pub use codec::{RECORD_EXTENSION, decode_key, encode_key, record_file_name, validate_key};
pub use datastore::{
    Datastore, DatastoreError, DatastoreOptions, Document, REVISION_FIELD, SetOptions,
};
pub use engine::{Entry, Record, StorageEngine};
pub use error::StorageError;
pub use index::{
    DEFAULT_QUERY_LIMIT, Direction, IndexEntry, IndexItem, IndexKey, QueryOptions, QueryPage,
    collate, get_index_items_left_to_right,
};
pub use lock::{AsyncLock, LockTicket};
pub use view::{Emitter, View};
