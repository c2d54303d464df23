//! Record key <-> filename mapping.
//!
//! A record with key `k` lives at `<dir>/<encode_key(k)>.json`. Encoding
//! follows the `encodeURIComponent` alphabet so filenames stay portable and
//! every key maps to exactly one file.

use crate::error::StorageError;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use std::path::{Path, PathBuf};

pub const RECORD_EXTENSION: &str = ".json";

const KEY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Percent-encode a record key into a filename stem.
pub fn encode_key(key: &str) -> String {
    utf8_percent_encode(key, KEY_ENCODE_SET).to_string()
}

/// Reverse [`encode_key`].
pub fn decode_key(stem: &str) -> Result<String, StorageError> {
    percent_decode_str(stem)
        .decode_utf8()
        .map(|key| key.into_owned())
        .map_err(|e| StorageError::InvalidFilename {
            name: stem.to_string(),
            reason: e.to_string(),
        })
}

/// Reject keys that have no filename. The empty key would encode to a bare
/// `.json`, which [`key_from_file_name`] never reads back.
pub fn validate_key(key: &str) -> Result<(), StorageError> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey {
            key: key.to_string(),
            reason: "key must not be empty".to_string(),
        });
    }
    Ok(())
}

/// Filename for a record key.
pub fn record_file_name(key: &str) -> String {
    format!("{}{RECORD_EXTENSION}", encode_key(key))
}

/// Full path of the record file for `key` inside `directory`.
pub fn record_path(directory: &Path, key: &str) -> PathBuf {
    directory.join(record_file_name(key))
}

/// Recover the record key from a directory entry name.
///
/// Returns `Ok(None)` for entries that are not record files (temp files,
/// stray files without the `.json` suffix).
pub fn key_from_file_name(name: &str) -> Result<Option<String>, StorageError> {
    match name.strip_suffix(RECORD_EXTENSION) {
        Some(stem) if !stem.is_empty() => decode_key(stem).map(Some),
        _ => Ok(None),
    }
}
