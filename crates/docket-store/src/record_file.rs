//! Record files: one pretty-printed JSON value per file.
//!
//! These are blocking primitives. The engine runs them on the blocking pool.

use crate::error::StorageError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Read and parse one record file.
pub fn read_record_from_path<R: DeserializeOwned>(path: &Path) -> Result<R, StorageError> {
    let bytes = fs::read(path).map_err(|source| StorageError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    validate_record_bytes(path, &bytes)?;
    serde_json::from_slice(&bytes).map_err(|source| StorageError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Durably replace the record file at `path`.
///
/// The payload goes to a sibling temp file which is synced and renamed over
/// the target; the parent directory is synced afterwards so the rename
/// itself survives a crash.
pub fn write_record_to_path<R: Serialize>(
    path: &Path,
    key: &str,
    record: &R,
) -> Result<(), StorageError> {
    let payload = serde_json::to_vec_pretty(record).map_err(|source| StorageError::Serialize {
        key: key.to_string(),
        source,
    })?;

    let tmp_path = temp_path_for(path);
    let write_result = (|| -> Result<(), StorageError> {
        let file =
            File::create(&tmp_path).map_err(|e| StorageError::write_file(&tmp_path, e))?;
        let mut writer = BufWriter::new(file);
        writer
            .write_all(&payload)
            .map_err(|e| StorageError::write_file(&tmp_path, e))?;
        let file = writer
            .into_inner()
            .map_err(|e| StorageError::write_file(&tmp_path, e.into_error()))?;
        file.sync_all()
            .map_err(|e| StorageError::write_file(&tmp_path, e))?;
        Ok(())
    })();

    if let Err(error) = write_result {
        let _ = fs::remove_file(&tmp_path);
        return Err(error);
    }

    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        StorageError::write_file(path, e)
    })?;

    sync_parent_dir(path)
}

/// Remove a record file. Returns whether a file was actually removed.
pub fn remove_record_file(path: &Path) -> Result<bool, StorageError> {
    match fs::remove_file(path) {
        Ok(()) => {
            sync_parent_dir(path)?;
            Ok(true)
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(source) => Err(StorageError::DeleteFile {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn sync_parent_dir(path: &Path) -> Result<(), StorageError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        let dir = File::open(parent).map_err(|e| StorageError::write_file(parent, e))?;
        dir.sync_all()
            .map_err(|e| StorageError::write_file(parent, e))?;
    }
    Ok(())
}

/// Sibling temp path for a pending write: `<file>.tmp.<pid>.<seq>`.
fn temp_path_for(path: &Path) -> PathBuf {
    static NEXT_WRITE: AtomicU64 = AtomicU64::new(0);
    let seq = NEXT_WRITE.fetch_add(1, Ordering::Relaxed);
    let mut name: OsString = path.as_os_str().to_os_string();
    name.push(format!(".tmp.{}.{seq}", std::process::id()));
    PathBuf::from(name)
}

fn validate_record_bytes(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    if bytes.contains(&0) {
        return Err(StorageError::Corrupt {
            path: path.to_path_buf(),
            reason: "contains NUL byte(s)".to_string(),
        });
    }
    if std::str::from_utf8(bytes).is_err() {
        return Err(StorageError::Corrupt {
            path: path.to_path_buf(),
            reason: "contains non-UTF-8 byte sequence(s)".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    #[test]
    fn read_record_rejects_nul_payload() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let path = dir.path().join("nul.json");
        fs::write(&path, b"{\"title\":\"x\"}\0garbage").expect("fixture should write");

        match read_record_from_path::<Value>(&path) {
            Err(StorageError::Corrupt { reason, .. }) => assert!(reason.contains("NUL")),
            other => panic!("expected corrupt record error, got {other:?}"),
        }
    }

    #[test]
    fn read_record_rejects_non_utf8_payload() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let path = dir.path().join("bytes.json");
        fs::write(&path, [0xff, 0xfe, 0xfd]).expect("fixture should write");

        match read_record_from_path::<Value>(&path) {
            Err(StorageError::Corrupt { reason, .. }) => assert!(reason.contains("non-UTF-8")),
            other => panic!("expected corrupt record error, got {other:?}"),
        }
    }

    #[test]
    fn read_record_wraps_parse_errors_with_path() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let path = dir.path().join("broken.json");
        fs::write(&path, "{not json").expect("fixture should write");

        let err = read_record_from_path::<Value>(&path).expect_err("parse should fail");
        assert!(matches!(err, StorageError::Parse { .. }));
        assert!(err.to_string().contains("broken.json"));
    }

    #[test]
    fn write_record_replaces_file_atomically() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let path = dir.path().join("doc.json");
        write_record_to_path(&path, "doc", &json!({"v": 1})).expect("first write");
        write_record_to_path(&path, "doc", &json!({"v": 2})).expect("second write");

        let stored: Value = read_record_from_path(&path).expect("record should read");
        assert_eq!(stored, json!({"v": 2}));

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .expect("dir should list")
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().contains(".tmp."))
            .collect();
        assert!(leftovers.is_empty(), "temp files must not survive a write");
    }

    #[test]
    fn temp_paths_are_unique_siblings() {
        let path = Path::new("/data/doc.json");
        let first = temp_path_for(path);
        let second = temp_path_for(path);
        assert_ne!(first, second);
        assert_eq!(first.parent(), path.parent());
        assert!(first.to_string_lossy().starts_with("/data/doc.json.tmp."));
    }

    #[test]
    fn remove_record_file_reports_missing_files() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let path = dir.path().join("gone.json");
        write_record_to_path(&path, "gone", &json!({})).expect("write");

        assert!(remove_record_file(&path).expect("first removal"));
        assert!(!remove_record_file(&path).expect("second removal is a no-op"));
    }
}
