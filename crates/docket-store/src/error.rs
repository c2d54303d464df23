//! Error types for record storage.

use std::path::{Path, PathBuf};

/// Failures raised by the file-per-record storage engine.
///
/// Every I/O variant names the operation and the path it touched and keeps
/// the underlying error as its source.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("invalid storage directory: {0}")]
    InvalidDirectory(String),

    #[error("failed to create directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read directory {}: {source}", path.display())]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read record file {}: {source}", path.display())]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse record file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("corrupted record file {}: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("failed to serialize record {key}: {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write record file {}: {source}", path.display())]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to delete record file {}: {source}", path.display())]
    DeleteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid record key {key:?}: {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("invalid record filename {name}: {reason}")]
    InvalidFilename { name: String, reason: String },

    #[error("storage task for {} did not complete: {message}", path.display())]
    Task { path: PathBuf, message: String },
}

impl StorageError {
    pub(crate) fn write_file(path: &Path, source: std::io::Error) -> Self {
        Self::WriteFile {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn task(path: &Path, error: tokio::task::JoinError) -> Self {
        Self::Task {
            path: path.to_path_buf(),
            message: error.to_string(),
        }
    }
}
