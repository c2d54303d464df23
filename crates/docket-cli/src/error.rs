use docket_jobs::JobQueueError;
use docket_store::{DatastoreError, StorageError};
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("failed to read config {path}: {source}")]
    ReadConfig {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    ParseConfig {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("no {section} directory: pass --dir or set [{section}] directory in the config file")]
    MissingDirectory { section: &'static str },

    #[error("invalid JSON document: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("failed to start async runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error(transparent)]
    Datastore(#[from] DatastoreError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Jobs(#[from] JobQueueError),
}
