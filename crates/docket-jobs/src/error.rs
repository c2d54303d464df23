//! Error types for the job queue.

use docket_store::StorageError;

pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum JobQueueError {
    #[error("no handler registered for job method {0}")]
    HandlerNotRegistered(String),

    #[error("invalid job method name {name:?}: {reason}")]
    InvalidMethodName { name: String, reason: String },

    #[error("invalid job queue options: {0}")]
    InvalidOptions(String),

    #[error("job queue has been disposed")]
    Disposed,

    #[error(transparent)]
    Storage(#[from] StorageError),
}
