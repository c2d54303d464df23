//! Job queue event channel.
//!
//! Events fan out to every subscriber over a broadcast channel and are also
//! written to the `tracing` log at the matching level. Emitting with no
//! subscriber attached is fine.

use crate::job::Job;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

pub const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "level", rename_all = "snake_case")]
pub enum JobEvent {
    Debug {
        message: String,
    },
    Info {
        message: String,
    },
    Warning {
        message: String,
    },
    Error {
        #[serde(skip_serializing_if = "Option::is_none")]
        job_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        method_name: Option<String>,
        message: String,
    },
    Custom {
        name: String,
        payload: Value,
    },
}

impl JobEvent {
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Debug { message }
            | Self::Info { message }
            | Self::Warning { message }
            | Self::Error { message, .. } => Some(message),
            Self::Custom { .. } => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<JobEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EVENT_CHANNEL_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: JobEvent) {
        match &event {
            JobEvent::Debug { message } => debug!("{message}"),
            JobEvent::Info { message } => info!("{message}"),
            JobEvent::Warning { message } => warn!("{message}"),
            JobEvent::Error {
                job_id, message, ..
            } => error!(job_id = job_id.as_deref().unwrap_or("-"), "{message}"),
            JobEvent::Custom { name, .. } => debug!(event = %name, "custom job queue event"),
        }
        let _ = self.sender.send(event);
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.emit(JobEvent::Debug {
            message: message.into(),
        });
    }

    pub fn info(&self, message: impl Into<String>) {
        self.emit(JobEvent::Info {
            message: message.into(),
        });
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.emit(JobEvent::Warning {
            message: message.into(),
        });
    }

    /// Report a failure tied to `job`.
    pub fn job_error(&self, job: &Job, message: impl Into<String>) {
        self.emit(JobEvent::Error {
            job_id: Some(job.id.clone()),
            method_name: Some(job.method_name.clone()),
            message: message.into(),
        });
    }

    pub fn error(&self, message: impl Into<String>) {
        self.emit(JobEvent::Error {
            job_id: None,
            method_name: None,
            message: message.into(),
        });
    }
}
