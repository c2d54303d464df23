//! # docket-jobs
//!
//! Durable job queue on top of `docket-store`.
//!
//! Jobs are persisted one file per job before they are scheduled, run by
//! registered async handlers with a bounded number in flight, and deleted
//! once they complete or fail. Jobs that survive a crash are reloaded and
//! run again on the next start.
//!
//! ```text
//! JobQueue::schedule_job ─► (buffer until start) ─► JobQueueEngine
//!     persist <method>__<id>.json
//!     ready?  ─► Pull ─┐           future? ─► timer ─► Pull ─┐
//!                      ▼                                     ▼
//!              dispatch task: oldest ready job → IN_PROGRESS → spawn handler
//!                      ▲                                     │
//!                      └──────────── SlotFreed ◄─────────────┘ (file deleted)
//! ```

pub mod clock;
pub mod engine;
pub mod error;
pub mod events;
pub mod handler;
pub mod id;
pub mod job;
pub mod options;
pub mod queue;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{DISPATCH_RETRY_DELAY, EngineParts, JobQueueEngine};
pub use error::{HandlerError, JobQueueError};
pub use events::{EVENT_CHANNEL_CAPACITY, EventBus, JobEvent};
pub use handler::{HandlerRegistry, JobHandler, validate_method_name};
pub use id::JobIdGenerator;
pub use job::{
    Job, JobArgs, JobParams, JobSpec, JobState, JobTiming, KEY_SEPARATOR, ParamsKind, job_key,
};
pub use options::{DEFAULT_MAX_CONCURRENT_JOBS, JobQueueOptions, StartOptions};
pub use queue::JobQueue;
