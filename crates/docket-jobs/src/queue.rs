//! Public job queue: register handlers, schedule jobs, start, dispose.
//!
//! Jobs scheduled before [`JobQueue::start`] are held in memory and handed
//! to the engine, in the order they were scheduled, once persisted jobs
//! have been reloaded.

use crate::engine::{EngineParts, JobQueueEngine};
use crate::error::JobQueueError;
use crate::events::JobEvent;
use crate::handler::JobHandler;
use crate::job::{Job, JobSpec};
use crate::options::{JobQueueOptions, StartOptions};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast;

#[derive(Debug)]
pub struct JobQueue {
    engine: JobQueueEngine,
    options: JobQueueOptions,
    pending: Mutex<Vec<Job>>,
    started: AtomicBool,
    starting: tokio::sync::Mutex<()>,
}

impl JobQueue {
    pub fn new(options: JobQueueOptions) -> Result<Self, JobQueueError> {
        Self::with_parts(options, EngineParts::default())
    }

    pub fn with_parts(
        options: JobQueueOptions,
        parts: EngineParts,
    ) -> Result<Self, JobQueueError> {
        let engine = JobQueueEngine::with_parts(&options, parts)?;
        Ok(Self {
            engine,
            options,
            pending: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
            starting: tokio::sync::Mutex::new(()),
        })
    }

    pub fn options(&self) -> &JobQueueOptions {
        &self.options
    }

    pub fn engine(&self) -> &JobQueueEngine {
        &self.engine
    }

    /// Register the handler for `method_name`, replacing any previous one.
    pub fn register_job_handler(
        &self,
        method_name: impl Into<String>,
        handler: impl JobHandler + 'static,
    ) -> Result<(), JobQueueError> {
        self.engine.register_job_handler(method_name, handler)
    }

    pub fn has_job_handler(&self, method_name: &str) -> bool {
        self.engine.has_job_handler(method_name)
    }

    /// Schedule a job and return it as persisted.
    ///
    /// The handler must already be registered. Before `start` the job is
    /// only buffered; afterwards it is on disk when this returns.
    pub async fn schedule_job(&self, spec: JobSpec) -> Result<Job, JobQueueError> {
        if self.engine.is_disposed() {
            return Err(JobQueueError::Disposed);
        }
        if !self.engine.has_job_handler(&spec.method_name) {
            return Err(JobQueueError::HandlerNotRegistered(spec.method_name));
        }

        let job = self.engine.create_job(spec);
        if !self.started.load(Ordering::SeqCst) {
            let mut pending = self.pending.lock();
            // start() may have drained the buffer since the check above.
            if !self.started.load(Ordering::SeqCst) {
                pending.push(job.clone());
                return Ok(job);
            }
        }

        if self.engine.schedule_job(job.clone()).await? {
            Ok(job)
        } else {
            Err(JobQueueError::Disposed)
        }
    }

    /// Reload persisted jobs, flush the pre-start buffer and begin
    /// dispatching. Only the first call has any effect; concurrent calls
    /// wait for it to finish.
    pub async fn start(&self, options: StartOptions) -> Result<(), JobQueueError> {
        if self.engine.is_disposed() {
            return Err(JobQueueError::Disposed);
        }
        let _starting = self.starting.lock().await;
        if self.started.load(Ordering::SeqCst) {
            return Ok(());
        }

        let delay = options
            .start_delay
            .or_else(|| self.options.start_delay_duration());
        if delay.is_some() {
            self.engine.pause_dispatch();
        }

        self.engine.load().await?;

        let buffered = {
            let mut pending = self.pending.lock();
            if self.started.swap(true, Ordering::SeqCst) {
                return Ok(());
            }
            std::mem::take(&mut *pending)
        };
        let buffered_count = buffered.len();
        for job in buffered {
            self.engine.schedule_job(job).await?;
        }
        if buffered_count > 0 {
            self.engine
                .events()
                .debug(format!("flushed {buffered_count} job(s) scheduled before start"));
        }

        if let Some(delay) = delay {
            self.engine.resume_dispatch_after(delay);
        }
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Remove pending and buffered jobs for `method_name`. Jobs already
    /// running finish normally.
    pub async fn remove_jobs_by_method_name(
        &self,
        method_name: &str,
    ) -> Result<usize, JobQueueError> {
        let buffered = {
            let mut pending = self.pending.lock();
            let before = pending.len();
            pending.retain(|job| job.method_name != method_name);
            before - pending.len()
        };
        let persisted = self.engine.remove_jobs_by_method_name(method_name).await?;
        Ok(buffered + persisted)
    }

    /// Persisted jobs followed by jobs still waiting for `start`.
    pub fn get_all_jobs(&self) -> Vec<Job> {
        let mut jobs = self.engine.get_all_jobs();
        jobs.extend(self.pending.lock().iter().cloned());
        jobs
    }

    pub fn dispose(&self) {
        self.pending.lock().clear();
        self.engine.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.engine.is_disposed()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.engine.subscribe()
    }

    /// Publish an application event on the queue's channel.
    pub fn emit(&self, event: JobEvent) {
        self.engine.events().emit(event);
    }
}
