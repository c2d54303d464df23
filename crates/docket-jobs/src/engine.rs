//! Durable, concurrency-bounded job dispatcher.
//!
//! Every pending job is a file in the queue directory. A single background
//! dispatch task pulls the oldest ready job whenever it is signalled
//! (a job became ready, a deferred timer fired, or a running job freed its
//! slot) and keeps at most `max_concurrent_jobs` executions in flight.
//! Each execution runs in its own task; when it finishes the job's file is
//! deleted and the dispatcher is signalled again.
//!
//! Handler failures never escape: they are recorded on the job and reported
//! on the event channel.
//!
//! A storage error while recording a job's start leaves the job pending and
//! retries dispatch after [`DISPATCH_RETRY_DELAY`].
//!
//! Delivery is at-least-once. A job that was `IN_PROGRESS` when the process
//! died is reset to `NOT_STARTED` on [`JobQueueEngine::load`] and runs again,
//! so handlers with external side effects should be idempotent.

use crate::clock::{Clock, SystemClock};
use crate::error::JobQueueError;
use crate::events::{EventBus, JobEvent};
use crate::handler::{HandlerRegistry, JobHandler};
use crate::id::JobIdGenerator;
use crate::job::{Job, JobSpec, JobState};
use crate::options::JobQueueOptions;
use docket_store::{AsyncLock, StorageEngine};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

/// Backoff before the dispatcher retries after failing to persist a start.
pub const DISPATCH_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Wake-ups for the dispatch task.
#[derive(Debug)]
enum DispatchSignal {
    Pull,
    SlotFreed { job_id: String },
    Shutdown,
}

/// Collaborators an engine is built from. Tests swap in a manual clock or
/// a pre-seeded id generator.
#[derive(Debug, Clone)]
pub struct EngineParts {
    pub clock: Arc<dyn Clock>,
    pub ids: Arc<JobIdGenerator>,
    pub events: EventBus,
}

impl Default for EngineParts {
    fn default() -> Self {
        Self {
            clock: Arc::new(SystemClock),
            ids: Arc::new(JobIdGenerator::new()),
            events: EventBus::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct JobQueueEngine {
    inner: Arc<EngineInner>,
}

#[derive(Debug)]
struct EngineInner {
    store: StorageEngine<Job>,
    lock: AsyncLock,
    handlers: HandlerRegistry,
    clock: Arc<dyn Clock>,
    ids: Arc<JobIdGenerator>,
    events: EventBus,
    max_concurrency: usize,
    in_progress: Mutex<BTreeSet<String>>,
    timers: Mutex<HashMap<String, JoinHandle<()>>>,
    disposed: AtomicBool,
    dispatch_enabled: AtomicBool,
    signals: mpsc::UnboundedSender<DispatchSignal>,
    dispatcher: Mutex<Option<mpsc::UnboundedReceiver<DispatchSignal>>>,
}

impl JobQueueEngine {
    pub fn new(options: &JobQueueOptions) -> Result<Self, JobQueueError> {
        Self::with_parts(options, EngineParts::default())
    }

    pub fn with_parts(
        options: &JobQueueOptions,
        parts: EngineParts,
    ) -> Result<Self, JobQueueError> {
        if options.max_concurrent_jobs == 0 {
            return Err(JobQueueError::InvalidOptions(
                "max_concurrent_jobs must be at least 1".to_string(),
            ));
        }
        let store = StorageEngine::open(options.directory.clone())?;
        let (signals, receiver) = mpsc::unbounded_channel();

        Ok(Self {
            inner: Arc::new(EngineInner {
                store,
                lock: AsyncLock::new(),
                handlers: HandlerRegistry::default(),
                clock: parts.clock,
                ids: parts.ids,
                events: parts.events,
                max_concurrency: options.max_concurrent_jobs,
                in_progress: Mutex::new(BTreeSet::new()),
                timers: Mutex::new(HashMap::new()),
                disposed: AtomicBool::new(false),
                dispatch_enabled: AtomicBool::new(true),
                signals,
                dispatcher: Mutex::new(Some(receiver)),
            }),
        })
    }

    /// Reload persisted jobs and schedule each of them.
    ///
    /// Jobs left `IN_PROGRESS` by a previous process are reset to
    /// `NOT_STARTED` and run again. Jobs this engine is already running are
    /// left alone. Returns the number of jobs scheduled.
    pub async fn load(&self) -> Result<usize, JobQueueError> {
        self.ensure_dispatcher();
        let jobs = {
            let _ticket = self.inner.lock.acquire().await;
            self.inner.store.load().await?;
            self.inner.store.records()
        };

        let mut scheduled = 0;
        for (_, mut job) in jobs {
            if self.inner.in_progress.lock().contains(&job.id) {
                continue;
            }
            match job.state {
                JobState::InProgress => {
                    self.inner.events.warning(format!(
                        "job {} was in progress when the queue last stopped; running it again",
                        job.key
                    ));
                    job.state = JobState::NotStarted;
                }
                JobState::Completed | JobState::Failed => {
                    let _ticket = self.inner.lock.acquire().await;
                    self.inner.store.delete(&job.key).await?;
                    self.inner
                        .events
                        .debug(format!("discarded finished job {}", job.key));
                    continue;
                }
                JobState::NotStarted => {}
            }
            if self.schedule_job(job).await? {
                scheduled += 1;
            }
        }
        self.inner
            .events
            .debug(format!("loaded {scheduled} persisted job(s)"));
        Ok(scheduled)
    }

    pub fn register_job_handler(
        &self,
        method_name: impl Into<String>,
        handler: impl JobHandler + 'static,
    ) -> Result<(), JobQueueError> {
        self.inner.handlers.register(method_name, handler)
    }

    pub fn has_job_handler(&self, method_name: &str) -> bool {
        self.inner.handlers.contains(method_name)
    }

    /// Build a job for `spec` using this engine's clock and id generator.
    pub fn create_job(&self, spec: JobSpec) -> Job {
        let now = self.inner.clock.now_ms();
        let execution_date = spec.execution_date(now);
        Job::new(
            self.inner.ids.next_id(now),
            spec.method_name,
            spec.params,
            execution_date,
            now,
        )
    }

    /// Persist `job` and arrange for it to run.
    ///
    /// Returns `false` once the engine is disposed. A ready job wakes the
    /// dispatcher without waiting for the job to run; a future job gets a
    /// timer that can be cancelled.
    pub async fn schedule_job(&self, job: Job) -> Result<bool, JobQueueError> {
        if self.is_disposed() {
            return Ok(false);
        }
        self.ensure_dispatcher();
        {
            let _ticket = self.inner.lock.acquire().await;
            self.inner.store.set(&job.key, job.clone()).await?;
        }
        if self.is_disposed() {
            return Ok(false);
        }

        let now = self.inner.clock.now_ms();
        if job.is_ready(now) {
            self.start_next_job();
        } else if job.state == JobState::NotStarted {
            self.inner.arm_timer(&job);
        }
        self.inner.events.debug(format!("scheduled job {}", job.key));
        Ok(true)
    }

    /// Ask the dispatcher to fill any free slots. Never waits for execution.
    pub fn start_next_job(&self) {
        self.inner.request(DispatchSignal::Pull);
    }

    /// The not-started, due job with the earliest execution date.
    pub fn oldest_ready_job(&self) -> Option<Job> {
        self.inner.oldest_ready_job()
    }

    /// Snapshot of every job currently held by the queue.
    pub fn get_all_jobs(&self) -> Vec<Job> {
        self.inner
            .store
            .records()
            .into_iter()
            .map(|(_, job)| job)
            .collect()
    }

    pub fn in_progress_count(&self) -> usize {
        self.inner.in_progress.lock().len()
    }

    pub fn has_reached_max_concurrency(&self) -> bool {
        self.inner.has_reached_max_concurrency()
    }

    pub fn max_concurrency(&self) -> usize {
        self.inner.max_concurrency
    }

    /// Drop every pending job for `method_name`. Running jobs are left alone.
    pub async fn remove_jobs_by_method_name(
        &self,
        method_name: &str,
    ) -> Result<usize, JobQueueError> {
        let _ticket = self.inner.lock.acquire().await;
        let running = self.inner.in_progress.lock().clone();
        let victims = self
            .inner
            .store
            .filter(|job| job.method_name == method_name && !running.contains(&job.id));
        for job in &victims {
            self.inner.cancel_timer(&job.id);
            self.inner.store.delete(&job.key).await?;
        }
        if !victims.is_empty() {
            self.inner.events.info(format!(
                "removed {} pending {method_name} job(s)",
                victims.len()
            ));
        }
        Ok(victims.len())
    }

    /// Hold dispatch until [`resume_dispatch`](Self::resume_dispatch).
    /// Jobs can still be scheduled meanwhile.
    pub fn pause_dispatch(&self) {
        self.inner.dispatch_enabled.store(false, Ordering::SeqCst);
    }

    pub fn resume_dispatch(&self) {
        self.inner.dispatch_enabled.store(true, Ordering::SeqCst);
        self.start_next_job();
    }

    /// Resume dispatch once `delay` has elapsed.
    pub fn resume_dispatch_after(&self, delay: Duration) {
        let weak = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                inner.dispatch_enabled.store(true, Ordering::SeqCst);
                inner.request(DispatchSignal::Pull);
            }
        });
    }

    /// Stop accepting and dispatching jobs and cancel pending timers.
    ///
    /// Executions already running are not interrupted. Calling this more
    /// than once is harmless.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        let timers: Vec<JoinHandle<()>> =
            self.inner.timers.lock().drain().map(|(_, t)| t).collect();
        for timer in timers {
            timer.abort();
        }
        let _ = self.inner.signals.send(DispatchSignal::Shutdown);
        self.inner.events.debug("job queue disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.inner.events.subscribe()
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub fn pending_timer_count(&self) -> usize {
        self.inner.timers.lock().len()
    }

    fn ensure_dispatcher(&self) {
        let Some(mut receiver) = self.inner.dispatcher.lock().take() else {
            return;
        };
        let weak: Weak<EngineInner> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            while let Some(signal) = receiver.recv().await {
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                match signal {
                    DispatchSignal::Shutdown => break,
                    DispatchSignal::SlotFreed { job_id } => {
                        inner.events.debug(format!("job {job_id} released its slot"));
                    }
                    DispatchSignal::Pull => {}
                }
                EngineInner::fill_slots(&inner).await;
            }
        });
    }
}

impl EngineInner {
    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    fn request(&self, signal: DispatchSignal) {
        if self.is_disposed() {
            return;
        }
        let _ = self.signals.send(signal);
    }

    fn has_reached_max_concurrency(&self) -> bool {
        self.in_progress.lock().len() >= self.max_concurrency
    }

    fn oldest_ready_job(&self) -> Option<Job> {
        let now = self.clock.now_ms();
        let running = self.in_progress.lock().clone();
        self.store
            .filter(|job| job.is_ready(now) && !running.contains(&job.id))
            .into_iter()
            .min_by_key(|job| job.execution_date)
    }

    /// Start ready jobs until the concurrency cap is hit or none are left.
    async fn fill_slots(inner: &Arc<Self>) {
        loop {
            if inner.is_disposed()
                || !inner.dispatch_enabled.load(Ordering::SeqCst)
                || inner.has_reached_max_concurrency()
            {
                return;
            }

            let ticket = inner.lock.acquire().await;
            if inner.is_disposed() {
                return;
            }
            let Some(mut job) = inner.oldest_ready_job() else {
                return;
            };
            job.mark_in_progress();
            if let Err(err) = inner.store.set(&job.key, job.clone()).await {
                inner
                    .events
                    .job_error(&job, format!("failed to record start of job {}: {err}", job.key));
                drop(ticket);
                Self::retry_dispatch_after(inner, DISPATCH_RETRY_DELAY);
                return;
            }
            inner.in_progress.lock().insert(job.id.clone());
            ticket.release();

            inner.events.info(format!("started job {}", job.key));
            tokio::spawn(Self::run_job(Arc::clone(inner), job));
        }
    }

    fn retry_dispatch_after(inner: &Arc<Self>, delay: Duration) {
        let weak = Arc::downgrade(inner);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                inner.request(DispatchSignal::Pull);
            }
        });
    }

    async fn run_job(inner: Arc<Self>, mut job: Job) {
        // Failures are reported on the event channel inside execute_job.
        let _ = inner.execute_job(&mut job).await;

        {
            let _ticket = inner.lock.acquire().await;
            if let Err(err) = inner.store.delete(&job.key).await {
                inner
                    .events
                    .job_error(&job, format!("failed to remove finished job {}: {err}", job.key));
            }
            inner.in_progress.lock().remove(&job.id);
        }
        inner.cancel_timer(&job.id);
        let _ = inner.signals.send(DispatchSignal::SlotFreed { job_id: job.id });
    }

    /// Run the handler for `job` and record the outcome on it.
    async fn execute_job(&self, job: &mut Job) -> Result<(), JobQueueError> {
        let Some(handler) = self.handlers.get(&job.method_name) else {
            let err = JobQueueError::HandlerNotRegistered(job.method_name.clone());
            job.mark_failed(err.to_string());
            self.events.job_error(job, err.to_string());
            return Err(err);
        };

        let args = job.args();
        let outcome = tokio::spawn(async move { handler.call(args).await }).await;
        match outcome {
            Ok(Ok(())) => {
                job.mark_completed();
                self.events.info(format!("completed job {}", job.key));
            }
            Ok(Err(err)) => {
                job.mark_failed(err.to_string());
                self.events
                    .job_error(job, format!("job {} failed: {err}", job.key));
            }
            Err(join_error) => {
                let reason = if join_error.is_panic() {
                    "handler panicked"
                } else {
                    "handler task was cancelled"
                };
                job.mark_failed(reason);
                self.events
                    .job_error(job, format!("job {} failed: {reason}", job.key));
            }
        }
        Ok(())
    }

    fn arm_timer(self: &Arc<Self>, job: &Job) {
        let weak = Arc::downgrade(self);
        let job_id = job.id.clone();
        let execution_date = job.execution_date;
        let clock = Arc::clone(&self.clock);

        let handle = tokio::spawn(async move {
            loop {
                let remaining = execution_date.saturating_sub(clock.now_ms());
                if remaining <= 0 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(remaining.unsigned_abs())).await;
            }
            if let Some(inner) = weak.upgrade() {
                inner.timers.lock().remove(&job_id);
                inner.request(DispatchSignal::Pull);
            }
        });

        if let Some(previous) = self.timers.lock().insert(job.id.clone(), handle) {
            previous.abort();
        }
    }

    fn cancel_timer(&self, job_id: &str) {
        if let Some(timer) = self.timers.lock().remove(job_id) {
            timer.abort();
        }
    }
}
