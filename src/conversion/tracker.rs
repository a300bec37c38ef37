//! Authoritative in-memory record of conversion jobs.
//!
//! The [`JobTracker`] dispatches jobs to the [`Converter`], bounds how many
//! run at once, folds backend progress into each job and publishes every
//! terminal result exactly once (to the waiting [`JobHandle`], the
//! [`JobRecorder`] and the event bus).

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;

use fc_av::{ConvertRequest, Outcome};
use fc_core::config::ConversionConfig;
use fc_core::events::{Event, EventBus, EventPayload};
use fc_core::{ConversionJob, ConversionResult, Error, JobId, JobStatus, ProgressSnapshot, Result};
use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, oneshot, Semaphore};
use tokio_util::sync::CancellationToken;

use super::converter::{BackendEvent, Converter};

const DEFAULT_HISTORY_SIZE: usize = 1000;

// ---------------------------------------------------------------------------
// Persistence seam
// ---------------------------------------------------------------------------

/// Receives every job once it reaches a terminal state.
pub trait JobRecorder: Send + Sync {
    fn record(&self, job: &ConversionJob) -> Result<()>;
}

/// Discards records.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRecorder;

impl JobRecorder for NoopRecorder {
    fn record(&self, _job: &ConversionJob) -> Result<()> {
        Ok(())
    }
}

/// Keeps records in memory, in the order they arrived.
#[derive(Debug, Default)]
pub struct MemoryRecorder {
    records: Mutex<Vec<ConversionJob>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<ConversionJob> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl JobRecorder for MemoryRecorder {
    fn record(&self, job: &ConversionJob) -> Result<()> {
        self.records.lock().push(job.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// JobHandle
// ---------------------------------------------------------------------------

/// Awaitable terminal result of a submitted job.
#[derive(Debug)]
pub struct JobHandle {
    id: JobId,
    input_path: PathBuf,
    output_path: PathBuf,
    rx: oneshot::Receiver<ConversionResult>,
}

impl JobHandle {
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Wait for the job to reach a terminal state.
    pub async fn wait(self) -> ConversionResult {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => ConversionResult::rejected(
                self.input_path,
                self.output_path,
                "job was dropped before it finished",
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// JobTracker
// ---------------------------------------------------------------------------

pub struct JobTracker {
    converter: Arc<Converter>,
    /// Jobs that have been dispatched and are not yet terminal.
    jobs: RwLock<HashMap<JobId, ConversionJob>>,
    cancels: Mutex<HashMap<JobId, CancellationToken>>,
    /// Terminal jobs, newest first.
    history: RwLock<VecDeque<ConversionJob>>,
    history_size: usize,
    max_concurrent: usize,
    permits: Arc<Semaphore>,
    events: Arc<EventBus>,
    recorder: Arc<dyn JobRecorder>,
}

impl std::fmt::Debug for JobTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobTracker")
            .field("converter", &self.converter)
            .field("active", &self.jobs.read().len())
            .field("history", &self.history.read().len())
            .field("max_concurrent", &self.max_concurrent)
            .finish_non_exhaustive()
    }
}

impl JobTracker {
    /// Create a tracker running at most `max_concurrent` conversions at once
    /// (at least one).
    pub fn new(converter: Arc<Converter>, max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            converter,
            jobs: RwLock::new(HashMap::new()),
            cancels: Mutex::new(HashMap::new()),
            history: RwLock::new(VecDeque::new()),
            history_size: DEFAULT_HISTORY_SIZE,
            max_concurrent,
            permits: Arc::new(Semaphore::new(max_concurrent)),
            events: Arc::new(EventBus::default()),
            recorder: Arc::new(NoopRecorder),
        }
    }

    pub fn from_config(converter: Arc<Converter>, config: &ConversionConfig) -> Self {
        Self::new(converter, config.concurrency()).with_history_size(config.history_size)
    }

    pub fn with_recorder(mut self, recorder: Arc<dyn JobRecorder>) -> Self {
        self.recorder = recorder;
        self
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    pub fn with_history_size(mut self, size: usize) -> Self {
        self.history_size = size.max(1);
        self
    }

    pub fn converter(&self) -> &Arc<Converter> {
        &self.converter
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// Dispatch a pending job. It is `processing` when this returns; it may
    /// still wait for a free slot before the backend starts.
    ///
    /// # Errors
    ///
    /// - [`Error::Conflict`] if a job with the same identity was already
    ///   submitted.
    /// - [`Error::InvalidTransition`] if the job is not pending.
    /// - [`Error::Resolution`] if the backend is unusable. The job is then
    ///   recorded as failed.
    pub async fn submit(self: &Arc<Self>, mut job: ConversionJob) -> Result<JobHandle> {
        if self.is_tracked(job.id) {
            return Err(Error::Conflict(format!("job {} was already submitted", job.id)));
        }
        if job.status != JobStatus::Pending {
            return Err(Error::InvalidTransition {
                from: job.status,
                to: JobStatus::Processing,
            });
        }

        if let Err(e) = self.converter.ready().await {
            tracing::warn!(job_id = %job.id, "job failed before dispatch: {e}");
            job.fail(&e.to_string())?;
            self.conclude(job);
            return Err(e);
        }

        job.start()?;
        let id = job.id;
        let token = CancellationToken::new();
        {
            let mut jobs = self.jobs.write();
            if jobs.contains_key(&id) {
                return Err(Error::Conflict(format!("job {id} is already active")));
            }
            jobs.insert(id, job.clone());
            self.cancels.lock().insert(id, token.clone());
        }

        tracing::info!(
            job_id = %id,
            input = %job.input_path.display(),
            output = %job.output_path.display(),
            "job processing"
        );
        self.events.broadcast(EventPayload::ConversionQueued {
            job_id: id,
            input_path: job.input_path.clone(),
        });
        self.events.broadcast(EventPayload::ConversionProgress {
            job_id: id,
            progress: job.progress,
            status: job.status,
        });

        let (tx, rx) = oneshot::channel();
        let tracker = Arc::clone(self);
        let request = ConvertRequest::from(&job);
        tokio::spawn(async move {
            let result = tracker.drive(request, token).await;
            // The handle may have been dropped; the result is still recorded.
            let _ = tx.send(result);
        });

        Ok(JobHandle {
            id,
            input_path: job.input_path,
            output_path: job.output_path,
            rx,
        })
    }

    async fn drive(&self, request: ConvertRequest, cancel: CancellationToken) -> ConversionResult {
        let id = request.job_id;

        let permit = tokio::select! {
            permit = Arc::clone(&self.permits).acquire_owned() => permit.ok(),
            _ = cancel.cancelled() => None,
        };

        let outcome = match permit {
            None if cancel.is_cancelled() => Outcome::Cancelled,
            None => Outcome::failed("job scheduler closed"),
            Some(_permit) => {
                tracing::debug!(job_id = %id, "backend dispatch");
                let mut rx = self.converter.convert(request, cancel);
                let mut finished = None;
                while let Some(event) = rx.recv().await {
                    match event {
                        BackendEvent::Progress(pct) => self.record_progress(id, pct),
                        BackendEvent::Finished(outcome) => {
                            finished = Some(outcome);
                            break;
                        }
                    }
                }
                finished.unwrap_or_else(|| Outcome::failed("backend task ended without a result"))
            }
        };

        self.settle(id, outcome)
    }

    fn record_progress(&self, id: JobId, pct: f32) {
        let update = {
            let mut jobs = self.jobs.write();
            match jobs.get_mut(&id) {
                Some(job) => job.update_progress(pct).then(|| (job.progress, job.status)),
                None => None,
            }
        };
        if let Some((progress, status)) = update {
            tracing::trace!(job_id = %id, progress, "job progress");
            self.events.broadcast(EventPayload::ConversionProgress {
                job_id: id,
                progress,
                status,
            });
        }
    }

    /// Apply the backend outcome and move the job to history.
    fn settle(&self, id: JobId, outcome: Outcome) -> ConversionResult {
        let job = {
            let mut jobs = self.jobs.write();
            let Some(mut job) = jobs.remove(&id) else {
                tracing::error!(job_id = %id, "settled job is not tracked");
                return ConversionResult::rejected(PathBuf::new(), PathBuf::new(), "job is not tracked");
            };
            let applied = match &outcome {
                Outcome::Completed { output_size } => job.complete(*output_size),
                Outcome::Failed { reason } => job.fail(reason),
                Outcome::Cancelled => job.cancel(),
            };
            if let Err(e) = applied {
                tracing::error!(job_id = %id, "cannot apply outcome: {e}");
            }
            // Pushed while `jobs` is still held so lookups never miss the job.
            self.push_history(job.clone());
            job
        };
        self.cancels.lock().remove(&id);
        self.publish_terminal(&job);
        ConversionResult::from_job(&job)
    }

    /// Record a job that became terminal without being dispatched.
    fn conclude(&self, job: ConversionJob) {
        self.push_history(job.clone());
        self.publish_terminal(&job);
    }

    fn push_history(&self, job: ConversionJob) {
        let mut history = self.history.write();
        history.push_front(job);
        while history.len() > self.history_size {
            history.pop_back();
        }
    }

    fn publish_terminal(&self, job: &ConversionJob) {
        tracing::info!(
            job_id = %job.id,
            status = %job.status,
            duration_ms = job.duration_ms(),
            output_size = ?job.output_size,
            error = ?job.error_message,
            "job finished"
        );

        if let Err(e) = self.recorder.record(job) {
            tracing::warn!(job_id = %job.id, "failed to record job: {e}");
        }

        let payload = match job.status {
            JobStatus::Completed => EventPayload::ConversionCompleted {
                job_id: job.id,
                output_size: job.output_size.unwrap_or(0),
            },
            JobStatus::Cancelled => EventPayload::ConversionCancelled { job_id: job.id },
            _ => EventPayload::ConversionFailed {
                job_id: job.id,
                error: job.error_message.clone().unwrap_or_default(),
            },
        };
        self.events.broadcast(payload);
    }

    fn is_tracked(&self, id: JobId) -> bool {
        self.jobs.read().contains_key(&id) || self.history.read().iter().any(|j| j.id == id)
    }

    /// Latest progress and status. Never waits on a running conversion.
    pub fn progress(&self, id: JobId) -> Result<ProgressSnapshot> {
        self.get(id).map(|job| job.snapshot())
    }

    /// Full record of an active or recent job.
    pub fn get(&self, id: JobId) -> Result<ConversionJob> {
        if let Some(job) = self.jobs.read().get(&id) {
            return Ok(job.clone());
        }
        self.history
            .read()
            .iter()
            .find(|j| j.id == id)
            .cloned()
            .ok_or_else(|| Error::not_found("job", id))
    }

    /// Active and recent jobs, newest first.
    pub fn list(&self) -> Vec<ConversionJob> {
        let mut all: Vec<ConversionJob> = self.jobs.read().values().cloned().collect();
        all.extend(self.history.read().iter().cloned());
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all
    }

    /// The `limit` most recent terminal jobs, newest first.
    pub fn history(&self, limit: usize) -> Vec<ConversionJob> {
        self.history.read().iter().take(limit).cloned().collect()
    }

    pub fn active_count(&self) -> usize {
        self.jobs.read().len()
    }

    /// Request cancellation. Returns immediately; the job becomes
    /// `cancelled` once the backend stops. Cancelling a terminal job does
    /// nothing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown job.
    pub fn cancel(&self, id: JobId) -> Result<()> {
        if let Some(token) = self.cancels.lock().get(&id) {
            tracing::info!(job_id = %id, "cancellation requested");
            token.cancel();
            return Ok(());
        }
        if self.history.read().iter().any(|j| j.id == id) {
            tracing::debug!(job_id = %id, "cancel ignored for terminal job");
            return Ok(());
        }
        Err(Error::not_found("job", id))
    }

    /// Submit a fresh pending copy of a failed or cancelled job.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if the job is active or completed and
    /// [`Error::NotFound`] if it is unknown.
    pub async fn retry(self: &Arc<Self>, id: JobId) -> Result<JobHandle> {
        if self.jobs.read().contains_key(&id) {
            return Err(Error::Validation(format!("job {id} is still active")));
        }
        let previous = self
            .history
            .read()
            .iter()
            .find(|j| j.id == id)
            .cloned()
            .ok_or_else(|| Error::not_found("job", id))?;

        match previous.status {
            JobStatus::Failed | JobStatus::Cancelled => {}
            status => {
                return Err(Error::Validation(format!(
                    "only failed or cancelled jobs can be retried; job {id} is {status}"
                )))
            }
        }

        let job = previous.retry();
        tracing::info!(job_id = %job.id, retry_of = %id, "retrying job");
        self.submit(job).await
    }
}
