//! Job executor module for hookd
//!
//! Drives queued jobs through their lifecycle with concurrency limiting via semaphore.

use crate::adapter::{CancelFlag, TransferStatus};
use crate::config::Config;
use crate::context::{JobAttributes, JobId, JobStatus};
use crate::dispatcher::{DispatchError, Dispatcher, JobOutcome, JobRun, LifecycleState};
use crate::metrics::{JobMetrics, SharedMetrics};
use crate::submit::JobDescriptor;
use crate::ConcurrencyPlan;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Error type for job execution operations
#[derive(Debug, Error)]
pub enum JobError {
    /// No job definition with this name
    #[error("Unknown job definition: {0}")]
    UnknownJob(String),

    /// The lifecycle could not be driven
    #[error("Dispatch failed: {0}")]
    Dispatch(#[from] DispatchError),

    /// The executor semaphore was closed
    #[error("Job executor is closed")]
    ExecutorClosed,
}

/// A job waiting in the queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    pub id: JobId,
    pub descriptor: JobDescriptor,
}

/// Everything resolved from the job definition before the context is created
#[derive(Debug, Clone, PartialEq)]
pub struct JobPlan {
    pub attributes: JobAttributes,
    pub files: Vec<String>,
    pub volumes: u32,
}

/// Destination for transferred file data.
///
/// The archive format itself lives outside hookd; the executor only needs a
/// writer per file.
pub trait ArchiveStore: Send + Sync {
    fn open(&self, job_id: JobId, file: &str) -> io::Result<Box<dyn Write + Send>>;
}

/// Archive that drops all data.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardArchive;

impl ArchiveStore for DiscardArchive {
    fn open(&self, _job_id: JobId, _file: &str) -> io::Result<Box<dyn Write + Send>> {
        Ok(Box::new(io::sink()))
    }
}

/// Cancel flags of queued and running jobs, keyed by job id.
///
/// A job is tracked from submission. Cancelling before it starts is
/// remembered and carried over to the run's own flag when the job begins.
#[derive(Debug, Clone, Default)]
pub struct CancelRegistry {
    flags: Arc<Mutex<HashMap<JobId, CancelFlag>>>,
}

impl CancelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a submitted job.
    pub fn track(&self, id: JobId) {
        self.flags.lock().entry(id).or_default();
    }

    /// Request cancellation. Returns `false` if the job is not queued or running.
    pub fn cancel(&self, id: JobId) -> bool {
        match self.flags.lock().get(&id) {
            Some(flag) => {
                flag.cancel();
                true
            }
            None => false,
        }
    }

    /// Bind a running job's flag, carrying over an earlier cancel request.
    pub fn adopt(&self, id: JobId, run_flag: CancelFlag) {
        let mut flags = self.flags.lock();
        if flags.get(&id).is_some_and(CancelFlag::is_cancelled) {
            run_flag.cancel();
        }
        flags.insert(id, run_flag);
    }

    /// Stop tracking a finished job.
    pub fn release(&self, id: JobId) {
        self.flags.lock().remove(&id);
    }

    pub fn is_tracked(&self, id: JobId) -> bool {
        self.flags.lock().contains_key(&id)
    }
}

/// Job executor that drives jobs through the dispatcher with concurrency limiting
///
/// Uses a tokio Semaphore to limit the number of concurrently running jobs
/// according to the concurrency plan.
pub struct JobExecutor {
    /// Semaphore for limiting concurrent jobs
    semaphore: Arc<Semaphore>,
    /// Concurrency plan with job limits
    concurrency_plan: ConcurrencyPlan,
    /// Shared metrics state
    metrics: SharedMetrics,
    dispatcher: Arc<Dispatcher>,
    config: Arc<Config>,
    archive: Arc<dyn ArchiveStore>,
    cancels: CancelRegistry,
    /// Sequence for default volume names
    volume_seq: AtomicU64,
}

impl JobExecutor {
    /// Create a new JobExecutor that discards transferred data
    ///
    /// # Arguments
    /// * `plan` - Concurrency plan determining max concurrent jobs
    /// * `metrics` - Shared metrics state for updating job progress
    /// * `dispatcher` - Dispatcher firing the lifecycle events
    /// * `config` - Job definitions and defaults
    pub fn new(
        plan: ConcurrencyPlan,
        metrics: SharedMetrics,
        dispatcher: Arc<Dispatcher>,
        config: Arc<Config>,
    ) -> Self {
        let permits = plan.max_concurrent_jobs as usize;
        Self {
            semaphore: Arc::new(Semaphore::new(permits)),
            concurrency_plan: plan,
            metrics,
            dispatcher,
            config,
            archive: Arc::new(DiscardArchive),
            cancels: CancelRegistry::new(),
            volume_seq: AtomicU64::new(0),
        }
    }

    /// Replace the archive store
    pub fn with_archive(mut self, archive: Arc<dyn ArchiveStore>) -> Self {
        self.archive = archive;
        self
    }

    /// Share cancel flags with whoever tracks submissions
    pub fn with_cancels(mut self, cancels: CancelRegistry) -> Self {
        self.cancels = cancels;
        self
    }

    /// Get the number of available permits (slots for concurrent jobs)
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Get the concurrency plan
    pub fn concurrency_plan(&self) -> &ConcurrencyPlan {
        &self.concurrency_plan
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Cancel flags shared with the submitter
    pub fn cancels(&self) -> &CancelRegistry {
        &self.cancels
    }

    /// Acquire a permit for job execution
    ///
    /// This will wait until a permit is available if all slots are in use.
    pub async fn acquire_permit(&self) -> Result<OwnedSemaphorePermit, JobError> {
        self.semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| JobError::ExecutorClosed)
    }

    /// Try to acquire a permit without waiting
    ///
    /// Returns None if no permits are available.
    pub fn try_acquire_permit(&self) -> Option<OwnedSemaphorePermit> {
        self.semaphore.clone().try_acquire_owned().ok()
    }

    /// Resolve a descriptor against the job definitions
    ///
    /// Descriptor values override the definition, which overrides the
    /// `[jobs]` defaults.
    pub fn plan_job(&self, descriptor: &JobDescriptor) -> Result<JobPlan, JobError> {
        let cfg = &self.config;
        let def = cfg
            .job_definition(&descriptor.name)
            .ok_or_else(|| JobError::UnknownJob(descriptor.name.clone()))?;

        let client = descriptor.client.clone().unwrap_or_else(|| def.client.clone());
        let mut attributes = JobAttributes::new(def.name.clone(), client);
        attributes.director = cfg.director_name.clone();
        attributes.level = descriptor.level.unwrap_or(def.level);
        attributes.job_type = def.job_type;
        attributes.pool = def.pool.clone().unwrap_or_else(|| cfg.jobs.default_pool.clone());
        attributes.storage = def
            .storage
            .clone()
            .unwrap_or_else(|| cfg.jobs.default_storage.clone());
        attributes.catalog = cfg.jobs.default_catalog.clone();
        attributes.media_type = cfg.jobs.default_media_type.clone();
        attributes.priority = descriptor
            .priority
            .or(def.priority)
            .unwrap_or(cfg.jobs.default_priority);

        Ok(JobPlan {
            attributes,
            files: def.files.clone(),
            volumes: def.volumes,
        })
    }

    /// Execute a job through its lifecycle
    ///
    /// 1. Acquires a semaphore permit (respecting max_concurrent_jobs)
    /// 2. Creates the job context
    /// 3. Fires JobStart; an abort ends the job here
    /// 4. Fires NewVolume once per configured volume
    /// 5. Transfers every file; the first failure skips the rest
    /// 6. Fires JobEnd and terminates the context
    ///
    /// A job cancelled before it starts runs no hooks at all.
    pub async fn execute(&self, request: JobRequest) -> Result<JobOutcome, JobError> {
        let _permit = self.acquire_permit().await?;
        let JobRequest { id, descriptor } = request;

        let plan = match self.plan_job(&descriptor) {
            Ok(plan) => plan,
            Err(e) => return self.reject(id, &descriptor, e).await,
        };
        let mut run = match self.dispatcher.begin_job(id, plan.attributes.clone()) {
            Ok(run) => run,
            Err(e) => return self.reject(id, &descriptor, e.into()).await,
        };
        self.cancels.adopt(id, run.cancel_flag());
        let snapshot = job_metrics(&run, 0);
        self.update_job_metrics(snapshot).await;

        let driven = self.drive(&mut run, &plan).await;
        self.cancels.release(id);

        let files = driven.as_ref().copied().unwrap_or(0);
        let outcome = self.dispatcher.terminate(run).await;
        self.record_outcome(&outcome, files).await;

        if let Err(e) = driven {
            tracing::error!(job_id = id, error = %e, "Job lifecycle interrupted");
            return Err(e.into());
        }
        Ok(outcome)
    }

    /// Give up on a job whose context could not be created.
    async fn reject(
        &self,
        id: JobId,
        descriptor: &JobDescriptor,
        error: JobError,
    ) -> Result<JobOutcome, JobError> {
        self.cancels.release(id);
        self.increment_failed_jobs().await;
        tracing::error!(job_id = id, job = %descriptor.name, error = %error, "Job could not be created");
        Err(error)
    }

    /// Fire the lifecycle events. Returns the number of files transferred.
    async fn drive(&self, run: &mut JobRun, plan: &JobPlan) -> Result<u32, DispatchError> {
        if run.cancel_flag().is_cancelled() {
            tracing::info!(job_id = run.id(), "Job cancelled before start");
            return Ok(0);
        }
        if !self.dispatcher.job_start(run).await? {
            return Ok(0);
        }
        let snapshot = job_metrics(run, 0);
        self.update_job_metrics(snapshot).await;

        for _ in 0..plan.volumes {
            if run.cancel_flag().is_cancelled() {
                break;
            }
            self.next_volume(run).await?;
        }

        let mut files = 0;
        for file in &plan.files {
            if run.cancel_flag().is_cancelled() {
                break;
            }
            if run.volumes().is_empty() {
                self.next_volume(run).await?;
            }

            let mut sink = match self.archive.open(run.id(), file) {
                Ok(sink) => sink,
                Err(e) => {
                    run.fail(&format!("Cannot open archive for {}: {}", file, e));
                    break;
                }
            };
            let outcome = self.dispatcher.transfer(run, file, sink.as_mut()).await?;
            if let Err(e) = sink.flush() {
                run.fail(&format!("Cannot flush archive for {}: {}", file, e));
                break;
            }
            if !outcome.status.is_success() {
                break;
            }
            if outcome.status == TransferStatus::Completed {
                files += 1;
            }
            let snapshot = job_metrics(run, files);
            self.update_job_metrics(snapshot).await;
        }

        self.dispatcher.job_end(run).await?;
        Ok(files)
    }

    /// Fire NewVolume and mount whatever name results.
    async fn next_volume(&self, run: &mut JobRun) -> Result<(), DispatchError> {
        let name = match self.dispatcher.new_volume(run).await? {
            Some(name) => name,
            None => self.default_volume_name(),
        };
        tracing::debug!(job_id = run.id(), volume = %name, "Mounting volume");
        run.mount_volume(name);
        Ok(())
    }

    /// Next `<prefix>-NNNN` name
    fn default_volume_name(&self) -> String {
        let seq = self.volume_seq.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}-{:04}", self.config.volumes.label_prefix, seq)
    }

    /// Update job metrics in shared state
    async fn update_job_metrics(&self, job_metrics: JobMetrics) {
        let mut metrics = self.metrics.write().await;
        upsert_job(&mut metrics.jobs, job_metrics);
        metrics.running_jobs = count_running(&metrics.jobs);
    }

    /// Record a terminated job and refresh the dispatcher counters
    async fn record_outcome(&self, outcome: &JobOutcome, files: u32) {
        let mut metrics = self.metrics.write().await;
        upsert_job(
            &mut metrics.jobs,
            JobMetrics {
                id: outcome.job_id,
                name: outcome.job_name.clone(),
                client: outcome.client.clone(),
                state: LifecycleState::Terminated.as_str().to_string(),
                status: outcome.status.to_string(),
                volumes: outcome.volumes.len() as u32,
                files_transferred: files,
                bytes_transferred: outcome.bytes,
            },
        );

        match outcome.status {
            JobStatus::Success => metrics.completed_jobs += 1,
            JobStatus::Failed => metrics.failed_jobs += 1,
            JobStatus::AbortedByHook => metrics.aborted_jobs += 1,
            JobStatus::Cancelled => metrics.cancelled_jobs += 1,
            JobStatus::Created | JobStatus::Running => {}
        }
        metrics.total_bytes_transferred += outcome.bytes;
        metrics.running_jobs = count_running(&metrics.jobs);
        metrics.hook_faults = self.dispatcher.hook_faults();
        metrics.hook_timeouts = self.dispatcher.hook_timeouts();
        metrics.report_faults = self.dispatcher.report_faults();
    }

    /// Increment failed jobs counter
    async fn increment_failed_jobs(&self) {
        let mut metrics = self.metrics.write().await;
        metrics.failed_jobs += 1;
    }
}

fn job_metrics(run: &JobRun, files: u32) -> JobMetrics {
    let ctx = run.context();
    JobMetrics {
        id: run.id(),
        name: ctx.attributes().job_name.clone(),
        client: ctx.client().to_string(),
        state: run.state().as_str().to_string(),
        status: ctx.status().to_string(),
        volumes: run.volumes().len() as u32,
        files_transferred: files,
        bytes_transferred: run.bytes_transferred(),
    }
}

fn upsert_job(jobs: &mut Vec<JobMetrics>, job_metrics: JobMetrics) {
    if let Some(existing) = jobs.iter_mut().find(|j| j.id == job_metrics.id) {
        *existing = job_metrics;
    } else {
        jobs.push(job_metrics);
    }
}

fn count_running(jobs: &[JobMetrics]) -> usize {
    jobs.iter()
        .filter(|j| j.state == "started" || j.state == "running")
        .count()
}
