//! Daemon startup and main loop for hookd
//!
//! Provides the daemon entry point, startup sequence, job queue and main
//! processing loop.

use crate::concurrency::{derive_plan, ConcurrencyPlan};
use crate::config::{Config, ConfigError};
use crate::context::JobId;
use crate::dispatcher::{Dispatcher, DispatcherSettings, JobOutcome};
use crate::job_executor::{ArchiveStore, CancelRegistry, DiscardArchive, JobExecutor, JobRequest};
use crate::metrics::{new_shared_metrics, now_unix_ms, SharedMetrics};
use crate::metrics_server::run_metrics_server;
use crate::registry::DaemonHandler;
use crate::report::{FileReportLog, MemoryReportLog, ReportError, ReportSink};
use crate::startup::{run_startup_checks, StartupError};
use crate::submit::{JobDescriptor, JobIdAllocator, JobSubmitter, SubmitError};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::{watch, RwLock};
use tokio::task::{JoinError, JoinSet};

/// Error type for daemon operations
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Startup check failed
    #[error("Startup check failed: {0}")]
    Startup(#[from] StartupError),

    /// Report log could not be opened
    #[error("Report log error: {0}")]
    Report(#[from] ReportError),

    /// Server error
    #[error("Server error: {0}")]
    Server(String),
}

/// Submitter backed by the daemon's bounded job queue.
///
/// Never blocks: a full queue is reported to the caller instead.
#[derive(Debug)]
pub struct QueueSubmitter {
    ids: JobIdAllocator,
    tx: mpsc::Sender<JobRequest>,
    known_jobs: HashSet<String>,
    cancels: CancelRegistry,
}

impl QueueSubmitter {
    pub fn new(tx: mpsc::Sender<JobRequest>, config: &Config, cancels: CancelRegistry) -> Self {
        Self {
            ids: JobIdAllocator::default(),
            tx,
            known_jobs: config.job_definitions.iter().map(|d| d.name.clone()).collect(),
            cancels,
        }
    }

    /// Jobs waiting in the queue
    pub fn queue_len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }
}

impl JobSubmitter for QueueSubmitter {
    fn submit(&self, descriptor: JobDescriptor) -> Result<JobId, SubmitError> {
        if !self.known_jobs.contains(&descriptor.name) {
            return Err(SubmitError::UnknownJob(descriptor.name));
        }

        let permit = self.tx.try_reserve().map_err(|e| match e {
            TrySendError::Full(()) => SubmitError::QueueFull,
            TrySendError::Closed(()) => SubmitError::Closed,
        })?;
        let id = self.ids.allocate();
        self.cancels.track(id);
        tracing::info!(job_id = id, job = %descriptor.name, "Job queued");
        permit.send(JobRequest { id, descriptor });
        Ok(id)
    }
}

/// Where job reports are kept
#[derive(Debug, Clone)]
enum ReportStore {
    /// In memory until taken; used when no report directory is configured
    Memory(Arc<MemoryReportLog>),
    /// One file per job under the report directory
    Files(Arc<FileReportLog>),
}

impl ReportStore {
    fn open(config: &Config) -> Result<Self, ReportError> {
        Ok(match &config.report.dir {
            Some(dir) => ReportStore::Files(Arc::new(FileReportLog::new(dir)?)),
            None => ReportStore::Memory(Arc::new(MemoryReportLog::new())),
        })
    }

    fn sink(&self) -> Arc<dyn ReportSink> {
        match self {
            ReportStore::Memory(log) => log.clone(),
            ReportStore::Files(log) => log.clone(),
        }
    }
}

/// Daemon state containing all runtime components
pub struct Daemon {
    /// Configuration loaded from file and environment
    pub config: Arc<Config>,
    /// Derived concurrency plan
    pub concurrency_plan: ConcurrencyPlan,
    /// Shared metrics state
    pub metrics: SharedMetrics,
    /// Job executor driving each job's lifecycle
    pub executor: Arc<JobExecutor>,
    submitter: Arc<QueueSubmitter>,
    reports: ReportStore,
    /// Job queue receiver (wrapped for async access)
    job_rx: Arc<RwLock<mpsc::Receiver<JobRequest>>>,
    /// Set once to make `run` return
    stop: watch::Sender<bool>,
}

impl Daemon {
    /// Initialize the daemon with configuration from file
    ///
    /// This performs the full startup sequence:
    /// 1. Load config from file
    /// 2. Apply environment overrides
    /// 3. Run startup checks
    /// 4. Derive concurrency plan
    /// 5. Initialize shared metrics, report log and job queue
    pub async fn new<P: AsRef<Path>>(config_path: P) -> Result<Self, DaemonError> {
        let config = Config::load(config_path)?;
        Self::with_config(config)
    }

    /// Initialize the daemon with an existing configuration
    ///
    /// Useful for testing or when configuration is already loaded.
    pub fn with_config(config: Config) -> Result<Self, DaemonError> {
        run_startup_checks(&config)?;
        Self::new_without_checks(config)
    }

    /// Initialize the daemon without running startup checks
    pub fn new_without_checks(config: Config) -> Result<Self, DaemonError> {
        Self::assemble(config, Arc::new(DiscardArchive))
    }

    /// Wire up all components around `archive`
    pub fn assemble(config: Config, archive: Arc<dyn ArchiveStore>) -> Result<Self, DaemonError> {
        let config = Arc::new(config);
        let concurrency_plan = derive_plan(&config);
        let metrics = new_shared_metrics();

        let reports = ReportStore::open(&config)?;

        let (job_tx, job_rx) = mpsc::channel(concurrency_plan.queue_capacity);
        let cancels = CancelRegistry::new();
        let submitter = Arc::new(QueueSubmitter::new(job_tx, &config, cancels.clone()));

        let dispatcher = Arc::new(Dispatcher::new(
            DispatcherSettings::from_config(&config),
            reports.sink(),
            submitter.clone(),
        ));

        let executor = Arc::new(
            JobExecutor::new(
                concurrency_plan.clone(),
                metrics.clone(),
                dispatcher,
                config.clone(),
            )
            .with_archive(archive)
            .with_cancels(cancels),
        );

        tracing::info!(
            max_concurrent_jobs = concurrency_plan.max_concurrent_jobs,
            queue_capacity = concurrency_plan.queue_capacity,
            jobs = config.job_definitions.len(),
            "Daemon initialized"
        );

        Ok(Self {
            config,
            concurrency_plan,
            metrics,
            executor,
            submitter,
            reports,
            job_rx: Arc::new(RwLock::new(job_rx)),
            stop: watch::channel(false).0,
        })
    }

    /// Bind the daemon-wide event handler
    pub fn set_daemon_events(&self, handler: Arc<dyn DaemonHandler>) {
        self.executor.dispatcher().set_daemon_events(handler);
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        self.executor.dispatcher()
    }

    /// Submit a job to the queue
    pub fn submit(&self, descriptor: JobDescriptor) -> Result<JobId, SubmitError> {
        self.submitter.submit(descriptor)
    }

    /// Submit a job definition by name with no overrides
    pub fn submit_named(&self, name: &str) -> Result<JobId, SubmitError> {
        self.submit(JobDescriptor::named(name))
    }

    /// Cancel a queued or running job. Returns `false` for unknown ids.
    pub fn cancel(&self, job_id: JobId) -> bool {
        let found = self.executor.cancels().cancel(job_id);
        if found {
            tracing::info!(job_id, "Job cancel requested");
        }
        found
    }

    /// The report of a job, if one was written
    ///
    /// In-memory reports stay available until taken or until [`Daemon::run`]
    /// logs them; file reports are read back from the report directory.
    pub fn report_for(&self, job_id: JobId) -> Option<String> {
        match &self.reports {
            ReportStore::Memory(log) => Some(log.report_for(job_id)).filter(|r| !r.is_empty()),
            ReportStore::Files(log) => std::fs::read_to_string(log.path_for(job_id)).ok(),
        }
    }

    /// Like [`Daemon::report_for`], but releases an in-memory report
    pub fn take_report(&self, job_id: JobId) -> Option<String> {
        match &self.reports {
            ReportStore::Memory(log) => Some(log.take_report(job_id)).filter(|r| !r.is_empty()),
            ReportStore::Files(_) => self.report_for(job_id),
        }
    }

    /// Get the shared metrics
    pub fn metrics(&self) -> SharedMetrics {
        self.metrics.clone()
    }

    /// Start the metrics HTTP server
    ///
    /// Spawns the HTTP server as a background task.
    pub fn start_metrics_server(&self, addr: SocketAddr) -> tokio::task::JoinHandle<()> {
        let metrics = self.metrics.clone();
        tokio::spawn(async move {
            if let Err(e) = run_metrics_server(metrics, addr).await {
                tracing::error!(%addr, error = %e, "Metrics server error");
            }
        })
    }

    /// Start the metrics update task
    ///
    /// Periodically refreshes queue length and fault counters in the shared state.
    pub fn start_metrics_updater(&self) -> tokio::task::JoinHandle<()> {
        let metrics = self.metrics.clone();
        let submitter = self.submitter.clone();
        let dispatcher = self.dispatcher().clone();
        tokio::spawn(async move {
            loop {
                {
                    let mut snapshot = metrics.write().await;
                    snapshot.timestamp_unix_ms = now_unix_ms();
                    snapshot.queue_len = submitter.queue_len();
                    snapshot.hook_faults = dispatcher.hook_faults();
                    snapshot.hook_timeouts = dispatcher.hook_timeouts();
                    snapshot.report_faults = dispatcher.report_faults();
                }
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
        })
    }

    fn spawn_job(&self, tasks: &mut JoinSet<Option<JobOutcome>>, request: JobRequest) {
        let executor = self.executor.clone();
        tasks.spawn(async move {
            let id = request.id;
            match executor.execute(request).await {
                Ok(outcome) => Some(outcome),
                Err(e) => {
                    tracing::error!(job_id = id, error = %e, "Job execution failed");
                    None
                }
            }
        });
    }

    /// Log a job finished by the main loop and release its in-memory report
    fn finish_job(&self, joined: Result<Option<JobOutcome>, JoinError>) {
        match joined {
            Ok(Some(outcome)) => {
                if let ReportStore::Memory(log) = &self.reports {
                    for line in log.take_report(outcome.job_id).lines() {
                        tracing::info!(target: "hookd::job_report", job_id = outcome.job_id, "{}", line);
                    }
                }
            }
            Ok(None) => {}
            Err(e) => tracing::error!(error = %e, "Job task aborted"),
        }
    }

    /// Ask [`Daemon::run`] to return
    pub fn stop(&self) {
        self.stop.send_replace(true);
    }

    /// Run the daemon main loop
    ///
    /// Spawns every queued job on its own task. Returns after [`Daemon::stop`]
    /// once the running jobs have finished; jobs still queued stay queued.
    pub async fn run(&self) -> Result<(), DaemonError> {
        let mut stop = self.stop.subscribe();
        let mut tasks = JoinSet::new();
        loop {
            if *stop.borrow_and_update() {
                break;
            }
            let request = {
                let mut rx = self.job_rx.write().await;
                tokio::select! {
                    request = rx.recv() => request,
                    _ = stop.changed() => continue,
                    Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                        self.finish_job(joined);
                        continue;
                    }
                }
            };

            match request {
                Some(request) => self.spawn_job(&mut tasks, request),
                // Channel closed, exit loop
                None => break,
            }
        }

        tracing::info!(running = tasks.len(), "Main loop stopping");
        while let Some(joined) = tasks.join_next().await {
            self.finish_job(joined);
        }
        Ok(())
    }

    /// Run queued jobs until none are queued or running
    ///
    /// Jobs submitted by hooks while draining are run too. Outcomes are
    /// returned in job id order; jobs that could not be created are logged
    /// and left out. Reports stay available through [`Daemon::take_report`].
    pub async fn run_until_idle(&self) -> Vec<JobOutcome> {
        let mut rx = self.job_rx.write().await;
        let mut tasks = JoinSet::new();
        let mut outcomes = Vec::new();

        loop {
            while let Ok(request) = rx.try_recv() {
                self.spawn_job(&mut tasks, request);
            }
            match tasks.join_next().await {
                Some(Ok(Some(outcome))) => outcomes.push(outcome),
                Some(Ok(None)) => {}
                Some(Err(e)) => tracing::error!(error = %e, "Job task aborted"),
                None => break,
            }
        }

        outcomes.sort_by_key(|o| o.job_id);
        outcomes
    }

    /// Run the daemon with all background tasks
    ///
    /// Starts the metrics server, metrics updater, and main processing loop.
    pub async fn run_with_server(&self, addr: SocketAddr) -> Result<(), DaemonError> {
        let _server_handle = self.start_metrics_server(addr);
        let _updater_handle = self.start_metrics_updater();
        self.run().await
    }

    /// Fire the daemon-wide `Exit` event and drop the daemon handler
    pub async fn shutdown(&self) -> i32 {
        let code = self.dispatcher().fire_daemon_event("Exit").await;
        tracing::info!(code, "Daemon shut down");
        code
    }
}
