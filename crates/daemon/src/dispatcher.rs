//! Lifecycle dispatcher
//!
//! Drives one job through `Created → Started → Running → Ended → Terminated`,
//! invoking registered hooks at each point. Every invocation is bounded by the
//! hook timeout and shielded against panics, so handler code can never crash
//! or stall the task driving the job. Faults are written to the job report
//! and counted; they never propagate past this module.

use crate::adapter::{AdapterState, CancelFlag, SourceAdapter, TransferOutcome, TransferStatus};
use crate::config::Config;
use crate::context::{JobAttributes, JobContext, JobId, JobStatus};
use crate::handle::JobHandle;
use crate::redirect::{HandlerOutput, OutputRedirector, RedirectGuard};
use crate::registry::{DaemonHandler, DaemonRegistry, Event, EventRegistry, HookError, JobHandler};
use crate::report::{FaultCounter, ReportSink, ReportWriter};
use crate::submit::JobSubmitter;
use futures::FutureExt;
use parking_lot::Mutex;
use serde::Serialize;
use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::io::Write;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Error type for dispatch operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("Event {event} not allowed in state {state}")]
    OutOfOrder { event: Event, state: LifecycleState },

    #[error("Unknown event: {0}")]
    UnknownEvent(String),

    #[error("Event {0} cannot be fired by name")]
    UnsupportedByName(Event),

    #[error("Data source adapter busy ({0})")]
    AdapterBusy(AdapterState),

    #[error("Job id {0} is already live")]
    DuplicateJobId(JobId),
}

/// Position of a job in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Created,
    Started,
    Running,
    Ended,
    Terminated,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Created => "created",
            LifecycleState::Started => "started",
            LifecycleState::Running => "running",
            LifecycleState::Ended => "ended",
            LifecycleState::Terminated => "terminated",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tunables for hook invocation
#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    /// Upper bound on a single hook invocation
    pub hook_timeout: Duration,
    /// Size of the fixed adapter read buffer
    pub read_buffer_size: usize,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            hook_timeout: Duration::from_secs(30),
            read_buffer_size: 64 * 1024,
        }
    }
}

impl DispatcherSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            hook_timeout: Duration::from_millis(config.hooks.timeout_ms),
            read_buffer_size: config.hooks.read_buffer_size,
        }
    }
}

/// Removes the job id from the live set when the run is dropped.
struct LiveToken {
    id: JobId,
    live: Arc<Mutex<HashSet<JobId>>>,
}

impl Drop for LiveToken {
    fn drop(&mut self) {
        self.live.lock().remove(&self.id);
    }
}

/// One job being driven through its lifecycle.
///
/// Owns everything job-scoped: the context, the handler registry, the
/// adapter state and the output redirect. Only the task executing the job
/// touches it.
pub struct JobRun {
    context: JobContext,
    registry: EventRegistry,
    adapter: SourceAdapter,
    redirector: OutputRedirector,
    redirect: Option<RedirectGuard>,
    state: LifecycleState,
    fired: Vec<Event>,
    volumes: Vec<String>,
    cancel: CancelFlag,
    transferred: u64,
    _live: LiveToken,
}

impl JobRun {
    pub fn id(&self) -> JobId {
        self.context.id()
    }

    pub fn context(&self) -> &JobContext {
        &self.context
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Events fired so far, in order.
    pub fn fired_events(&self) -> &[Event] {
        &self.fired
    }

    /// Volumes mounted so far, in order.
    pub fn volumes(&self) -> &[String] {
        &self.volumes
    }

    pub fn bytes_transferred(&self) -> u64 {
        self.transferred
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn is_redirected(&self) -> bool {
        self.redirector.is_active()
    }

    pub fn adapter_state(&self) -> AdapterState {
        self.adapter.state()
    }

    /// Install a job-level handler directly, returning the one replaced.
    pub fn register(&mut self, handler: Box<dyn JobHandler>) -> Option<Box<dyn JobHandler>> {
        self.registry.register(handler)
    }

    /// Record the volume the daemon actually mounted.
    pub(crate) fn mount_volume(&mut self, name: String) {
        self.context.mount_volume(name.clone());
        self.volumes.push(name);
    }

    /// Mark the job failed for a reason outside any hook.
    pub(crate) fn fail(&mut self, reason: &str) {
        if !self.context.status().is_terminal() {
            self.context.set_status(JobStatus::Failed);
        }
        self.context.append_report(reason);
    }
}

impl fmt::Debug for JobRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobRun")
            .field("id", &self.context.id())
            .field("state", &self.state)
            .field("status", &self.context.status())
            .field("fired", &self.fired)
            .field("registry", &self.registry)
            .field("adapter", &self.adapter.state())
            .finish()
    }
}

/// Final record of a terminated job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobOutcome {
    pub job_id: JobId,
    pub job_name: String,
    pub client: String,
    pub status: JobStatus,
    pub bytes: u64,
    pub volumes: Vec<String>,
    pub events: Vec<Event>,
}

/// Result of running a lifecycle hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HookOutcome {
    NotHandled,
    Returned(i32),
    Faulted,
}

impl HookOutcome {
    /// Continue/abort signal; a missing hook counts as continue.
    fn code(self) -> i32 {
        match self {
            HookOutcome::NotHandled => 1,
            HookOutcome::Returned(code) => code,
            HookOutcome::Faulted => -1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LifecycleHook {
    Start,
    NewVolume,
    End,
}

impl LifecycleHook {
    fn event(self) -> Event {
        match self {
            LifecycleHook::Start => Event::JobStart,
            LifecycleHook::NewVolume => Event::NewVolume,
            LifecycleHook::End => Event::JobEnd,
        }
    }
}

#[derive(Debug, Error)]
enum InvocationError {
    #[error("{0}")]
    Returned(HookError),

    #[error("panicked: {0}")]
    Panicked(String),

    #[error("timed out after {0:?}")]
    TimedOut(Duration),
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Run one hook future under the time limit, catching panics.
///
/// A hook that blocks its thread cannot be preempted; if it only returns
/// after `limit` has passed, its result is discarded as a timeout.
async fn guarded<T, F>(limit: Duration, hook: F) -> Result<T, InvocationError>
where
    F: Future<Output = Result<T, HookError>>,
{
    let started = Instant::now();
    match tokio::time::timeout(limit, AssertUnwindSafe(hook).catch_unwind()).await {
        Ok(_) if started.elapsed() > limit => Err(InvocationError::TimedOut(limit)),
        Ok(Ok(Ok(value))) => Ok(value),
        Ok(Ok(Err(e))) => Err(InvocationError::Returned(e)),
        Ok(Err(payload)) => Err(InvocationError::Panicked(panic_message(payload))),
        Err(_) => Err(InvocationError::TimedOut(limit)),
    }
}

fn expect_state(
    run: &JobRun,
    event: Event,
    allowed: &[LifecycleState],
) -> Result<(), DispatchError> {
    if allowed.contains(&run.state) {
        Ok(())
    } else {
        Err(DispatchError::OutOfOrder {
            event,
            state: run.state,
        })
    }
}

#[derive(Debug, Default)]
struct DispatchStats {
    hook_faults: AtomicU64,
    hook_timeouts: AtomicU64,
}

/// Daemon-resident driver of hook invocations.
pub struct Dispatcher {
    settings: DispatcherSettings,
    daemon_events: DaemonRegistry,
    reports: Arc<dyn ReportSink>,
    report_faults: FaultCounter,
    submitter: Arc<dyn JobSubmitter>,
    live: Arc<Mutex<HashSet<JobId>>>,
    stats: DispatchStats,
}

impl Dispatcher {
    pub fn new(
        settings: DispatcherSettings,
        reports: Arc<dyn ReportSink>,
        submitter: Arc<dyn JobSubmitter>,
    ) -> Self {
        Self {
            settings,
            daemon_events: DaemonRegistry::new(),
            reports,
            report_faults: FaultCounter::new(),
            submitter,
            live: Arc::new(Mutex::new(HashSet::new())),
            stats: DispatchStats::default(),
        }
    }

    pub fn settings(&self) -> &DispatcherSettings {
        &self.settings
    }

    /// Bind the daemon-wide handler, replacing any previous one.
    pub fn set_daemon_events(&self, handler: Arc<dyn DaemonHandler>) {
        if self.daemon_events.set_events(handler).is_some() {
            tracing::info!("Replaced daemon event handler");
        }
    }

    pub fn daemon_events(&self) -> &DaemonRegistry {
        &self.daemon_events
    }

    pub fn hook_faults(&self) -> u64 {
        self.stats.hook_faults.load(Ordering::Relaxed)
    }

    pub fn hook_timeouts(&self) -> u64 {
        self.stats.hook_timeouts.load(Ordering::Relaxed)
    }

    /// Report appends that could not be persisted.
    pub fn report_faults(&self) -> u64 {
        self.report_faults.get()
    }

    /// Number of job contexts currently live.
    pub fn live_jobs(&self) -> usize {
        self.live.lock().len()
    }

    /// Create the context for a new job.
    pub fn begin_job(&self, id: JobId, attributes: JobAttributes) -> Result<JobRun, DispatchError> {
        if !self.live.lock().insert(id) {
            return Err(DispatchError::DuplicateJobId(id));
        }
        let token = LiveToken {
            id,
            live: self.live.clone(),
        };

        let report = ReportWriter::new(id, self.reports.clone(), self.report_faults.clone());
        let redirector = OutputRedirector::new(report.clone());
        let context = JobContext::new(id, attributes, report);
        tracing::debug!(job_id = id, job = %context.unique_name(), "Job context created");

        Ok(JobRun {
            context,
            registry: EventRegistry::new(),
            adapter: SourceAdapter::new(),
            redirector,
            redirect: None,
            state: LifecycleState::Created,
            fired: Vec::new(),
            volumes: Vec::new(),
            cancel: CancelFlag::new(),
            transferred: 0,
            _live: token,
        })
    }

    /// Fire `JobStart`. Returns `false` when the hook aborted the job.
    pub async fn job_start(&self, run: &mut JobRun) -> Result<bool, DispatchError> {
        expect_state(run, Event::JobStart, &[LifecycleState::Created])?;
        run.redirect = Some(run.redirector.acquire());
        run.fired.push(Event::JobStart);

        let outcome = self.invoke_lifecycle(run, LifecycleHook::Start).await;
        let code = outcome.code();
        if code > 0 {
            run.state = LifecycleState::Started;
            run.context.set_status(JobStatus::Running);
            tracing::info!(job_id = run.id(), client = run.context.client(), "Job started");
            return Ok(true);
        }

        run.context.set_status(JobStatus::AbortedByHook);
        run.context
            .append_report(&format!("JobStart hook aborted the job (code {})", code));
        run.state = LifecycleState::Terminated;
        run.redirect = None;
        tracing::warn!(job_id = run.id(), code, "Job aborted by JobStart hook");
        Ok(false)
    }

    /// Fire `NewVolume`. Returns the volume name the hook chose, if any.
    pub async fn new_volume(&self, run: &mut JobRun) -> Result<Option<String>, DispatchError> {
        expect_state(
            run,
            Event::NewVolume,
            &[LifecycleState::Started, LifecycleState::Running],
        )?;
        run.state = LifecycleState::Running;
        run.fired.push(Event::NewVolume);
        run.context.clear_volume_name();

        let outcome = self.invoke_lifecycle(run, LifecycleHook::NewVolume).await;
        if outcome.code() <= 0 {
            run.context.clear_volume_name();
            return Ok(None);
        }
        Ok(run.context.volume_name().map(str::to_string))
    }

    /// Fire `DataTransfer` for `file`, streaming the handler's data into `sink`.
    ///
    /// Drives `open`, then `read` until end of stream or error, then exactly
    /// one `close` whenever `open` was attempted. Cancellation is checked
    /// before every read.
    pub async fn transfer(
        &self,
        run: &mut JobRun,
        file: &str,
        sink: &mut (dyn Write + Send),
    ) -> Result<TransferOutcome, DispatchError> {
        expect_state(
            run,
            Event::DataTransfer,
            &[LifecycleState::Started, LifecycleState::Running],
        )?;
        run.state = LifecycleState::Running;
        run.fired.push(Event::DataTransfer);

        let outcome = |status, bytes| TransferOutcome {
            file: file.to_string(),
            status,
            bytes,
        };

        let Some(handler) = run.registry.lookup(Event::DataTransfer) else {
            tracing::debug!(job_id = run.context.id(), file, "No data source registered");
            return Ok(outcome(TransferStatus::NotHandled, 0));
        };
        if run.cancel.is_cancelled() {
            run.context.set_status(JobStatus::Cancelled);
            return Ok(outcome(TransferStatus::Cancelled, 0));
        }
        run.adapter.begin(file).map_err(DispatchError::AdapterBusy)?;
        run.context.set_event(Some(Event::DataTransfer));

        let limit = self.settings.hook_timeout;
        let mut handle = JobHandle::new(
            &mut run.context,
            self.submitter.as_ref(),
            run.redirector.output(),
        );
        let mut bytes = 0u64;

        let status = match guarded(limit, handler.open(&mut handle, file)).await {
            Err(error) => self.transfer_fault(
                &handle,
                file,
                "open",
                &error,
                TransferStatus::SourceOpenFailed,
            ),
            Ok(()) => {
                run.adapter.mark_reading();
                self.read_loop(handler, &mut handle, file, sink, &run.cancel, &mut bytes)
                    .await
            }
        };

        if let Err(error) = guarded(limit, handler.close(&mut handle)).await {
            self.close_fault(&handle, file, &error);
        }
        run.adapter.mark_closed();
        run.adapter.reset();

        if let Some(pending) = handle.finish() {
            run.registry.register(pending);
        }
        run.context.set_event(None);
        run.transferred += bytes;

        match status {
            TransferStatus::Completed => {}
            TransferStatus::Cancelled => run.context.set_status(JobStatus::Cancelled),
            _ => {
                if !run.context.status().is_terminal() {
                    run.context.set_status(JobStatus::Failed);
                }
            }
        }
        tracing::info!(job_id = run.context.id(), file, bytes, status = %status, "Transfer finished");
        Ok(outcome(status, bytes))
    }

    async fn read_loop(
        &self,
        handler: &mut dyn JobHandler,
        handle: &mut JobHandle<'_>,
        file: &str,
        sink: &mut (dyn Write + Send),
        cancel: &CancelFlag,
        bytes: &mut u64,
    ) -> TransferStatus {
        let mut buf = vec![0u8; self.settings.read_buffer_size];
        loop {
            if cancel.is_cancelled() {
                handle
                    .context()
                    .append_report(&format!("Transfer of {} cancelled", file));
                return TransferStatus::Cancelled;
            }

            let n = match guarded(self.settings.hook_timeout, handler.read(handle, &mut buf)).await {
                Ok(n) => n,
                Err(error) => {
                    return self.transfer_fault(
                        handle,
                        file,
                        "read",
                        &error,
                        TransferStatus::SourceReadFailed,
                    )
                }
            };
            if n == 0 {
                return TransferStatus::Completed;
            }

            let len = match usize::try_from(n) {
                Ok(len) if len <= buf.len() => len,
                _ => {
                    handle
                        .context()
                        .append_report(&format!("Read of {} failed (returned {})", file, n));
                    return TransferStatus::SourceReadFailed;
                }
            };
            if let Err(e) = sink.write_all(&buf[..len]) {
                handle
                    .context()
                    .append_report(&format!("Archive write for {} failed: {}", file, e));
                tracing::error!(job_id = handle.job_id(), file, error = %e, "Archive sink failed");
                return TransferStatus::SinkFailed;
            }
            *bytes += len as u64;
        }
    }

    /// Fire `JobEnd`. The return code is informational only.
    pub async fn job_end(&self, run: &mut JobRun) -> Result<i32, DispatchError> {
        expect_state(
            run,
            Event::JobEnd,
            &[LifecycleState::Started, LifecycleState::Running],
        )?;
        run.fired.push(Event::JobEnd);

        let code = self.invoke_lifecycle(run, LifecycleHook::End).await.code();
        tracing::info!(job_id = run.id(), code, "JobEnd hook returned");

        run.state = LifecycleState::Ended;
        run.redirect = None;
        Ok(code)
    }

    /// Finalize the job and invalidate its context.
    ///
    /// Any adapter left open (a transfer abandoned mid-read) is closed first.
    pub async fn terminate(&self, mut run: JobRun) -> JobOutcome {
        if run.adapter.needs_close() {
            if let Some(handler) = run.registry.lookup(Event::DataTransfer) {
                let mut handle = JobHandle::new(
                    &mut run.context,
                    self.submitter.as_ref(),
                    run.redirector.output(),
                );
                let file = run.adapter.current().unwrap_or_default().to_string();
                if let Err(error) = guarded(self.settings.hook_timeout, handler.close(&mut handle)).await {
                    self.close_fault(&handle, &file, &error);
                }
            }
            run.adapter.mark_closed();
            run.adapter.reset();
        }

        let status = match run.context.status() {
            status if status.is_terminal() => status,
            _ if run.cancel.is_cancelled() => JobStatus::Cancelled,
            _ if run.state == LifecycleState::Ended => JobStatus::Success,
            _ => JobStatus::Failed,
        };
        run.context.set_status(status);
        run.context.set_event(None);
        run.state = LifecycleState::Terminated;
        run.redirect = None;
        run.registry.unregister();

        tracing::info!(job_id = run.id(), status = %status, bytes = run.transferred, "Job terminated");

        JobOutcome {
            job_id: run.context.id(),
            job_name: run.context.attributes().job_name.clone(),
            client: run.context.client().to_string(),
            status,
            bytes: run.transferred,
            volumes: std::mem::take(&mut run.volumes),
            events: std::mem::take(&mut run.fired),
        }
    }

    /// Fire a job event by name. Returns the hook's code, or `-1` on error.
    ///
    /// `DataTransfer` needs a file and a sink and must go through
    /// [`Dispatcher::transfer`].
    pub async fn fire_event(&self, run: &mut JobRun, name: &str) -> i32 {
        let result = match Event::from_name(name) {
            Some(Event::JobStart) => self.job_start(run).await.map(i32::from),
            Some(Event::NewVolume) => self
                .new_volume(run)
                .await
                .map(|name| i32::from(name.is_some())),
            Some(Event::JobEnd) => self.job_end(run).await,
            Some(event) => Err(DispatchError::UnsupportedByName(event)),
            None => Err(DispatchError::UnknownEvent(name.to_string())),
        };
        result.unwrap_or_else(|e| {
            tracing::warn!(job_id = run.id(), event = name, error = %e, "Event not dispatched");
            -1
        })
    }

    /// Fire a daemon-wide event. Returns `1` when handled, `0` when no
    /// handler is bound and `-1` on error.
    pub async fn fire_daemon_event(&self, name: &str) -> i32 {
        match Event::from_name(name) {
            Some(Event::Exit) => self.exit().await,
            Some(event) => {
                tracing::warn!(event = %event, "Event requires a job context");
                -1
            }
            None => {
                tracing::warn!(event = name, "Unknown daemon event");
                -1
            }
        }
    }

    async fn exit(&self) -> i32 {
        let Some(handler) = self.daemon_events.lookup(Event::Exit) else {
            self.daemon_events.teardown();
            return 0;
        };

        let mut out = HandlerOutput::daemon();
        let result = guarded(self.settings.hook_timeout, handler.exit(&mut out)).await;
        out.flush_pending();
        self.daemon_events.teardown();

        match result {
            Ok(()) => 1,
            Err(error) => {
                self.count_fault(&error);
                tracing::error!(hook = "Exit", error = %error, "Hook fault");
                -1
            }
        }
    }

    /// Run a lifecycle hook: the job handler if it implements the event,
    /// otherwise the daemon handler.
    async fn invoke_lifecycle(&self, run: &mut JobRun, hook: LifecycleHook) -> HookOutcome {
        let event = hook.event();
        let limit = self.settings.hook_timeout;
        let daemon_handler = if run.registry.implements(event) || hook == LifecycleHook::NewVolume {
            None
        } else {
            self.daemon_events.lookup(event)
        };

        run.context.set_event(Some(event));
        let mut handle = JobHandle::new(
            &mut run.context,
            self.submitter.as_ref(),
            run.redirector.output(),
        );

        let result = if let Some(handler) = run.registry.lookup(event) {
            Some(match hook {
                LifecycleHook::Start => guarded(limit, handler.job_start(&mut handle)).await,
                LifecycleHook::NewVolume => guarded(limit, handler.new_volume(&mut handle)).await,
                LifecycleHook::End => guarded(limit, handler.job_end(&mut handle)).await,
            })
        } else if let Some(handler) = daemon_handler {
            match hook {
                LifecycleHook::Start => Some(guarded(limit, handler.job_start(&mut handle)).await),
                LifecycleHook::End => Some(guarded(limit, handler.job_end(&mut handle)).await),
                LifecycleHook::NewVolume => None,
            }
        } else {
            None
        };

        let outcome = match result {
            None => HookOutcome::NotHandled,
            Some(Ok(code)) => HookOutcome::Returned(code),
            Some(Err(error)) => {
                self.record_fault(handle.context(), event, &error);
                HookOutcome::Faulted
            }
        };

        let pending = handle.finish();
        if outcome != HookOutcome::Faulted {
            if let Some(handler) = pending {
                run.registry.register(handler);
            }
        }
        run.context.set_event(None);
        outcome
    }

    fn count_fault(&self, error: &InvocationError) {
        let counter = match error {
            InvocationError::TimedOut(_) => &self.stats.hook_timeouts,
            _ => &self.stats.hook_faults,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn record_fault(&self, context: &JobContext, event: Event, error: &InvocationError) {
        self.count_fault(error);
        context.append_report(&format!("{} hook fault: {}", event, error));
        tracing::error!(job_id = context.id(), hook = %event, error = %error, "Hook fault");
    }

    fn transfer_fault(
        &self,
        handle: &JobHandle<'_>,
        file: &str,
        op: &str,
        error: &InvocationError,
        returned: TransferStatus,
    ) -> TransferStatus {
        let context = handle.context();
        match error {
            InvocationError::Returned(e) => {
                context.append_report(&format!("Source {} for {} failed: {}", op, file, e));
                tracing::warn!(job_id = context.id(), file, op, error = %e, "Data source error");
                returned
            }
            InvocationError::Panicked(_) => {
                self.record_fault(context, Event::DataTransfer, error);
                TransferStatus::HookFault
            }
            InvocationError::TimedOut(_) => {
                self.record_fault(context, Event::DataTransfer, error);
                TransferStatus::HookTimeout
            }
        }
    }

    fn close_fault(&self, handle: &JobHandle<'_>, file: &str, error: &InvocationError) {
        if !matches!(error, InvocationError::Returned(_)) {
            self.count_fault(error);
        }
        tracing::warn!(job_id = handle.job_id(), file, error = %error, "Data source close failed");
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("settings", &self.settings)
            .field("daemon_events", &self.daemon_events)
            .field("live_jobs", &self.live_jobs())
            .finish()
    }
}
