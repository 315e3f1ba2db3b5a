//! hookd
//!
//! Job-hook daemon: dispatches named lifecycle events of backup jobs to
//! registered handlers, with per-job output redirection, a pull-based data
//! source adapter, a bounded job queue and metrics collection.

pub mod adapter;
pub mod concurrency;
pub mod context;
pub mod daemon;
pub mod dispatcher;
pub mod handle;
pub mod job_executor;
pub mod metrics;
pub mod metrics_server;
pub mod redirect;
pub mod registry;
pub mod report;
pub mod scripted;
pub mod startup;
pub mod submit;

#[cfg(test)]
mod testing;

pub use hookd_config as config;
pub use hookd_config::Config;
pub use adapter::{AdapterState, CancelFlag, TransferOutcome, TransferStatus};
pub use concurrency::{derive_plan, ConcurrencyPlan};
pub use context::{
    ContextError, Field, FieldValue, JobAttributes, JobContext, JobId, JobStatus,
    FIELD_TABLE_VERSION,
};
pub use daemon::{Daemon, DaemonError, QueueSubmitter};
pub use dispatcher::{
    DispatchError, Dispatcher, DispatcherSettings, JobOutcome, JobRun, LifecycleState,
};
pub use handle::JobHandle;
pub use job_executor::{ArchiveStore, CancelRegistry, JobError, JobExecutor, JobRequest};
pub use metrics::{new_shared_metrics, JobMetrics, MetricsSnapshot, SharedMetrics};
pub use metrics_server::{create_metrics_router, run_metrics_server, ServerError};
pub use redirect::HandlerOutput;
pub use registry::{DaemonHandler, Event, HookError, HookResult, JobHandler};
pub use report::{FileReportLog, MemoryReportLog, ReportError, ReportSink};
pub use scripted::{ScriptedDaemonHandler, ScriptedJobHandler};
pub use startup::{run_startup_checks, StartupError};
pub use submit::{JobDescriptor, JobSubmitter, SubmitError};
