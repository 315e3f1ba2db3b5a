//! Shared fixtures for unit tests

use crate::context::{JobAttributes, JobId};
use crate::dispatcher::{Dispatcher, DispatcherSettings};
use crate::handle::JobHandle;
use crate::registry::{Event, HookError, HookResult, JobHandler};
use crate::report::MemoryReportLog;
use crate::submit::{JobDescriptor, JobIdAllocator, JobSubmitter, SubmitError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// Submitter that records every descriptor instead of queueing it.
#[derive(Debug)]
pub struct RecordingSubmitter {
    ids: JobIdAllocator,
    submitted: Mutex<Vec<JobDescriptor>>,
}

impl RecordingSubmitter {
    pub fn starting_at(first: JobId) -> Self {
        Self {
            ids: JobIdAllocator::starting_at(first),
            submitted: Mutex::new(Vec::new()),
        }
    }

    pub fn submitted(&self) -> Vec<JobDescriptor> {
        self.submitted.lock().clone()
    }
}

impl JobSubmitter for RecordingSubmitter {
    fn submit(&self, descriptor: JobDescriptor) -> Result<JobId, SubmitError> {
        self.submitted.lock().push(descriptor);
        Ok(self.ids.allocate())
    }
}

/// Ordered record of hook calls, shared between a handler and the test.
pub type CallLog = Arc<Mutex<Vec<String>>>;

pub fn call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// Dispatcher over an in-memory report log and a recording submitter.
pub fn test_dispatcher(
    hook_timeout: Duration,
) -> (Dispatcher, Arc<MemoryReportLog>, Arc<RecordingSubmitter>) {
    let log = Arc::new(MemoryReportLog::new());
    let submitter = Arc::new(RecordingSubmitter::starting_at(2));
    let settings = DispatcherSettings {
        hook_timeout,
        read_buffer_size: 16,
    };
    let dispatcher = Dispatcher::new(settings, log.clone(), submitter.clone());
    (dispatcher, log, submitter)
}

pub fn web01_attributes() -> JobAttributes {
    let mut attrs = JobAttributes::new("kernsave", "web01");
    attrs.num_vols = 2;
    attrs
}

/// Data source that replays a fixed list of `read` results.
pub struct ScriptedSource {
    pub reads: VecDeque<isize>,
    pub fail_open: bool,
    pub log: CallLog,
}

impl ScriptedSource {
    pub fn new(reads: &[isize], log: CallLog) -> Self {
        Self {
            reads: reads.iter().copied().collect(),
            fail_open: false,
            log,
        }
    }
}

#[async_trait]
impl JobHandler for ScriptedSource {
    fn events(&self) -> &[Event] {
        &[Event::DataTransfer]
    }

    async fn open(&mut self, _job: &mut JobHandle<'_>, name: &str) -> Result<(), HookError> {
        self.log.lock().push(format!("open:{}", name));
        if self.fail_open {
            return Err(HookError::failed(format!("cannot open {}", name)));
        }
        Ok(())
    }

    async fn read(&mut self, _job: &mut JobHandle<'_>, buf: &mut [u8]) -> Result<isize, HookError> {
        let n = self.reads.pop_front().unwrap_or(0);
        self.log.lock().push(format!("read:{}", n));
        if n > 0 {
            let fill = (n as usize).min(buf.len());
            buf[..fill].fill(b'x');
        }
        Ok(n)
    }

    async fn close(&mut self, _job: &mut JobHandle<'_>) -> Result<(), HookError> {
        self.log.lock().push("close".to_string());
        Ok(())
    }
}

/// Job handler that logs each lifecycle hook and returns a fixed code.
pub struct LifecycleProbe {
    pub start_code: i32,
    pub volume_name: Option<String>,
    pub log: CallLog,
}

impl LifecycleProbe {
    pub fn new(log: CallLog) -> Self {
        Self {
            start_code: 1,
            volume_name: None,
            log,
        }
    }
}

#[async_trait]
impl JobHandler for LifecycleProbe {
    fn events(&self) -> &[Event] {
        &[Event::JobStart, Event::NewVolume, Event::JobEnd]
    }

    async fn job_start(&mut self, job: &mut JobHandle<'_>) -> HookResult {
        self.log.lock().push("JobStart".to_string());
        job.write("probe started\n");
        Ok(self.start_code)
    }

    async fn new_volume(&mut self, job: &mut JobHandle<'_>) -> HookResult {
        self.log.lock().push("NewVolume".to_string());
        if let Some(name) = &self.volume_name {
            job.set("VolumeName", name.as_str())?;
        }
        Ok(1)
    }

    async fn job_end(&mut self, _job: &mut JobHandle<'_>) -> HookResult {
        self.log.lock().push("JobEnd".to_string());
        Ok(1)
    }
}
