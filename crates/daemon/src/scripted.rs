//! Built-in handler pair
//!
//! [`ScriptedDaemonHandler`] is bound at daemon start. On `JobStart` it
//! installs a [`ScriptedJobHandler`] for the job and writes a report line; on
//! `JobEnd` it may resubmit a follow-up job according to `[resubmit]`. The job
//! handler names new volumes and streams file data from the local
//! filesystem.

use crate::config::{HandlerConfig, ResubmitConfig};
use crate::handle::JobHandle;
use crate::redirect::HandlerOutput;
use crate::registry::{DaemonHandler, Event, HookError, HookResult, JobHandler};
use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

/// Daemon-wide handler with the standard start/end/exit behavior.
#[derive(Debug, Clone, Default)]
pub struct ScriptedDaemonHandler {
    resubmit: ResubmitConfig,
    handler: HandlerConfig,
}

impl ScriptedDaemonHandler {
    pub fn new(resubmit: ResubmitConfig, handler: HandlerConfig) -> Self {
        Self { resubmit, handler }
    }

    fn should_resubmit(&self, job_id: u64) -> bool {
        self.resubmit.enabled && job_id < self.resubmit.below_job_id
    }
}

#[async_trait]
impl DaemonHandler for ScriptedDaemonHandler {
    fn events(&self) -> &[Event] {
        &[Event::JobStart, Event::JobEnd, Event::Exit]
    }

    async fn job_start(&self, job: &mut JobHandle<'_>) -> HookResult {
        job.set_events(Box::new(ScriptedJobHandler::new(
            self.handler.volume_name.clone(),
        )));
        let line = format!(
            "JobStart: JobId={} Client={} NumVols={}",
            job.job_id(),
            job.client(),
            job.num_vols()
        );
        job.set("JobReport", line)?;
        Ok(1)
    }

    async fn job_end(&self, job: &mut JobHandle<'_>) -> HookResult {
        let job_id = job.job_id();
        let line = format!("JobEnd: JobId={} Client={}.", job_id, job.client());
        job.set("JobReport", line)?;

        if self.should_resubmit(job_id) {
            match job.run(&self.resubmit.command) {
                Ok(new_id) => job.write(&format!("Started new job: JobId={}\n", new_id)),
                Err(e) => job.write(&format!("Could not start new job: {}\n", e)),
            }
        }
        Ok(1)
    }

    async fn exit(&self, out: &mut HandlerOutput) -> Result<(), HookError> {
        out.write_text("Daemon exiting.\n");
        Ok(())
    }
}

/// Job-scoped handler: volume naming plus a filesystem data source.
#[derive(Debug, Default)]
pub struct ScriptedJobHandler {
    volume_name: Option<String>,
    file: Option<File>,
}

impl ScriptedJobHandler {
    pub fn new(volume_name: Option<String>) -> Self {
        Self {
            volume_name,
            file: None,
        }
    }
}

#[async_trait]
impl JobHandler for ScriptedJobHandler {
    fn events(&self) -> &[Event] {
        &[Event::NewVolume, Event::DataTransfer]
    }

    async fn new_volume(&mut self, job: &mut JobHandle<'_>) -> HookResult {
        job.write(&format!(
            "JobId={} Client={} NumVols={}\n",
            job.job_id(),
            job.client(),
            job.num_vols()
        ));
        job.set("JobReport", "Before new volume set for job.")?;
        if let Some(name) = &self.volume_name {
            job.set("VolumeName", name.as_str())?;
        }
        job.set("JobReport", "After new volume set for job.")?;
        Ok(1)
    }

    async fn open(&mut self, job: &mut JobHandle<'_>, name: &str) -> Result<(), HookError> {
        job.write(&format!("Open {} called\n", name));
        self.file = Some(File::open(name).await?);
        job.write(&format!("Open: JobId={}\n", job.job_id()));
        Ok(())
    }

    async fn read(&mut self, job: &mut JobHandle<'_>, buf: &mut [u8]) -> Result<isize, HookError> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| HookError::failed("read before open"))?;
        let n = file.read(buf).await?;
        tracing::trace!(job_id = job.job_id(), bytes = n, "Read from source");
        Ok(n as isize)
    }

    async fn close(&mut self, _job: &mut JobHandle<'_>) -> Result<(), HookError> {
        self.file = None;
        Ok(())
    }
}
