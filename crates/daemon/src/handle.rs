//! The view of a job handed to handler code
//!
//! A [`JobHandle`] lives for exactly one hook invocation. It borrows the job
//! context, carries the job's output stream, and lets the handler register a
//! replacement event set or submit a new job.

use crate::context::{ContextError, FieldValue, JobContext, JobId};
use crate::redirect::HandlerOutput;
use crate::registry::{Event, JobHandler};
use crate::submit::{JobDescriptor, JobSubmitter, SubmitError};

pub struct JobHandle<'a> {
    ctx: &'a mut JobContext,
    submitter: &'a dyn JobSubmitter,
    output: HandlerOutput,
    pending: Option<Box<dyn JobHandler>>,
}

impl<'a> JobHandle<'a> {
    pub(crate) fn new(
        ctx: &'a mut JobContext,
        submitter: &'a dyn JobSubmitter,
        output: HandlerOutput,
    ) -> Self {
        Self {
            ctx,
            submitter,
            output,
            pending: None,
        }
    }

    pub fn job_id(&self) -> JobId {
        self.ctx.id()
    }

    pub fn client(&self) -> &str {
        self.ctx.client()
    }

    pub fn num_vols(&self) -> u32 {
        self.ctx.num_vols()
    }

    /// Event being dispatched.
    pub fn event(&self) -> Option<Event> {
        self.ctx.event()
    }

    pub fn context(&self) -> &JobContext {
        self.ctx
    }

    /// Read a context field by name.
    pub fn get(&self, name: &str) -> Result<FieldValue, ContextError> {
        self.ctx.get(name)
    }

    /// Write a context field by name.
    pub fn set(&mut self, name: &str, value: impl Into<FieldValue>) -> Result<(), ContextError> {
        self.ctx.set(name, value)
    }

    /// Free-form diagnostic text; lands in the job report while redirected.
    pub fn write(&mut self, text: &str) {
        self.output.write_text(text);
    }

    pub fn output(&mut self) -> &mut HandlerOutput {
        &mut self.output
    }

    /// Replace the job's event set once this hook returns.
    ///
    /// Registration takes effect for the next event dispatched, so a handler
    /// may safely replace itself.
    pub fn set_events(&mut self, handler: Box<dyn JobHandler>) {
        tracing::debug!(
            job_id = self.ctx.id(),
            events = ?handler.events(),
            "Hook registered job events"
        );
        self.pending = Some(handler);
    }

    /// Submit `command` (e.g. `run kernsave`) as a new, independent job.
    ///
    /// Returns the new job's id as soon as it is queued.
    pub fn run(&mut self, command: &str) -> Result<JobId, SubmitError> {
        let descriptor = JobDescriptor::parse_run_command(command)?;
        let new_id = self.submitter.submit(descriptor)?;
        tracing::info!(job_id = self.ctx.id(), new_job_id = new_id, command, "Hook submitted job");
        Ok(new_id)
    }

    /// End the invocation, flushing output and yielding any pending registration.
    pub(crate) fn finish(mut self) -> Option<Box<dyn JobHandler>> {
        self.output.flush_pending();
        self.pending.take()
    }
}

impl std::fmt::Debug for JobHandle<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobHandle")
            .field("job_id", &self.ctx.id())
            .field("event", &self.ctx.event())
            .field("pending_events", &self.pending.as_ref().map(|h| h.events().to_vec()))
            .finish()
    }
}
