//! Event registry and handler capability traits
//!
//! Two registration scopes exist:
//!
//! - **Job scope** ([`EventRegistry`]) holds at most one [`JobHandler`] per
//!   job context. It is created fresh for every job and only touched by the
//!   task driving that job, so it needs no locking.
//! - **Daemon scope** ([`DaemonRegistry`]) holds at most one
//!   [`DaemonHandler`] for daemon-wide events. It is initialised at start-up
//!   and torn down when `Exit` fires.
//!
//! Registering always replaces, never merges. Events a handler does not list
//! in `events()` are no-ops.

use crate::context::ContextError;
use crate::handle::JobHandle;
use crate::redirect::HandlerOutput;
use crate::submit::SubmitError;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Named lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Event {
    JobStart,
    NewVolume,
    DataTransfer,
    JobEnd,
    /// Daemon-wide; fired outside any job context.
    Exit,
}

impl Event {
    pub fn name(self) -> &'static str {
        match self {
            Event::JobStart => "JobStart",
            Event::NewVolume => "NewVolume",
            Event::DataTransfer => "DataTransfer",
            Event::JobEnd => "JobEnd",
            Event::Exit => "Exit",
        }
    }

    /// Resolve an event by name. `NewVolumeNeeded` is accepted as an alias.
    pub fn from_name(name: &str) -> Option<Event> {
        match name {
            "JobStart" => Some(Event::JobStart),
            "NewVolume" | "NewVolumeNeeded" => Some(Event::NewVolume),
            "DataTransfer" => Some(Event::DataTransfer),
            "JobEnd" => Some(Event::JobEnd),
            "Exit" => Some(Event::Exit),
            _ => None,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error a handler returns from a hook.
#[derive(Debug, Error)]
pub enum HookError {
    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error(transparent)]
    Submit(#[from] SubmitError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HookError {
    pub fn failed(reason: impl Into<String>) -> Self {
        HookError::Failed(reason.into())
    }
}

/// Return value of a lifecycle hook: positive continues, zero or negative aborts.
pub type HookResult = Result<i32, HookError>;

/// Job-scoped handler: any subset of lifecycle events plus the streaming source.
///
/// Every method has a no-op default. `events()` declares which ones the
/// dispatcher should route here; `Event::DataTransfer` covers `open`, `read`
/// and `close` together.
///
/// Hooks run on the task driving the job and must not block its thread.
/// Use async I/O or `tokio::task::spawn_blocking`. A hook that returns after
/// the hook timeout is treated as timed out and its result is dropped.
#[async_trait]
pub trait JobHandler: Send {
    /// Events this handler implements.
    fn events(&self) -> &[Event];

    async fn job_start(&mut self, _job: &mut JobHandle<'_>) -> HookResult {
        Ok(1)
    }

    async fn new_volume(&mut self, _job: &mut JobHandle<'_>) -> HookResult {
        Ok(1)
    }

    async fn job_end(&mut self, _job: &mut JobHandle<'_>) -> HookResult {
        Ok(1)
    }

    /// Resolve `name` to an underlying byte source.
    async fn open(&mut self, _job: &mut JobHandle<'_>, _name: &str) -> Result<(), HookError> {
        Ok(())
    }

    /// Fill `buf`; returns bytes written, `0` at end of stream, negative on error.
    async fn read(&mut self, _job: &mut JobHandle<'_>, _buf: &mut [u8]) -> Result<isize, HookError> {
        Ok(0)
    }

    /// Release the source. Must tolerate being called when `open` failed.
    async fn close(&mut self, _job: &mut JobHandle<'_>) -> Result<(), HookError> {
        Ok(())
    }
}

/// Daemon-scoped handler, shared by all jobs. The same non-blocking rule as
/// [`JobHandler`] applies.
#[async_trait]
pub trait DaemonHandler: Send + Sync {
    /// Events this handler implements.
    fn events(&self) -> &[Event];

    async fn job_start(&self, _job: &mut JobHandle<'_>) -> HookResult {
        Ok(1)
    }

    async fn job_end(&self, _job: &mut JobHandle<'_>) -> HookResult {
        Ok(1)
    }

    /// Daemon shutdown. No job context is valid here.
    async fn exit(&self, _out: &mut HandlerOutput) -> Result<(), HookError> {
        Ok(())
    }
}

/// Per-job handler table.
#[derive(Default)]
pub struct EventRegistry {
    handler: Option<Box<dyn JobHandler>>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `handler`, returning the one it replaces.
    pub fn register(&mut self, handler: Box<dyn JobHandler>) -> Option<Box<dyn JobHandler>> {
        self.handler.replace(handler)
    }

    /// Remove the current handler.
    pub fn unregister(&mut self) -> Option<Box<dyn JobHandler>> {
        self.handler.take()
    }

    pub fn is_registered(&self) -> bool {
        self.handler.is_some()
    }

    /// Whether the registered handler implements `event`.
    pub fn implements(&self, event: Event) -> bool {
        self.handler
            .as_ref()
            .is_some_and(|h| h.events().contains(&event))
    }

    /// The handler for `event`, or `None` when the event is a no-op.
    pub fn lookup(&mut self, event: Event) -> Option<&mut (dyn JobHandler + 'static)> {
        match self.handler.as_deref_mut() {
            Some(handler) if handler.events().contains(&event) => Some(handler),
            _ => None,
        }
    }
}

impl fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventRegistry")
            .field("events", &self.handler.as_ref().map(|h| h.events().to_vec()))
            .finish()
    }
}

/// Daemon-wide handler slot.
#[derive(Default)]
pub struct DaemonRegistry {
    handler: RwLock<Option<Arc<dyn DaemonHandler>>>,
}

impl DaemonRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the daemon handler, replacing (never adding to) the current one.
    pub fn set_events(&self, handler: Arc<dyn DaemonHandler>) -> Option<Arc<dyn DaemonHandler>> {
        self.handler.write().replace(handler)
    }

    /// Drop the daemon handler.
    pub fn teardown(&self) -> Option<Arc<dyn DaemonHandler>> {
        self.handler.write().take()
    }

    pub fn is_registered(&self) -> bool {
        self.handler.read().is_some()
    }

    /// The daemon handler for `event`, cloned out so no lock is held while it runs.
    pub fn lookup(&self, event: Event) -> Option<Arc<dyn DaemonHandler>> {
        self.handler
            .read()
            .as_ref()
            .filter(|h| h.events().contains(&event))
            .cloned()
    }
}

impl fmt::Debug for DaemonRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DaemonRegistry")
            .field("registered", &self.is_registered())
            .finish()
    }
}
