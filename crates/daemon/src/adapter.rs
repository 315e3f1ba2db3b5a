//! Streaming source adapter state
//!
//! A transfer drives the registered handler through `open`, a sequence of
//! `read` calls and exactly one `close`. This module tracks where a job's
//! adapter is in that sequence so the dispatcher can enforce the contract:
//! one transfer at a time, and `close` whenever `open` was attempted.

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Position of the adapter within one transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterState {
    Idle,
    Opened,
    Reading,
    Closed,
}

impl fmt::Display for AdapterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdapterState::Idle => write!(f, "idle"),
            AdapterState::Opened => write!(f, "opened"),
            AdapterState::Reading => write!(f, "reading"),
            AdapterState::Closed => write!(f, "closed"),
        }
    }
}

/// Per-job tracker of the open/read/close sequence.
#[derive(Debug)]
pub struct SourceAdapter {
    state: AdapterState,
    current: Option<String>,
}

impl Default for SourceAdapter {
    fn default() -> Self {
        Self {
            state: AdapterState::Idle,
            current: None,
        }
    }
}

impl SourceAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> AdapterState {
        self.state
    }

    /// Name of the source currently being transferred.
    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Claim the adapter for a new transfer. Fails unless idle.
    pub fn begin(&mut self, name: &str) -> Result<(), AdapterState> {
        if self.state != AdapterState::Idle {
            return Err(self.state);
        }
        self.state = AdapterState::Opened;
        self.current = Some(name.to_string());
        Ok(())
    }

    pub fn mark_reading(&mut self) {
        if self.state == AdapterState::Opened {
            self.state = AdapterState::Reading;
        }
    }

    pub fn mark_closed(&mut self) {
        self.state = AdapterState::Closed;
    }

    /// Whether `close` is still owed for the current transfer.
    pub fn needs_close(&self) -> bool {
        matches!(self.state, AdapterState::Opened | AdapterState::Reading)
    }

    /// Return to idle after a transfer has been closed.
    pub fn reset(&mut self) {
        self.state = AdapterState::Idle;
        self.current = None;
    }
}

/// Result classification of one transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    /// End of stream reached.
    Completed,
    /// No handler implements the transfer events.
    NotHandled,
    SourceOpenFailed,
    SourceReadFailed,
    /// A hook panicked.
    HookFault,
    /// A hook exceeded its time limit.
    HookTimeout,
    Cancelled,
    /// The archive side rejected data.
    SinkFailed,
}

impl TransferStatus {
    pub fn is_success(self) -> bool {
        matches!(self, TransferStatus::Completed | TransferStatus::NotHandled)
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransferStatus::Completed => "completed",
            TransferStatus::NotHandled => "not_handled",
            TransferStatus::SourceOpenFailed => "source_open_failed",
            TransferStatus::SourceReadFailed => "source_read_failed",
            TransferStatus::HookFault => "hook_fault",
            TransferStatus::HookTimeout => "hook_timeout",
            TransferStatus::Cancelled => "cancelled",
            TransferStatus::SinkFailed => "sink_failed",
        };
        f.write_str(s)
    }
}

/// Outcome of transferring one named source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferOutcome {
    pub file: String,
    pub status: TransferStatus,
    pub bytes: u64,
}

/// Cooperative cancellation flag, checked between reads.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
