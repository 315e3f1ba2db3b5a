//! Fire-and-forget job submission
//!
//! Hooks may ask the daemon to run a new, independent job. Submission only
//! allocates an id and enqueues a request; it never dispatches the new job's
//! hooks on the caller's stack.

use crate::config::JobLevel;
use crate::context::JobId;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// Error type for job submission
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("Invalid run command: {0}")]
    InvalidCommand(String),

    #[error("Unknown job: {0}")]
    UnknownJob(String),

    #[error("Job queue is full")]
    QueueFull,

    #[error("Job queue is closed")]
    Closed,
}

/// Monotonic job id source. Ids are never reused.
#[derive(Debug)]
pub struct JobIdAllocator {
    next: AtomicU64,
}

impl JobIdAllocator {
    /// Allocator whose first id is `first`.
    pub fn starting_at(first: JobId) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }

    pub fn allocate(&self) -> JobId {
        self.next.fetch_add(1, Ordering::SeqCst)
    }

    /// Id the next allocation will return.
    pub fn peek(&self) -> JobId {
        self.next.load(Ordering::SeqCst)
    }
}

impl Default for JobIdAllocator {
    fn default() -> Self {
        Self::starting_at(1)
    }
}

/// What a hook asks the daemon to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDescriptor {
    pub name: String,
    pub client: Option<String>,
    pub level: Option<JobLevel>,
    pub priority: Option<i64>,
}

impl JobDescriptor {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            client: None,
            level: None,
            priority: None,
        }
    }

    /// Parse a console-style command such as `run kernsave client=web01 level=Full`.
    pub fn parse_run_command(command: &str) -> Result<Self, SubmitError> {
        let invalid = |reason: &str| SubmitError::InvalidCommand(format!("{}: {}", reason, command));

        let mut tokens = command.split_whitespace();
        match tokens.next() {
            Some(verb) if verb.eq_ignore_ascii_case("run") => {}
            _ => return Err(invalid("expected 'run'")),
        }

        let mut name = None;
        let mut client = None;
        let mut level = None;
        let mut priority = None;

        for token in tokens {
            match token.split_once('=') {
                None if name.is_none() => name = Some(token.to_string()),
                None => return Err(invalid("unexpected argument")),
                Some((key, value)) => match key.to_ascii_lowercase().as_str() {
                    "job" => name = Some(value.to_string()),
                    "client" => client = Some(value.to_string()),
                    "level" => {
                        level = Some(value.parse::<JobLevel>().map_err(|e| invalid(&e))?);
                    }
                    "priority" => {
                        priority = Some(value.parse::<i64>().map_err(|_| invalid("bad priority"))?);
                    }
                    _ => return Err(invalid("unknown keyword")),
                },
            }
        }

        match name {
            Some(name) if !name.is_empty() => Ok(Self {
                name,
                client,
                level,
                priority,
            }),
            _ => Err(invalid("missing job name")),
        }
    }
}

impl FromStr for JobDescriptor {
    type Err = SubmitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_run_command(s)
    }
}

/// Daemon-side entry point for new jobs. Must return without waiting on the job.
pub trait JobSubmitter: Send + Sync {
    fn submit(&self, descriptor: JobDescriptor) -> Result<JobId, SubmitError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_positional_name() {
        let desc = JobDescriptor::parse_run_command("run kernsave").unwrap();
        assert_eq!(desc, JobDescriptor::named("kernsave"));
    }

    #[test]
    fn test_parse_keywords() {
        let desc: JobDescriptor = "run job=kernsave client=web01 level=Incremental priority=5"
            .parse()
            .unwrap();
        assert_eq!(desc.name, "kernsave");
        assert_eq!(desc.client.as_deref(), Some("web01"));
        assert_eq!(desc.level, Some(JobLevel::Incremental));
        assert_eq!(desc.priority, Some(5));
    }

    #[test]
    fn test_parse_rejects_bad_commands() {
        for cmd in [
            "",
            "status dir",
            "run",
            "run a b",
            "run kernsave colour=blue",
            "run kernsave level=weekly",
            "run kernsave priority=high",
        ] {
            assert!(
                matches!(
                    JobDescriptor::parse_run_command(cmd),
                    Err(SubmitError::InvalidCommand(_))
                ),
                "{:?} should be rejected",
                cmd
            );
        }
    }

    #[test]
    fn test_allocator_is_monotonic() {
        let ids = JobIdAllocator::default();
        assert_eq!(ids.peek(), 1);
        assert_eq!(ids.allocate(), 1);
        assert_eq!(ids.allocate(), 2);
        assert_eq!(ids.peek(), 3);
    }

    #[test]
    fn test_allocator_unique_across_threads() {
        let ids = std::sync::Arc::new(JobIdAllocator::starting_at(100));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let ids = ids.clone();
                std::thread::spawn(move || (0..250).map(|_| ids.allocate()).collect::<Vec<_>>())
            })
            .collect();

        let mut all: Vec<JobId> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 1000);
        assert_eq!(all[0], 100);
    }
}
