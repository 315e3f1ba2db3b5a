//! Output redirection for handler diagnostics
//!
//! Handlers write free-form text through a [`HandlerOutput`]. While a job's
//! [`RedirectGuard`] is held (from `JobStart` entry until `JobEnd` returns)
//! that text is appended to the job report; otherwise it goes to the daemon
//! log. The guard releases the redirect on drop, so every exit path
//! (success, fault, timeout, task abort) tears it down.

use crate::report::ReportWriter;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Owner of a job's redirect switch.
#[derive(Debug, Clone)]
pub struct OutputRedirector {
    active: Arc<AtomicBool>,
    report: ReportWriter,
}

impl OutputRedirector {
    pub fn new(report: ReportWriter) -> Self {
        Self {
            active: Arc::new(AtomicBool::new(false)),
            report,
        }
    }

    /// Route handler output into the job report until the guard drops.
    pub fn acquire(&self) -> RedirectGuard {
        self.active.store(true, Ordering::SeqCst);
        tracing::debug!(job_id = self.report.job_id(), "Handler output redirected to job report");
        RedirectGuard {
            active: self.active.clone(),
            job_id: self.report.job_id(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// A fresh output stream bound to this job.
    pub fn output(&self) -> HandlerOutput {
        HandlerOutput {
            target: Target::Job {
                active: self.active.clone(),
                report: self.report.clone(),
            },
            pending: String::new(),
        }
    }
}

/// Scoped redirect; dropping it restores the default sink.
#[derive(Debug)]
pub struct RedirectGuard {
    active: Arc<AtomicBool>,
    job_id: u64,
}

impl Drop for RedirectGuard {
    fn drop(&mut self) {
        self.active.store(false, Ordering::SeqCst);
        tracing::debug!(job_id = self.job_id, "Handler output redirect released");
    }
}

#[derive(Debug)]
enum Target {
    Job {
        active: Arc<AtomicBool>,
        report: ReportWriter,
    },
    Daemon,
}

/// Line-buffered text stream handed to handler code.
///
/// Complete lines are emitted as they arrive; a trailing partial line is
/// emitted on [`flush`](io::Write::flush) or drop.
#[derive(Debug)]
pub struct HandlerOutput {
    target: Target,
    pending: String,
}

impl HandlerOutput {
    /// Output stream with no job context; always goes to the daemon log.
    pub fn daemon() -> Self {
        Self {
            target: Target::Daemon,
            pending: String::new(),
        }
    }

    /// Write text, emitting every completed line.
    pub fn write_text(&mut self, text: &str) {
        self.pending.push_str(text);
        while let Some(pos) = self.pending.find('\n') {
            let line: String = self.pending.drain(..=pos).collect();
            self.emit(line.trim_end_matches('\n'));
        }
    }

    /// Emit any partial line still buffered.
    pub fn flush_pending(&mut self) {
        if !self.pending.is_empty() {
            let line = std::mem::take(&mut self.pending);
            self.emit(&line);
        }
    }

    fn emit(&self, line: &str) {
        match &self.target {
            Target::Job { active, report } if active.load(Ordering::SeqCst) => {
                report.append(line);
            }
            Target::Job { report, .. } => {
                tracing::info!(target: "hookd::handler_output", job_id = report.job_id(), "{}", line);
            }
            Target::Daemon => {
                tracing::info!(target: "hookd::handler_output", "{}", line);
            }
        }
    }
}

impl io::Write for HandlerOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_text(&String::from_utf8_lossy(buf));
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_pending();
        Ok(())
    }
}

impl Drop for HandlerOutput {
    fn drop(&mut self) {
        self.flush_pending();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{FaultCounter, MemoryReportLog};
    use std::io::Write;

    fn make_redirector(log: Arc<MemoryReportLog>) -> OutputRedirector {
        OutputRedirector::new(ReportWriter::new(9, log, FaultCounter::new()))
    }

    #[test]
    fn test_output_captured_only_while_guard_held() {
        let log = Arc::new(MemoryReportLog::new());
        let redirector = make_redirector(log.clone());

        let mut before = redirector.output();
        before.write_text("not captured\n");

        let guard = redirector.acquire();
        let mut during = redirector.output();
        during.write_text("captured\n");
        drop(guard);

        let mut after = redirector.output();
        after.write_text("not captured either\n");

        assert_eq!(log.report_for(9), "captured\n");
        assert!(!redirector.is_active());
    }

    #[test]
    fn test_partial_lines_buffered_until_flush() {
        let log = Arc::new(MemoryReportLog::new());
        let redirector = make_redirector(log.clone());
        let _guard = redirector.acquire();

        let mut out = redirector.output();
        write!(out, "Read ").unwrap();
        write!(out, "{} bytes", 8).unwrap();
        assert_eq!(log.report_for(9), "");

        out.flush().unwrap();
        assert_eq!(log.report_for(9), "Read 8 bytes\n");
    }

    #[test]
    fn test_multiple_lines_in_one_write() {
        let log = Arc::new(MemoryReportLog::new());
        let redirector = make_redirector(log.clone());
        let _guard = redirector.acquire();

        let mut out = redirector.output();
        out.write_text("one\ntwo\nthree");
        drop(out);

        assert_eq!(log.report_for(9), "one\ntwo\nthree\n");
    }

    #[test]
    fn test_guard_released_on_panic() {
        let log = Arc::new(MemoryReportLog::new());
        let redirector = make_redirector(log);

        let inner = redirector.clone();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _guard = inner.acquire();
            panic!("handler blew up");
        }));

        assert!(result.is_err());
        assert!(!redirector.is_active());
    }
}
