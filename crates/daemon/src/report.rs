//! Job report persistence
//!
//! Every line a hook writes to `JobReport` ends up here. The sink is the only
//! resource shared between concurrently running jobs, so implementations
//! serialize appends behind a single lock.

use crate::context::JobId;
use parking_lot::Mutex;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Error type for report sink operations
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to write report: {0}")]
    Io(#[from] std::io::Error),

    #[error("Report sink is closed")]
    Closed,
}

/// Daemon-side append path for job report text.
pub trait ReportSink: Send + Sync {
    fn append_report(&self, job_id: JobId, text: &str) -> Result<(), ReportError>;
}

/// One appended report line, tagged with its job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportEntry {
    pub job_id: JobId,
    pub text: String,
}

/// In-memory, append-only report log shared by all jobs.
#[derive(Debug, Default)]
pub struct MemoryReportLog {
    entries: Mutex<Vec<ReportEntry>>,
}

impl MemoryReportLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// All entries in append order.
    pub fn entries(&self) -> Vec<ReportEntry> {
        self.entries.lock().clone()
    }

    /// The full report of one job, lines concatenated in append order.
    pub fn report_for(&self, job_id: JobId) -> String {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.job_id == job_id)
            .map(|e| e.text.as_str())
            .collect()
    }

    /// Remove one job's report from the log and return it.
    pub fn take_report(&self, job_id: JobId) -> String {
        let mut entries = self.entries.lock();
        let mut report = String::new();
        entries.retain(|e| {
            if e.job_id == job_id {
                report.push_str(&e.text);
                false
            } else {
                true
            }
        });
        report
    }
}

impl ReportSink for MemoryReportLog {
    fn append_report(&self, job_id: JobId, text: &str) -> Result<(), ReportError> {
        self.entries.lock().push(ReportEntry {
            job_id,
            text: text.to_string(),
        });
        Ok(())
    }
}

/// Report log writing one `job-<id>.log` file per job.
#[derive(Debug)]
pub struct FileReportLog {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl FileReportLog {
    /// Create the log, making sure the report directory exists.
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self, ReportError> {
        fs::create_dir_all(dir.as_ref())?;
        Ok(Self {
            dir: dir.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        })
    }

    /// Path of the report file for a job.
    pub fn path_for(&self, job_id: JobId) -> PathBuf {
        self.dir.join(format!("job-{}.log", job_id))
    }
}

impl ReportSink for FileReportLog {
    fn append_report(&self, job_id: JobId, text: &str) -> Result<(), ReportError> {
        let _guard = self.lock.lock();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path_for(job_id))?;
        file.write_all(text.as_bytes())?;
        Ok(())
    }
}

/// Daemon-level counter of report writes that could not be persisted.
#[derive(Debug, Clone, Default)]
pub struct FaultCounter(Arc<AtomicU64>);

impl FaultCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Best-effort, line-oriented writer bound to one job's report.
///
/// Appending never fails: sink errors bump the fault counter and are logged,
/// so a broken log can never abort a running job.
#[derive(Clone)]
pub struct ReportWriter {
    job_id: JobId,
    sink: Arc<dyn ReportSink>,
    faults: FaultCounter,
}

impl ReportWriter {
    pub fn new(job_id: JobId, sink: Arc<dyn ReportSink>, faults: FaultCounter) -> Self {
        Self {
            job_id,
            sink,
            faults,
        }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Append one line, adding the trailing newline if missing.
    pub fn append(&self, text: &str) {
        let mut line = text.to_string();
        if !line.ends_with('\n') {
            line.push('\n');
        }
        if let Err(e) = self.sink.append_report(self.job_id, &line) {
            self.faults.increment();
            tracing::warn!(job_id = self.job_id, error = %e, "Dropping job report line");
        }
    }
}

impl std::fmt::Debug for ReportWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportWriter")
            .field("job_id", &self.job_id)
            .field("faults", &self.faults.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::TempDir;

    struct BrokenSink;

    impl ReportSink for BrokenSink {
        fn append_report(&self, _job_id: JobId, _text: &str) -> Result<(), ReportError> {
            Err(ReportError::Closed)
        }
    }

    #[test]
    fn test_writer_appends_newline() {
        let log = Arc::new(MemoryReportLog::new());
        let writer = ReportWriter::new(7, log.clone(), FaultCounter::new());

        writer.append("first");
        writer.append("second\n");

        assert_eq!(log.report_for(7), "first\nsecond\n");
    }

    #[test]
    fn test_broken_sink_counts_fault_without_failing() {
        let faults = FaultCounter::new();
        let writer = ReportWriter::new(1, Arc::new(BrokenSink), faults.clone());

        writer.append("lost");
        writer.append("lost again");

        assert_eq!(faults.get(), 2);
    }

    #[test]
    fn test_file_log_appends_per_job() {
        let temp_dir = TempDir::new().unwrap();
        let log = FileReportLog::new(temp_dir.path().join("reports")).unwrap();

        log.append_report(1, "A\n").unwrap();
        log.append_report(2, "other\n").unwrap();
        log.append_report(1, "B\n").unwrap();

        let content = fs::read_to_string(log.path_for(1)).unwrap();
        assert_eq!(content, "A\nB\n");
        let other = fs::read_to_string(log.path_for(2)).unwrap();
        assert_eq!(other, "other\n");
    }

    #[test]
    fn test_concurrent_appends_keep_per_job_order() {
        let log = Arc::new(MemoryReportLog::new());
        let handles: Vec<_> = (1..=4u64)
            .map(|job_id| {
                let writer = ReportWriter::new(job_id, log.clone(), FaultCounter::new());
                std::thread::spawn(move || {
                    for i in 0..200 {
                        writer.append(&format!("{}", i));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        for job_id in 1..=4u64 {
            let expected: String = (0..200).map(|i| format!("{}\n", i)).collect();
            assert_eq!(log.report_for(job_id), expected);
        }
        assert_eq!(log.entries().len(), 800);
    }

    #[test]
    fn test_take_report_releases_only_that_job() {
        let log = MemoryReportLog::new();
        log.append_report(1, "one\n").unwrap();
        log.append_report(2, "two\n").unwrap();
        log.append_report(1, "again\n").unwrap();

        assert_eq!(log.take_report(1), "one\nagain\n");
        assert_eq!(log.report_for(1), "");
        assert_eq!(log.take_report(1), "");
        assert_eq!(log.entries().len(), 1);
        assert_eq!(log.report_for(2), "two\n");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_report_preserves_call_order(
            lines in prop::collection::vec("[a-zA-Z0-9 ]{0,20}", 0..30),
        ) {
            let log = Arc::new(MemoryReportLog::new());
            let writer = ReportWriter::new(3, log.clone(), FaultCounter::new());
            for line in &lines {
                writer.append(line);
            }

            let expected: String = lines.iter().map(|l| format!("{}\n", l)).collect();
            prop_assert_eq!(log.report_for(3), expected);
        }
    }
}
