//! Metrics module for hookd
//!
//! Provides structs for per-job lifecycle metrics and the aggregate snapshot
//! served by the metrics endpoint, with JSON serialization support.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;

/// Per-job metrics tracking lifecycle progress
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobMetrics {
    pub id: u64,
    pub name: String,
    pub client: String,
    /// Lifecycle state (`created`, `started`, `running`, `ended`, `terminated`)
    pub state: String,
    /// Job status (`running`, `success`, `failed`, ...)
    pub status: String,
    pub volumes: u32,
    pub files_transferred: u32,
    pub bytes_transferred: u64,
}

/// Complete metrics snapshot including jobs and aggregate stats
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct MetricsSnapshot {
    pub timestamp_unix_ms: i64,
    pub jobs: Vec<JobMetrics>,
    pub queue_len: usize,
    pub running_jobs: usize,
    pub completed_jobs: u64,
    pub failed_jobs: u64,
    /// Jobs aborted by their JobStart hook
    pub aborted_jobs: u64,
    pub cancelled_jobs: u64,
    pub hook_faults: u64,
    pub hook_timeouts: u64,
    /// Report lines that could not be persisted
    pub report_faults: u64,
    pub total_bytes_transferred: u64,
}

/// Shared metrics state for concurrent access across daemon components
pub type SharedMetrics = Arc<RwLock<MetricsSnapshot>>;

/// Creates a new SharedMetrics instance with default values
pub fn new_shared_metrics() -> SharedMetrics {
    Arc::new(RwLock::new(MetricsSnapshot::default()))
}

/// Milliseconds since the Unix epoch, or 0 if the clock is before it
pub fn now_unix_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn job_metrics_strategy() -> impl Strategy<Value = JobMetrics> {
        (
            any::<u64>(),
            "[a-z]{1,12}",
            "[a-z0-9-]{1,12}",
            prop::sample::select(vec!["created", "started", "running", "ended", "terminated"]),
            prop::sample::select(vec!["running", "success", "failed", "aborted_by_hook"]),
            any::<u32>(),
            any::<u32>(),
            any::<u64>(),
        )
            .prop_map(
                |(id, name, client, state, status, volumes, files, bytes)| JobMetrics {
                    id,
                    name,
                    client,
                    state: state.to_string(),
                    status: status.to_string(),
                    volumes,
                    files_transferred: files,
                    bytes_transferred: bytes,
                },
            )
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]
        #[test]
        fn prop_metrics_snapshot_survives_json(
            timestamp in any::<i64>(),
            jobs in prop::collection::vec(job_metrics_strategy(), 0..5),
            queue_len in 0usize..1000,
            running_jobs in 0usize..100,
            counters in prop::array::uniform7(any::<u64>()),
            total_bytes in any::<u64>(),
        ) {
            let snapshot = MetricsSnapshot {
                timestamp_unix_ms: timestamp,
                jobs,
                queue_len,
                running_jobs,
                completed_jobs: counters[0],
                failed_jobs: counters[1],
                aborted_jobs: counters[2],
                cancelled_jobs: counters[3],
                hook_faults: counters[4],
                hook_timeouts: counters[5],
                report_faults: counters[6],
                total_bytes_transferred: total_bytes,
            };

            let json = serde_json::to_string(&snapshot).expect("serialization should succeed");
            let deserialized: MetricsSnapshot = serde_json::from_str(&json)
                .expect("deserialization should succeed");

            prop_assert_eq!(snapshot, deserialized);
        }
    }

    #[test]
    fn test_now_is_after_2020() {
        assert!(now_unix_ms() > 1_577_836_800_000);
    }
}
