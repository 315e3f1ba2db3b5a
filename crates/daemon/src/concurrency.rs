//! Concurrency planning module for hookd
//!
//! Derives how many jobs may run at once from configuration and CPU core count.

use crate::config::Config;

/// Upper bound on derived job concurrency
pub const MAX_DERIVED_JOBS: u32 = 20;

/// Concurrency plan derived from configuration and system resources
#[derive(Debug, Clone, PartialEq)]
pub struct ConcurrencyPlan {
    /// Total logical CPU cores available
    pub total_cores: u32,
    /// Maximum number of jobs running at once
    pub max_concurrent_jobs: u32,
    /// Capacity of the pending-job queue
    pub queue_capacity: usize,
}

impl ConcurrencyPlan {
    /// Derive a concurrency plan from configuration
    ///
    /// Detects CPU cores via num_cpus. An explicit non-zero
    /// `max_concurrent_jobs` is used unchanged; otherwise one job per core,
    /// capped at [`MAX_DERIVED_JOBS`].
    pub fn derive(cfg: &Config) -> Self {
        Self::derive_with_cores(cfg, num_cpus::get() as u32)
    }

    /// Derive a plan for a known core count
    pub fn derive_with_cores(cfg: &Config, total_cores: u32) -> Self {
        let max_concurrent_jobs = if cfg.jobs.max_concurrent_jobs > 0 {
            cfg.jobs.max_concurrent_jobs
        } else {
            derive_max_jobs(total_cores)
        };

        Self {
            total_cores,
            max_concurrent_jobs,
            queue_capacity: cfg.jobs.queue_capacity.max(1),
        }
    }
}

fn derive_max_jobs(cores: u32) -> u32 {
    cores.clamp(1, MAX_DERIVED_JOBS)
}

/// Public function to derive a concurrency plan from configuration
pub fn derive_plan(cfg: &Config) -> ConcurrencyPlan {
    ConcurrencyPlan::derive(cfg)
}
