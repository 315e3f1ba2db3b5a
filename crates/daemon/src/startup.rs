//! Startup checks module for hookd
//!
//! Provides preflight checks on the loaded configuration before the daemon
//! accepts jobs:
//! - Hook timeout must be non-zero
//! - Adapter read buffer must be within bounds
//! - Job definitions must have unique, non-empty names and legal default volume names

use crate::config::Config;
use crate::context::{is_volume_name_legal, MAX_VOLUME_NAME_LENGTH};
use std::collections::HashSet;
use thiserror::Error;

/// Smallest accepted adapter read buffer
pub const MIN_READ_BUFFER_SIZE: usize = 512;

/// Largest accepted adapter read buffer
pub const MAX_READ_BUFFER_SIZE: usize = 16 * 1024 * 1024;

/// Error types for startup checks
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StartupError {
    #[error("Hook timeout must be greater than zero")]
    ZeroHookTimeout,

    #[error("Read buffer size {0} outside 512 bytes..=16 MiB")]
    ReadBufferSize(usize),

    #[error("Job definition with empty name")]
    EmptyJobName,

    #[error("Job {0} defined more than once")]
    DuplicateJob(String),

    #[error("Job {0} has no client")]
    MissingClient(String),

    #[error("Volume label prefix {0:?} does not form a legal volume name")]
    IllegalLabelPrefix(String),

    #[error("Configured handler volume name {0:?} is not legal")]
    IllegalHandlerVolumeName(String),
}

/// Check hook invocation limits
pub fn check_hook_limits(cfg: &Config) -> Result<(), StartupError> {
    if cfg.hooks.timeout_ms == 0 {
        return Err(StartupError::ZeroHookTimeout);
    }
    let size = cfg.hooks.read_buffer_size;
    if !(MIN_READ_BUFFER_SIZE..=MAX_READ_BUFFER_SIZE).contains(&size) {
        return Err(StartupError::ReadBufferSize(size));
    }
    Ok(())
}

/// Check that job definitions are resolvable by name
pub fn check_job_definitions(cfg: &Config) -> Result<(), StartupError> {
    let mut seen = HashSet::new();
    for def in &cfg.job_definitions {
        if def.name.trim().is_empty() {
            return Err(StartupError::EmptyJobName);
        }
        if def.client.trim().is_empty() {
            return Err(StartupError::MissingClient(def.name.clone()));
        }
        if !seen.insert(def.name.as_str()) {
            return Err(StartupError::DuplicateJob(def.name.clone()));
        }
    }
    Ok(())
}

/// Check that default and configured volume names are legal
pub fn check_volume_names(cfg: &Config) -> Result<(), StartupError> {
    // Default names are `<prefix>-NNNN`; leave room for the suffix
    let sample = format!("{}-0001", cfg.volumes.label_prefix);
    if cfg.volumes.label_prefix.is_empty()
        || !is_volume_name_legal(&sample)
        || sample.len() + 4 >= MAX_VOLUME_NAME_LENGTH
    {
        return Err(StartupError::IllegalLabelPrefix(
            cfg.volumes.label_prefix.clone(),
        ));
    }

    if let Some(name) = &cfg.handler.volume_name {
        if !is_volume_name_legal(name) {
            return Err(StartupError::IllegalHandlerVolumeName(name.clone()));
        }
    }
    Ok(())
}

/// Run all startup checks
pub fn run_startup_checks(cfg: &Config) -> Result<(), StartupError> {
    check_hook_limits(cfg)?;
    check_job_definitions(cfg)?;
    check_volume_names(cfg)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JobDefinition;
    use proptest::prelude::*;

    fn job(name: &str, client: &str) -> JobDefinition {
        JobDefinition {
            name: name.to_string(),
            client: client.to_string(),
            level: Default::default(),
            job_type: Default::default(),
            pool: None,
            storage: None,
            priority: None,
            files: Vec::new(),
            volumes: 0,
        }
    }

    #[test]
    fn test_default_config_passes() {
        assert_eq!(run_startup_checks(&Config::default()), Ok(()));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut cfg = Config::default();
        cfg.hooks.timeout_ms = 0;
        assert_eq!(run_startup_checks(&cfg), Err(StartupError::ZeroHookTimeout));
    }

    #[test]
    fn test_duplicate_job_rejected() {
        let mut cfg = Config::default();
        cfg.job_definitions = vec![job("kernsave", "web01"), job("kernsave", "db01")];
        assert_eq!(
            run_startup_checks(&cfg),
            Err(StartupError::DuplicateJob("kernsave".into()))
        );
    }

    #[test]
    fn test_empty_job_name_and_client_rejected() {
        let mut cfg = Config::default();
        cfg.job_definitions = vec![job(" ", "web01")];
        assert_eq!(check_job_definitions(&cfg), Err(StartupError::EmptyJobName));

        cfg.job_definitions = vec![job("kernsave", "")];
        assert_eq!(
            check_job_definitions(&cfg),
            Err(StartupError::MissingClient("kernsave".into()))
        );
    }

    #[test]
    fn test_illegal_label_prefix_rejected() {
        let mut cfg = Config::default();
        cfg.volumes.label_prefix = "My Vol".to_string();
        assert_eq!(
            check_volume_names(&cfg),
            Err(StartupError::IllegalLabelPrefix("My Vol".into()))
        );

        cfg.volumes.label_prefix = String::new();
        assert!(check_volume_names(&cfg).is_err());
    }

    #[test]
    fn test_illegal_handler_volume_name_rejected() {
        let mut cfg = Config::default();
        cfg.handler.volume_name = Some("Test/A".to_string());
        assert_eq!(
            check_volume_names(&cfg),
            Err(StartupError::IllegalHandlerVolumeName("Test/A".into()))
        );

        cfg.handler.volume_name = Some("TestA-001".to_string());
        assert_eq!(check_volume_names(&cfg), Ok(()));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_read_buffer_bounds(size in 0usize..(32 * 1024 * 1024)) {
            let mut cfg = Config::default();
            cfg.hooks.read_buffer_size = size;

            let result = check_hook_limits(&cfg);
            if (MIN_READ_BUFFER_SIZE..=MAX_READ_BUFFER_SIZE).contains(&size) {
                prop_assert_eq!(result, Ok(()));
            } else {
                prop_assert_eq!(result, Err(StartupError::ReadBufferSize(size)));
            }
        }

        #[test]
        fn prop_legal_prefixes_accepted(prefix in "[A-Za-z0-9:._-]{1,40}") {
            let mut cfg = Config::default();
            cfg.volumes.label_prefix = prefix;
            prop_assert_eq!(check_volume_names(&cfg), Ok(()));
        }
    }
}
