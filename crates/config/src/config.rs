//! Core configuration structures and loading logic

use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Error type for configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// Backup level of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum JobLevel {
    #[default]
    Full,
    Incremental,
    Differential,
}

impl fmt::Display for JobLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobLevel::Full => write!(f, "Full"),
            JobLevel::Incremental => write!(f, "Incremental"),
            JobLevel::Differential => write!(f, "Differential"),
        }
    }
}

impl FromStr for JobLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "full" | "f" => Ok(JobLevel::Full),
            "incremental" | "i" => Ok(JobLevel::Incremental),
            "differential" | "d" => Ok(JobLevel::Differential),
            other => Err(format!("unknown job level '{}'", other)),
        }
    }
}

/// Kind of job the daemon runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum JobType {
    #[default]
    Backup,
    Restore,
    Verify,
    Admin,
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobType::Backup => write!(f, "Backup"),
            JobType::Restore => write!(f, "Restore"),
            JobType::Verify => write!(f, "Verify"),
            JobType::Admin => write!(f, "Admin"),
        }
    }
}

/// Hook invocation limits
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HookConfig {
    /// Bounded wait per hook invocation in milliseconds
    #[serde(default = "default_hook_timeout_ms")]
    pub timeout_ms: u64,
    /// Fixed buffer handed to the streaming source on every read
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,
}

fn default_hook_timeout_ms() -> u64 {
    30_000
}

fn default_read_buffer_size() -> usize {
    64 * 1024
}

impl Default for HookConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_hook_timeout_ms(),
            read_buffer_size: default_read_buffer_size(),
        }
    }
}

/// Job queue and resource defaults
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobsConfig {
    /// Maximum concurrent jobs (0 = auto-derive)
    #[serde(default)]
    pub max_concurrent_jobs: u32,
    /// Capacity of the submission queue
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_pool")]
    pub default_pool: String,
    #[serde(default = "default_storage")]
    pub default_storage: String,
    #[serde(default = "default_catalog")]
    pub default_catalog: String,
    #[serde(default = "default_media_type")]
    pub default_media_type: String,
    #[serde(default = "default_priority")]
    pub default_priority: i64,
}

fn default_queue_capacity() -> usize {
    100
}

fn default_pool() -> String {
    "Default".to_string()
}

fn default_storage() -> String {
    "File".to_string()
}

fn default_catalog() -> String {
    "MyCatalog".to_string()
}

fn default_media_type() -> String {
    "File".to_string()
}

fn default_priority() -> i64 {
    10
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 0,
            queue_capacity: default_queue_capacity(),
            default_pool: default_pool(),
            default_storage: default_storage(),
            default_catalog: default_catalog(),
            default_media_type: default_media_type(),
            default_priority: default_priority(),
        }
    }
}

/// Default volume naming policy, used when no hook picks a name
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VolumeConfig {
    #[serde(default = "default_label_prefix")]
    pub label_prefix: String,
}

fn default_label_prefix() -> String {
    "Vol".to_string()
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            label_prefix: default_label_prefix(),
        }
    }
}

/// Where job reports are persisted
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ReportConfig {
    /// Directory for per-job report files (in-memory log if None)
    pub dir: Option<PathBuf>,
}

/// Resubmission policy of the built-in scripted handler
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResubmitConfig {
    #[serde(default = "default_resubmit_enabled")]
    pub enabled: bool,
    /// Jobs whose id is strictly below this value submit `command` at JobEnd
    #[serde(default = "default_resubmit_below_job_id")]
    pub below_job_id: u64,
    #[serde(default = "default_resubmit_command")]
    pub command: String,
}

fn default_resubmit_enabled() -> bool {
    false
}

fn default_resubmit_below_job_id() -> u64 {
    2
}

fn default_resubmit_command() -> String {
    "run kernsave".to_string()
}

impl Default for ResubmitConfig {
    fn default() -> Self {
        Self {
            enabled: default_resubmit_enabled(),
            below_job_id: default_resubmit_below_job_id(),
            command: default_resubmit_command(),
        }
    }
}

/// Behaviour knobs of the built-in scripted handler
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct HandlerConfig {
    /// Volume name the handler proposes on NewVolume (None defers to the daemon)
    pub volume_name: Option<String>,
}

/// A job the daemon knows how to run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobDefinition {
    pub name: String,
    pub client: String,
    #[serde(default)]
    pub level: JobLevel,
    #[serde(default, rename = "type")]
    pub job_type: JobType,
    pub pool: Option<String>,
    pub storage: Option<String>,
    pub priority: Option<i64>,
    /// Files whose bytes are supplied through the streaming source
    #[serde(default)]
    pub files: Vec<String>,
    /// Number of NewVolume events fired before the transfers
    #[serde(default)]
    pub volumes: u32,
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default = "default_director_name")]
    pub director_name: String,
    #[serde(default)]
    pub hooks: HookConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub volumes: VolumeConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub resubmit: ResubmitConfig,
    #[serde(default)]
    pub handler: HandlerConfig,
    #[serde(default, rename = "job")]
    pub job_definitions: Vec<JobDefinition>,
}

fn default_director_name() -> String {
    "hookd-dir".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            director_name: default_director_name(),
            hooks: HookConfig::default(),
            jobs: JobsConfig::default(),
            volumes: VolumeConfig::default(),
            report: ReportConfig::default(),
            resubmit: ResubmitConfig::default(),
            handler: HandlerConfig::default(),
            job_definitions: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Parses the config.toml file and handles missing optional fields with defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Look up a job definition by name
    pub fn job_definition(&self, name: &str) -> Option<&JobDefinition> {
        self.job_definitions.iter().find(|def| def.name == name)
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Overrides the following values if environment variables are set:
    /// - HOOKD_HOOK_TIMEOUT_MS -> hooks.timeout_ms
    /// - HOOKD_READ_BUFFER_SIZE -> hooks.read_buffer_size
    /// - HOOKD_MAX_CONCURRENT_JOBS -> jobs.max_concurrent_jobs
    /// - HOOKD_REPORT_DIR -> report.dir
    /// - HOOKD_RESUBMIT_ENABLED -> resubmit.enabled
    /// - HOOKD_RESUBMIT_BELOW_JOB_ID -> resubmit.below_job_id
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("HOOKD_HOOK_TIMEOUT_MS") {
            if let Ok(ms) = val.parse::<u64>() {
                self.hooks.timeout_ms = ms;
            }
        }

        if let Ok(val) = env::var("HOOKD_READ_BUFFER_SIZE") {
            if let Ok(size) = val.parse::<usize>() {
                self.hooks.read_buffer_size = size;
            }
        }

        if let Ok(val) = env::var("HOOKD_MAX_CONCURRENT_JOBS") {
            if let Ok(jobs) = val.parse::<u32>() {
                self.jobs.max_concurrent_jobs = jobs;
            }
        }

        if let Ok(val) = env::var("HOOKD_REPORT_DIR") {
            if !val.is_empty() {
                self.report.dir = Some(PathBuf::from(val));
            }
        }

        if let Ok(val) = env::var("HOOKD_RESUBMIT_ENABLED") {
            // Accept "true", "1", "yes" as true; "false", "0", "no" as false
            match val.to_lowercase().as_str() {
                "true" | "1" | "yes" => self.resubmit.enabled = true,
                "false" | "0" | "no" => self.resubmit.enabled = false,
                _ => {}
            }
        }

        if let Ok(val) = env::var("HOOKD_RESUBMIT_BELOW_JOB_ID") {
            if let Ok(id) = val.parse::<u64>() {
                self.resubmit.below_job_id = id;
            }
        }
    }

    /// Load configuration from file and apply environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Mutex;

    // Env var tests must not interleave
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    fn clear_env_vars() {
        env::remove_var("HOOKD_HOOK_TIMEOUT_MS");
        env::remove_var("HOOKD_READ_BUFFER_SIZE");
        env::remove_var("HOOKD_MAX_CONCURRENT_JOBS");
        env::remove_var("HOOKD_REPORT_DIR");
        env::remove_var("HOOKD_RESUBMIT_ENABLED");
        env::remove_var("HOOKD_RESUBMIT_BELOW_JOB_ID");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_config_parses_all_sections(
            timeout_ms in 1u64..600_000,
            buffer in 512usize..1_048_576,
            max_jobs in 0u32..64,
            below in 0u64..1000,
            enabled in proptest::bool::ANY,
            prefix in "[A-Za-z][A-Za-z0-9_]{0,10}",
        ) {
            let toml_str = format!(
                r#"
director_name = "bacula-dir"

[hooks]
timeout_ms = {}
read_buffer_size = {}

[jobs]
max_concurrent_jobs = {}

[volumes]
label_prefix = "{}"

[resubmit]
enabled = {}
below_job_id = {}
"#,
                timeout_ms, buffer, max_jobs, prefix, enabled, below
            );

            let config = Config::parse_toml(&toml_str).expect("Valid TOML should parse");

            prop_assert_eq!(config.director_name.as_str(), "bacula-dir");
            prop_assert_eq!(config.hooks.timeout_ms, timeout_ms);
            prop_assert_eq!(config.hooks.read_buffer_size, buffer);
            prop_assert_eq!(config.jobs.max_concurrent_jobs, max_jobs);
            prop_assert_eq!(config.volumes.label_prefix, prefix);
            prop_assert_eq!(config.resubmit.enabled, enabled);
            prop_assert_eq!(config.resubmit.below_job_id, below);
        }

        #[test]
        fn prop_env_overrides_hook_timeout(
            initial in 1u64..10_000,
            override_ms in 1u64..600_000,
        ) {
            let _guard = ENV_MUTEX.lock().unwrap();
            clear_env_vars();

            let toml_str = format!("[hooks]\ntimeout_ms = {}\n", initial);
            let mut config = Config::parse_toml(&toml_str).expect("Valid TOML");

            env::set_var("HOOKD_HOOK_TIMEOUT_MS", override_ms.to_string());
            config.apply_env_overrides();
            clear_env_vars();

            prop_assert_eq!(config.hooks.timeout_ms, override_ms);
        }

        #[test]
        fn prop_env_overrides_max_concurrent_jobs(
            initial in 0u32..8,
            override_jobs in 0u32..64,
        ) {
            let _guard = ENV_MUTEX.lock().unwrap();
            clear_env_vars();

            let toml_str = format!("[jobs]\nmax_concurrent_jobs = {}\n", initial);
            let mut config = Config::parse_toml(&toml_str).expect("Valid TOML");

            env::set_var("HOOKD_MAX_CONCURRENT_JOBS", override_jobs.to_string());
            config.apply_env_overrides();
            clear_env_vars();

            prop_assert_eq!(config.jobs.max_concurrent_jobs, override_jobs);
        }

        #[test]
        fn prop_env_overrides_resubmit_threshold(
            enabled in proptest::bool::ANY,
            below in 0u64..10_000,
        ) {
            let _guard = ENV_MUTEX.lock().unwrap();
            clear_env_vars();

            let mut config = Config::parse_toml("").expect("Valid TOML");

            env::set_var("HOOKD_RESUBMIT_ENABLED", enabled.to_string());
            env::set_var("HOOKD_RESUBMIT_BELOW_JOB_ID", below.to_string());
            config.apply_env_overrides();
            clear_env_vars();

            prop_assert_eq!(config.resubmit.enabled, enabled);
            prop_assert_eq!(config.resubmit.below_job_id, below);
        }
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::parse_toml("").expect("Empty TOML should parse");

        assert_eq!(config.director_name, "hookd-dir");
        assert_eq!(config.hooks.timeout_ms, 30_000);
        assert_eq!(config.hooks.read_buffer_size, 65_536);
        assert_eq!(config.jobs.max_concurrent_jobs, 0);
        assert_eq!(config.jobs.queue_capacity, 100);
        assert_eq!(config.jobs.default_priority, 10);
        assert_eq!(config.volumes.label_prefix, "Vol");
        assert!(config.report.dir.is_none());
        assert!(!config.resubmit.enabled);
        assert_eq!(config.resubmit.below_job_id, 2);
        assert_eq!(config.resubmit.command, "run kernsave");
        assert!(config.handler.volume_name.is_none());
        assert!(config.job_definitions.is_empty());
    }

    #[test]
    fn test_job_definitions_parse() {
        let toml_str = r#"
[[job]]
name = "kernsave"
client = "web01"
level = "Incremental"
type = "Backup"
files = ["/etc/hostname", "/etc/hosts"]
volumes = 2

[[job]]
name = "catalog"
client = "db01"
"#;
        let config = Config::parse_toml(toml_str).expect("Job TOML should parse");

        assert_eq!(config.job_definitions.len(), 2);
        let kernsave = config.job_definition("kernsave").expect("kernsave defined");
        assert_eq!(kernsave.client, "web01");
        assert_eq!(kernsave.level, JobLevel::Incremental);
        assert_eq!(kernsave.job_type, JobType::Backup);
        assert_eq!(kernsave.files.len(), 2);
        assert_eq!(kernsave.volumes, 2);

        let catalog = config.job_definition("catalog").expect("catalog defined");
        assert_eq!(catalog.level, JobLevel::Full);
        assert!(catalog.files.is_empty());
        assert_eq!(catalog.volumes, 0);
        assert!(config.job_definition("missing").is_none());
    }

    #[test]
    fn test_invalid_env_values_are_ignored() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env_vars();

        let mut config = Config::default();
        env::set_var("HOOKD_HOOK_TIMEOUT_MS", "soon");
        env::set_var("HOOKD_RESUBMIT_ENABLED", "maybe");
        config.apply_env_overrides();
        clear_env_vars();

        assert_eq!(config.hooks.timeout_ms, 30_000);
        assert!(!config.resubmit.enabled);
    }

    #[test]
    fn test_job_level_from_str() {
        assert_eq!("full".parse::<JobLevel>(), Ok(JobLevel::Full));
        assert_eq!("Incremental".parse::<JobLevel>(), Ok(JobLevel::Incremental));
        assert_eq!("D".parse::<JobLevel>(), Ok(JobLevel::Differential));
        assert!("weekly".parse::<JobLevel>().is_err());
    }

    #[test]
    fn test_load_from_missing_file_is_io_error() {
        let err = Config::load_from_file("/nonexistent/hookd.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_malformed_toml_is_parse_error() {
        let err = Config::parse_toml("[hooks\ntimeout_ms = ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
