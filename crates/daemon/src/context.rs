//! Job context: the attribute bag handed to every hook
//!
//! Fields are a fixed, versioned table. Each entry carries a name, a value
//! type and an access mode; unknown names are rejected instead of creating new
//! attributes. Writes are additionally gated by the event in progress:
//! `VolumeName` only during `NewVolume`, `Priority` only during `JobStart`.

use crate::config::{JobLevel, JobType};
use crate::registry::Event;
use crate::report::ReportWriter;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Daemon-assigned job identifier.
pub type JobId = u64;

/// Version of the field table exposed to handler code.
pub const FIELD_TABLE_VERSION: u32 = 1;

/// Longest volume name accepted, exclusive.
pub const MAX_VOLUME_NAME_LENGTH: usize = 128;

/// Error type for job context field access
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("Attribute {0} not found")]
    AttributeNotFound(String),

    #[error("Attribute {0} is not writable")]
    ImmutableField(String),

    #[error("Attribute {field} expects a {expected} value")]
    TypeMismatch { field: String, expected: FieldKind },

    #[error("Illegal volume name {0:?}")]
    InvalidVolumeName(String),
}

/// Value type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Str,
    Int,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Str => write!(f, "string"),
            FieldKind::Int => write!(f, "integer"),
        }
    }
}

/// Access mode of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldMode {
    ReadOnly,
    ReadWrite,
    WriteOnly,
}

/// Every field of the job context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Job,
    JobName,
    DirName,
    Level,
    Type,
    JobId,
    Client,
    NumVols,
    Pool,
    Storage,
    Catalog,
    MediaType,
    JobStatus,
    Priority,
    VolumeName,
    JobReport,
}

/// One row of the field table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub field: Field,
    pub name: &'static str,
    pub kind: FieldKind,
    pub mode: FieldMode,
}

/// The field table, version [`FIELD_TABLE_VERSION`].
pub const FIELD_TABLE: &[FieldSpec] = &[
    Field::Job.entry(),
    Field::JobName.entry(),
    Field::DirName.entry(),
    Field::Level.entry(),
    Field::Type.entry(),
    Field::JobId.entry(),
    Field::Client.entry(),
    Field::NumVols.entry(),
    Field::Pool.entry(),
    Field::Storage.entry(),
    Field::Catalog.entry(),
    Field::MediaType.entry(),
    Field::JobStatus.entry(),
    Field::Priority.entry(),
    Field::VolumeName.entry(),
    Field::JobReport.entry(),
];

impl Field {
    /// Resolve a field by its wire name.
    pub fn from_name(name: &str) -> Result<Field, ContextError> {
        FIELD_TABLE
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.field)
            .ok_or_else(|| ContextError::AttributeNotFound(name.to_string()))
    }

    /// This field's row of the table.
    pub const fn entry(self) -> FieldSpec {
        let (name, kind, mode) = match self {
            Field::Job => ("Job", FieldKind::Str, FieldMode::ReadOnly),
            Field::JobName => ("JobName", FieldKind::Str, FieldMode::ReadOnly),
            Field::DirName => ("DirName", FieldKind::Str, FieldMode::ReadOnly),
            Field::Level => ("Level", FieldKind::Str, FieldMode::ReadOnly),
            Field::Type => ("Type", FieldKind::Str, FieldMode::ReadOnly),
            Field::JobId => ("JobId", FieldKind::Int, FieldMode::ReadOnly),
            Field::Client => ("Client", FieldKind::Str, FieldMode::ReadOnly),
            Field::NumVols => ("NumVols", FieldKind::Int, FieldMode::ReadOnly),
            Field::Pool => ("Pool", FieldKind::Str, FieldMode::ReadOnly),
            Field::Storage => ("Storage", FieldKind::Str, FieldMode::ReadOnly),
            Field::Catalog => ("Catalog", FieldKind::Str, FieldMode::ReadOnly),
            Field::MediaType => ("MediaType", FieldKind::Str, FieldMode::ReadOnly),
            Field::JobStatus => ("JobStatus", FieldKind::Str, FieldMode::ReadOnly),
            Field::Priority => ("Priority", FieldKind::Int, FieldMode::ReadWrite),
            Field::VolumeName => ("VolumeName", FieldKind::Str, FieldMode::ReadWrite),
            Field::JobReport => ("JobReport", FieldKind::Str, FieldMode::WriteOnly),
        };
        FieldSpec {
            field: self,
            name,
            kind,
            mode,
        }
    }

    pub fn name(self) -> &'static str {
        self.entry().name
    }
}

/// A field value as seen by handler code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Str(String),
    Int(i64),
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(s) => Some(s),
            FieldValue::Int(_) => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            FieldValue::Int(i) => Some(*i),
            FieldValue::Str(_) => None,
        }
    }

    fn kind(&self) -> FieldKind {
        match self {
            FieldValue::Str(_) => FieldKind::Str,
            FieldValue::Int(_) => FieldKind::Int,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Str(s) => write!(f, "{}", s),
            FieldValue::Int(i) => write!(f, "{}", i),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Str(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Str(s)
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        FieldValue::Int(i)
    }
}

impl From<u32> for FieldValue {
    fn from(i: u32) -> Self {
        FieldValue::Int(i as i64)
    }
}

/// Status of a job as exposed through the `JobStatus` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created, JobStart not yet run.
    Created,
    /// Started and running.
    Running,
    /// Terminated normally.
    Success,
    /// Terminated in error (failed transfer).
    Failed,
    /// Aborted by the JobStart hook.
    AbortedByHook,
    /// Cancelled by the daemon.
    Cancelled,
}

impl JobStatus {
    /// Single-letter status code.
    pub fn code(self) -> char {
        match self {
            JobStatus::Created => 'C',
            JobStatus::Running => 'R',
            JobStatus::Success => 'T',
            JobStatus::Failed => 'E',
            JobStatus::AbortedByHook => 'f',
            JobStatus::Cancelled => 'A',
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::Created | JobStatus::Running)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Created => write!(f, "created"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Success => write!(f, "success"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::AbortedByHook => write!(f, "aborted_by_hook"),
            JobStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Static attributes the daemon fills in when a job begins.
#[derive(Debug, Clone, PartialEq)]
pub struct JobAttributes {
    pub job_name: String,
    pub director: String,
    pub client: String,
    pub level: JobLevel,
    pub job_type: JobType,
    pub pool: String,
    pub storage: String,
    pub catalog: String,
    pub media_type: String,
    pub priority: i64,
    pub num_vols: u32,
}

impl JobAttributes {
    /// Attributes with daemon defaults for everything but name and client.
    pub fn new(job_name: impl Into<String>, client: impl Into<String>) -> Self {
        Self {
            job_name: job_name.into(),
            director: "hookd-dir".to_string(),
            client: client.into(),
            level: JobLevel::Full,
            job_type: JobType::Backup,
            pool: "Default".to_string(),
            storage: "File".to_string(),
            catalog: "MyCatalog".to_string(),
            media_type: "File".to_string(),
            priority: 10,
            num_vols: 0,
        }
    }
}

/// Check that a volume name only uses `[A-Za-z0-9:._-]` and fits the limit.
pub fn is_volume_name_legal(name: &str) -> bool {
    !name.is_empty()
        && name.len() < MAX_VOLUME_NAME_LENGTH
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, ':' | '.' | '-' | '_'))
}

/// Attribute bag of one running job.
#[derive(Debug)]
pub struct JobContext {
    id: JobId,
    attributes: JobAttributes,
    status: JobStatus,
    volume_name: Option<String>,
    event: Option<Event>,
    report: ReportWriter,
}

impl JobContext {
    pub(crate) fn new(id: JobId, attributes: JobAttributes, report: ReportWriter) -> Self {
        Self {
            id,
            attributes,
            status: JobStatus::Created,
            volume_name: None,
            event: None,
            report,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    /// Unique job name, `<JobName>.<JobId>`.
    pub fn unique_name(&self) -> String {
        format!("{}.{}", self.attributes.job_name, self.id)
    }

    pub fn attributes(&self) -> &JobAttributes {
        &self.attributes
    }

    pub fn client(&self) -> &str {
        &self.attributes.client
    }

    pub fn num_vols(&self) -> u32 {
        self.attributes.num_vols
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn volume_name(&self) -> Option<&str> {
        self.volume_name.as_deref()
    }

    /// Event currently being dispatched, if any.
    pub fn event(&self) -> Option<Event> {
        self.event
    }

    /// Read a field by name.
    pub fn get(&self, name: &str) -> Result<FieldValue, ContextError> {
        let field = Field::from_name(name)?;
        self.get_field(field)
    }

    /// Read a field.
    pub fn get_field(&self, field: Field) -> Result<FieldValue, ContextError> {
        let attrs = &self.attributes;
        let value = match field {
            Field::Job => FieldValue::Str(self.unique_name()),
            Field::JobName => FieldValue::from(attrs.job_name.as_str()),
            Field::DirName => FieldValue::from(attrs.director.as_str()),
            Field::Level => FieldValue::Str(attrs.level.to_string()),
            Field::Type => FieldValue::Str(attrs.job_type.to_string()),
            Field::JobId => FieldValue::Int(self.id as i64),
            Field::Client => FieldValue::from(attrs.client.as_str()),
            Field::NumVols => FieldValue::from(attrs.num_vols),
            Field::Pool => FieldValue::from(attrs.pool.as_str()),
            Field::Storage => FieldValue::from(attrs.storage.as_str()),
            Field::Catalog => FieldValue::from(attrs.catalog.as_str()),
            Field::MediaType => FieldValue::from(attrs.media_type.as_str()),
            Field::JobStatus => FieldValue::Str(self.status.code().to_string()),
            Field::Priority => FieldValue::Int(attrs.priority),
            Field::VolumeName => {
                FieldValue::Str(self.volume_name.clone().unwrap_or_default())
            }
            Field::JobReport => return Err(ContextError::AttributeNotFound(field.name().into())),
        };
        Ok(value)
    }

    /// Write a field by name.
    pub fn set(&mut self, name: &str, value: impl Into<FieldValue>) -> Result<(), ContextError> {
        let field = Field::from_name(name)?;
        self.set_field(field, value.into())
    }

    /// Write a field. Read-only fields are left untouched.
    pub fn set_field(&mut self, field: Field, value: FieldValue) -> Result<(), ContextError> {
        let meta = field.entry();
        if meta.mode == FieldMode::ReadOnly {
            return Err(ContextError::ImmutableField(meta.name.into()));
        }
        if value.kind() != meta.kind {
            return Err(ContextError::TypeMismatch {
                field: meta.name.into(),
                expected: meta.kind,
            });
        }

        match (field, value) {
            (Field::JobReport, FieldValue::Str(text)) => {
                self.append_report(&text);
                Ok(())
            }
            (Field::VolumeName, FieldValue::Str(name)) => {
                if self.event != Some(Event::NewVolume) {
                    return Err(ContextError::ImmutableField(meta.name.into()));
                }
                if !is_volume_name_legal(&name) {
                    self.volume_name = None;
                    return Err(ContextError::InvalidVolumeName(name));
                }
                tracing::debug!(job_id = self.id, volume = %name, "Hook set volume name");
                self.volume_name = Some(name);
                Ok(())
            }
            (Field::Priority, FieldValue::Int(priority)) => {
                if self.event != Some(Event::JobStart) {
                    return Err(ContextError::ImmutableField(meta.name.into()));
                }
                self.attributes.priority = priority;
                Ok(())
            }
            _ => Err(ContextError::ImmutableField(meta.name.into())),
        }
    }

    /// Append a line to the job report. Never fails.
    pub fn append_report(&self, text: &str) {
        self.report.append(text);
    }

    pub(crate) fn report_writer(&self) -> &ReportWriter {
        &self.report
    }

    pub(crate) fn set_event(&mut self, event: Option<Event>) {
        self.event = event;
    }

    pub(crate) fn set_status(&mut self, status: JobStatus) {
        self.status = status;
    }

    pub(crate) fn clear_volume_name(&mut self) {
        self.volume_name = None;
    }

    /// Record a volume as mounted for the job.
    pub(crate) fn mount_volume(&mut self, name: String) {
        self.volume_name = Some(name);
        self.attributes.num_vols += 1;
    }
}
