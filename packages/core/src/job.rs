//! Job domain types for extraction work items in the queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use ulid::Ulid;

/// Job type routed to the literature extraction handler.
pub const LITERATURE_EXTRACTION: &str = "literature_extraction";

/// Unique identifier for a job, using ULID for chronological sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Ulid);

impl JobId {
    /// Create a new unique job ID.
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Parse a job ID from a string.
    pub fn parse(s: &str) -> Result<Self, ulid::DecodeError> {
        Ok(Self(Ulid::from_string(s)?))
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Priority level for job execution order.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low = 0,
    #[default]
    Normal = 1,
    High = 2,
    Critical = 3,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::Normal => write!(f, "normal"),
            Priority::High => write!(f, "high"),
            Priority::Critical => write!(f, "critical"),
        }
    }
}

/// Current status of a job in its lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job is waiting to be dispatched.
    #[default]
    Pending,
    /// Job has been dequeued and is executing on a worker.
    Running,
    /// Job finished and carries a result.
    Completed,
    /// Job finished with an error message.
    Failed,
    /// Job was cancelled before it was dispatched.
    Cancelled,
}

impl JobStatus {
    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Get a simple status string for display.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected job payloads. Raised before a job ever reaches the queue.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("payload must contain either 'article_id' or 'text'")]
    MissingInput,

    #[error("payload must contain only one of 'article_id' or 'text'")]
    AmbiguousInput,

    #[error("field '{0}' must be a non-empty string")]
    InvalidField(&'static str),

    #[error("field 'options' must be an object")]
    InvalidOptions,

    #[error("payload must be a JSON object")]
    NotAnObject,
}

/// The document a job extracts from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobInput {
    /// Identifier resolved through the literature source.
    Identifier(String),
    /// Text supplied directly by the caller.
    RawText(String),
}

impl JobInput {
    pub fn identifier(id: impl Into<String>) -> Self {
        Self::Identifier(id.into())
    }

    pub fn raw_text(text: impl Into<String>) -> Self {
        Self::RawText(text.into())
    }

    /// Reject blank identifiers and blank text.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            JobInput::Identifier(id) if id.trim().is_empty() => {
                Err(ValidationError::InvalidField("article_id"))
            }
            JobInput::RawText(text) if text.trim().is_empty() => {
                Err(ValidationError::InvalidField("text"))
            }
            _ => Ok(()),
        }
    }
}

/// Job payload: one input variant plus an open map of extraction options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPayload {
    pub input: JobInput,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub options: Map<String, Value>,
}

impl JobPayload {
    /// Build a validated payload.
    pub fn new(input: JobInput, options: Map<String, Value>) -> Result<Self, ValidationError> {
        input.validate()?;
        Ok(Self { input, options })
    }

    pub fn article_id(&self) -> Option<&str> {
        match &self.input {
            JobInput::Identifier(id) => Some(id),
            JobInput::RawText(_) => None,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match &self.input {
            JobInput::RawText(text) => Some(text),
            JobInput::Identifier(_) => None,
        }
    }
}

impl TryFrom<Value> for JobPayload {
    type Error = ValidationError;

    /// Accepts `{"article_id": "...", "options": {...}}` or
    /// `{"text": "...", "options": {...}}`. Exactly one input key is allowed.
    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let Value::Object(mut map) = value else {
            return Err(ValidationError::NotAnObject);
        };

        let article_id = map.remove("article_id");
        let text = map.remove("text");
        let input = match (article_id, text) {
            (Some(_), Some(_)) => return Err(ValidationError::AmbiguousInput),
            (None, None) => return Err(ValidationError::MissingInput),
            (Some(Value::String(id)), None) => JobInput::Identifier(id),
            (Some(_), None) => return Err(ValidationError::InvalidField("article_id")),
            (None, Some(Value::String(text))) => JobInput::RawText(text),
            (None, Some(_)) => return Err(ValidationError::InvalidField("text")),
        };

        let options = match map.remove("options") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(options)) => options,
            Some(_) => return Err(ValidationError::InvalidOptions),
        };

        Self::new(input, options)
    }
}

/// A job represents a unit of extraction work tracked by the queue.
///
/// Status changes go through the transition methods so that the result and
/// error stay mutually exclusive and the lifecycle timestamps are written
/// at most once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    id: JobId,
    job_type: String,
    payload: JobPayload,
    priority: Priority,
    status: JobStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(default)]
    retries: u32,
    max_retries: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tags: Vec<String>,
}

impl Job {
    /// Create a new pending job.
    pub fn new(job_type: impl Into<String>, payload: JobPayload) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            job_type: job_type.into(),
            payload,
            priority: Priority::default(),
            status: JobStatus::Pending,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
            retries: 0,
            max_retries: 3,
            tags: Vec::new(),
        }
    }

    /// Create a literature extraction job, validating its input.
    pub fn extraction(payload: JobPayload, priority: Priority) -> Result<Self, ValidationError> {
        payload.input.validate()?;
        Ok(Self::new(LITERATURE_EXTRACTION, payload)
            .with_priority(priority)
            .with_tags(vec!["literature".to_string(), "extraction".to_string()]))
    }

    /// Set the priority for this job.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the max retries for this job.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Add tags to this job.
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn job_type(&self) -> &str {
        &self.job_type
    }

    pub fn payload(&self) -> &JobPayload {
        &self.payload
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Output of a completed job.
    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    /// Error message of a failed job.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Seconds between creation and first dispatch.
    pub fn wait_secs(&self) -> Option<f64> {
        self.started_at
            .map(|started| (started - self.created_at).num_milliseconds() as f64 / 1000.0)
    }

    /// Seconds between first dispatch and the terminal transition.
    pub fn processing_secs(&self) -> Option<f64> {
        match (self.started_at, self.completed_at) {
            (Some(started), Some(completed)) => {
                Some((completed - started).num_milliseconds() as f64 / 1000.0)
            }
            _ => None,
        }
    }

    fn set_status(&mut self, status: JobStatus) {
        let now = Utc::now();
        self.status = status;
        self.updated_at = now;

        if status == JobStatus::Running && self.started_at.is_none() {
            self.started_at = Some(now);
        } else if status.is_terminal() && self.completed_at.is_none() {
            self.completed_at = Some(now);
        }
    }

    /// Pending -> Running. Returns false for any other source state.
    pub fn mark_running(&mut self) -> bool {
        if self.status != JobStatus::Pending {
            return false;
        }
        self.set_status(JobStatus::Running);
        true
    }

    /// Running -> Completed with the handler output.
    pub fn complete(&mut self, result: Value) -> bool {
        if self.status != JobStatus::Running {
            return false;
        }
        self.error = None;
        self.result = Some(result);
        self.set_status(JobStatus::Completed);
        true
    }

    /// Mark the job failed. Blank messages are replaced so that a failed job
    /// always explains itself.
    pub fn fail(&mut self, error: impl Into<String>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        let error = error.into();
        let error = if error.trim().is_empty() {
            "job failed without an error message".to_string()
        } else {
            error
        };
        self.result = None;
        self.error = Some(error);
        self.set_status(JobStatus::Failed);
        true
    }

    /// Pending -> Cancelled.
    pub fn cancel(&mut self) -> bool {
        if self.status != JobStatus::Pending {
            return false;
        }
        self.set_status(JobStatus::Cancelled);
        true
    }

    /// Check if the job can be recycled for another attempt.
    pub fn can_retry(&self) -> bool {
        self.status == JobStatus::Failed && self.retries < self.max_retries
    }

    /// Failed -> Pending, counting the retry and clearing the error.
    pub fn recycle_for_retry(&mut self) -> bool {
        if !self.can_retry() {
            return false;
        }
        self.retries += 1;
        self.error = None;
        self.status = JobStatus::Pending;
        self.updated_at = Utc::now();
        true
    }
}
