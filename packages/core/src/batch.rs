//! Batches group jobs submitted together. Their status is always derived
//! from the member jobs, never stored.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use ulid::Ulid;

use crate::job::{Job, JobId, JobStatus};

/// Unique identifier for a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(pub Ulid);

impl BatchId {
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    pub fn parse(s: &str) -> Result<Self, ulid::DecodeError> {
        Ok(Self(Ulid::from_string(s)?))
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The membership record of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    pub batch_id: BatchId,
    pub job_ids: Vec<JobId>,
    pub created_at: DateTime<Utc>,
}

/// Aggregate view of a batch, derived from the current state of its jobs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchStatus {
    pub batch_id: BatchId,
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Member jobs no longer present in the queue.
    pub missing: usize,
    pub results: BTreeMap<JobId, Value>,
    pub errors: BTreeMap<JobId, String>,
}

impl BatchStatus {
    /// True once no member job is pending or running.
    pub fn is_finished(&self) -> bool {
        self.pending == 0 && self.running == 0
    }
}

impl BatchResult {
    pub fn new(job_ids: Vec<JobId>) -> Self {
        Self {
            batch_id: BatchId::new(),
            job_ids,
            created_at: Utc::now(),
        }
    }

    /// Re-derive the batch status by looking up every member job.
    pub fn status(&self, mut lookup: impl FnMut(JobId) -> Option<Job>) -> BatchStatus {
        let mut status = BatchStatus {
            batch_id: self.batch_id,
            total: self.job_ids.len(),
            ..Default::default()
        };

        for &job_id in &self.job_ids {
            let Some(job) = lookup(job_id) else {
                status.missing += 1;
                continue;
            };

            match job.status() {
                JobStatus::Pending => status.pending += 1,
                JobStatus::Running => status.running += 1,
                JobStatus::Completed => {
                    status.completed += 1;
                    if let Some(result) = job.result() {
                        status.results.insert(job_id, result.clone());
                    }
                }
                JobStatus::Failed => {
                    status.failed += 1;
                    if let Some(error) = job.error() {
                        status.errors.insert(job_id, error.to_string());
                    }
                }
                JobStatus::Cancelled => status.cancelled += 1,
            }
        }

        status
    }
}
