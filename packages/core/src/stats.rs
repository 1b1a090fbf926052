//! Aggregate statistics derived from the job registry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::job::{Job, JobStatus};

/// Point-in-time counters plus derived timing metrics for a queue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueStats {
    /// Number of registered jobs.
    pub total: u64,
    /// Number of pending jobs.
    pub pending: u64,
    /// Number of running jobs.
    pub running: u64,
    /// Number of completed jobs.
    pub completed: u64,
    /// Number of failed jobs.
    pub failed: u64,
    /// Number of cancelled jobs.
    pub cancelled: u64,
    /// Mean seconds between creation and dispatch, over completed jobs.
    pub avg_wait_secs: f64,
    /// Mean seconds between dispatch and completion, over completed jobs.
    pub avg_processing_secs: f64,
    /// Completed jobs per minute since the queue started counting.
    pub throughput_per_min: f64,
}

impl QueueStats {
    /// Recompute every counter from the full set of jobs.
    ///
    /// `since` is the instant throughput is measured from; `None` yields a
    /// zero throughput.
    pub fn from_jobs<'a>(
        jobs: impl IntoIterator<Item = &'a Job>,
        since: Option<DateTime<Utc>>,
    ) -> Self {
        let mut stats = Self::default();
        let mut wait_total = 0.0;
        let mut processing_total = 0.0;

        for job in jobs {
            stats.total += 1;
            match job.status() {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Running => stats.running += 1,
                JobStatus::Completed => {
                    stats.completed += 1;
                    wait_total += job.wait_secs().unwrap_or_default();
                    processing_total += job.processing_secs().unwrap_or_default();
                }
                JobStatus::Failed => stats.failed += 1,
                JobStatus::Cancelled => stats.cancelled += 1,
            }
        }

        if stats.completed > 0 {
            stats.avg_wait_secs = wait_total / stats.completed as f64;
            stats.avg_processing_secs = processing_total / stats.completed as f64;

            if let Some(since) = since {
                let elapsed_mins = (Utc::now() - since).num_milliseconds() as f64 / 60_000.0;
                if elapsed_mins > 0.0 {
                    stats.throughput_per_min = stats.completed as f64 / elapsed_mins;
                }
            }
        }

        stats
    }

    /// Jobs not yet finished (pending + running).
    pub fn active(&self) -> u64 {
        self.pending + self.running
    }

    /// Jobs that reached completed or failed.
    pub fn processed(&self) -> u64 {
        self.completed + self.failed
    }

    /// Success rate as a percentage.
    pub fn success_rate(&self) -> Option<f64> {
        let total = self.processed();
        if total == 0 {
            None
        } else {
            Some((self.completed as f64 / total as f64) * 100.0)
        }
    }
}
