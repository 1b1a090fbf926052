//! Thread-safe priority queue and authoritative job registry.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use queue_core::{Job, JobId, JobStatus, Priority, QueueStats};

/// Heap entry for dispatch ordering (higher priority first, older jobs
/// first, then insertion order).
#[derive(Debug, Clone)]
struct DispatchEntry {
    job_id: JobId,
    priority: Priority,
    created_at: DateTime<Utc>,
    seq: u64,
}

impl PartialEq for DispatchEntry {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for DispatchEntry {}

impl PartialOrd for DispatchEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DispatchEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Higher priority first
        self.priority
            .cmp(&other.priority)
            // Older jobs first (earlier created_at)
            .then_with(|| other.created_at.cmp(&self.created_at))
            // Earlier enqueue first
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Debug, Default)]
struct QueueState {
    /// All jobs by ID.
    jobs: HashMap<JobId, Job>,
    /// Dispatch order. May hold stale entries, skipped at pop time.
    pending: BinaryHeap<DispatchEntry>,
    /// The live dispatch entry of each pending job.
    slots: HashMap<JobId, u64>,
    next_seq: u64,
    /// Start of the throughput window.
    counting_since: Option<DateTime<Utc>>,
    stats: QueueStats,
}

impl QueueState {
    fn push(&mut self, job: &Job) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.slots.insert(job.id(), seq);
        self.pending.push(DispatchEntry {
            job_id: job.id(),
            priority: job.priority(),
            created_at: job.created_at(),
            seq,
        });
    }

    fn update_stats(&mut self) {
        self.stats = QueueStats::from_jobs(self.jobs.values(), self.counting_since);
    }
}

/// In-memory job queue shared by the manager and the workers.
///
/// One lock guards the registry, the dispatch heap and the stats, and every
/// mutating call recomputes the stats from the full registry.
#[derive(Debug, Default)]
pub struct JobQueue {
    state: Mutex<QueueState>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a job and schedule it for dispatch.
    pub fn enqueue(&self, job: Job) -> JobId {
        let mut state = self.state();
        let job_id = job.id();

        if state.counting_since.is_none() {
            state.counting_since = Some(Utc::now());
        }
        if job.status() == JobStatus::Pending {
            state.push(&job);
        }
        tracing::info!("Enqueued job {} with priority {}", job_id, job.priority());
        state.jobs.insert(job_id, job);
        state.update_stats();

        job_id
    }

    /// Pop the highest-priority pending job and mark it running.
    ///
    /// Never blocks; returns `None` when nothing is dispatchable.
    pub fn dequeue(&self) -> Option<Job> {
        let mut state = self.state();

        while let Some(entry) = state.pending.pop() {
            if state.slots.get(&entry.job_id) != Some(&entry.seq) {
                continue;
            }
            state.slots.remove(&entry.job_id);

            let Some(job) = state.jobs.get_mut(&entry.job_id) else {
                continue;
            };
            if !job.mark_running() {
                continue;
            }

            let job = job.clone();
            state.update_stats();
            tracing::debug!("Dequeued job {}", job.id());
            return Some(job);
        }

        None
    }

    pub fn get_job(&self, job_id: JobId) -> Option<Job> {
        self.state().jobs.get(&job_id).cloned()
    }

    /// Replace the registry copy of a job. Returns false if the job is not
    /// registered.
    ///
    /// A job that is no longer pending loses its place in the dispatch order.
    pub fn update_job(&self, job: Job) -> bool {
        let mut state = self.state();
        let job_id = job.id();

        if !state.jobs.contains_key(&job_id) {
            return false;
        }
        if job.status() != JobStatus::Pending {
            state.slots.remove(&job_id);
        }
        state.jobs.insert(job_id, job);
        state.update_stats();
        true
    }

    /// Replace a pending job and re-register its dispatch entry. The old
    /// entry goes stale.
    pub fn requeue(&self, job: Job) -> bool {
        let mut state = self.state();

        if job.status() != JobStatus::Pending || !state.jobs.contains_key(&job.id()) {
            return false;
        }
        state.push(&job);
        state.jobs.insert(job.id(), job);
        state.update_stats();
        true
    }

    /// Drop a job from the registry. Its heap entry is discarded lazily.
    pub fn remove_job(&self, job_id: JobId) -> bool {
        let mut state = self.state();
        let removed = state.jobs.remove(&job_id).is_some();
        if removed {
            state.slots.remove(&job_id);
            state.update_stats();
        }
        removed
    }

    /// Cancel a job if it is still pending.
    pub fn cancel_job(&self, job_id: JobId) -> bool {
        let mut state = self.state();

        let cancelled = state
            .jobs
            .get_mut(&job_id)
            .is_some_and(|job| job.cancel());
        if cancelled {
            state.slots.remove(&job_id);
            state.update_stats();
            tracing::info!("Cancelled job {}", job_id);
        }
        cancelled
    }

    /// Recycle a failed job with retries left and schedule it again.
    pub fn retry_job(&self, job_id: JobId) -> bool {
        let mut state = self.state();

        let Some(job) = state.jobs.get_mut(&job_id) else {
            return false;
        };
        if !job.recycle_for_retry() {
            return false;
        }
        let job = job.clone();
        state.push(&job);
        state.update_stats();
        tracing::info!("Retrying job {} (retry {})", job_id, job.retries());
        true
    }

    pub fn get_jobs_by_status(&self, status: JobStatus) -> Vec<Job> {
        self.state()
            .jobs
            .values()
            .filter(|job| job.status() == status)
            .cloned()
            .collect()
    }

    /// Jobs ordered by creation time, optionally filtered by status.
    pub fn list_jobs(&self, status: Option<JobStatus>, limit: usize) -> Vec<Job> {
        let mut jobs: Vec<Job> = self
            .state()
            .jobs
            .values()
            .filter(|job| status.is_none_or(|s| job.status() == s))
            .cloned()
            .collect();
        jobs.sort_by_key(|job| (job.created_at(), job.id()));
        jobs.truncate(limit);
        jobs
    }

    /// Number of jobs waiting for dispatch.
    pub fn get_queue_length(&self) -> usize {
        self.state().slots.len()
    }

    pub fn get_stats(&self) -> QueueStats {
        self.state().stats.clone()
    }

    /// Drop every job and reset the stats.
    pub fn clear(&self) {
        let mut state = self.state();
        *state = QueueState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use queue_core::{JobInput, JobPayload};
    use serde_json::{Map, json};

    fn job(priority: Priority) -> Job {
        let payload = JobPayload::new(JobInput::raw_text("text"), Map::new()).unwrap();
        Job::extraction(payload, priority).unwrap()
    }

    #[test]
    fn higher_priority_dequeues_first() {
        let queue = JobQueue::new();
        let low = queue.enqueue(job(Priority::Low));
        let critical = queue.enqueue(job(Priority::Critical));
        let normal = queue.enqueue(job(Priority::Normal));

        let order: Vec<JobId> = std::iter::from_fn(|| queue.dequeue().map(|j| j.id())).collect();
        assert_eq!(order, vec![critical, normal, low]);
    }

    #[test]
    fn equal_priority_is_fifo() {
        let queue = JobQueue::new();
        let ids: Vec<JobId> = (0..5).map(|_| queue.enqueue(job(Priority::High))).collect();
        let order: Vec<JobId> = std::iter::from_fn(|| queue.dequeue().map(|j| j.id())).collect();
        assert_eq!(order, ids);
    }

    #[test]
    fn dequeue_marks_running() {
        let queue = JobQueue::new();
        let id = queue.enqueue(job(Priority::Normal));

        let running = queue.dequeue().unwrap();
        assert_eq!(running.status(), JobStatus::Running);
        assert!(running.started_at().is_some());
        assert_eq!(queue.get_job(id).unwrap().status(), JobStatus::Running);
        assert_eq!(queue.get_queue_length(), 0);
        assert!(queue.dequeue().is_none());
    }

    #[test]
    fn removed_and_cancelled_jobs_are_skipped() {
        let queue = JobQueue::new();
        let removed = queue.enqueue(job(Priority::Critical));
        let cancelled = queue.enqueue(job(Priority::High));
        let kept = queue.enqueue(job(Priority::Low));

        assert!(queue.remove_job(removed));
        assert!(!queue.remove_job(removed));
        assert!(queue.cancel_job(cancelled));
        assert_eq!(queue.get_queue_length(), 1);

        assert_eq!(queue.dequeue().map(|j| j.id()), Some(kept));
        assert!(queue.dequeue().is_none());
        assert_eq!(
            queue.get_job(cancelled).unwrap().status(),
            JobStatus::Cancelled
        );
    }

    #[test]
    fn running_jobs_cannot_be_cancelled() {
        let queue = JobQueue::new();
        let id = queue.enqueue(job(Priority::Normal));
        queue.dequeue();

        assert!(!queue.cancel_job(id));
        assert_eq!(queue.get_job(id).unwrap().status(), JobStatus::Running);
    }

    #[test]
    fn update_of_unknown_job_is_rejected() {
        let queue = JobQueue::new();
        assert!(!queue.update_job(job(Priority::Normal)));
    }

    #[test]
    fn failed_job_can_be_retried() {
        let queue = JobQueue::new();
        let id = queue.enqueue(job(Priority::Normal));
        let mut running = queue.dequeue().unwrap();
        running.fail("connection reset");
        assert!(queue.update_job(running));
        assert_eq!(queue.get_stats().failed, 1);

        assert!(queue.retry_job(id));
        let retried = queue.get_job(id).unwrap();
        assert_eq!(retried.status(), JobStatus::Pending);
        assert_eq!(retried.retries(), 1);
        assert_eq!(retried.error(), None);

        let again = queue.dequeue().unwrap();
        assert_eq!(again.id(), id);
        assert!(!queue.retry_job(id));
    }

    #[test]
    fn stats_follow_every_mutation() {
        let queue = JobQueue::new();
        queue.enqueue(job(Priority::Normal));
        queue.enqueue(job(Priority::Normal));
        assert_eq!(queue.get_stats().pending, 2);

        let mut running = queue.dequeue().unwrap();
        assert_eq!(queue.get_stats().running, 1);

        running.complete(json!({"ok": true}));
        queue.update_job(running);
        let stats = queue.get_stats();
        assert_eq!((stats.pending, stats.running, stats.completed), (1, 0, 1));
        assert_eq!(stats.total, 2);

        queue.clear();
        assert_eq!(queue.get_stats(), QueueStats::default());
        assert_eq!(queue.get_queue_length(), 0);
    }

    #[test]
    fn list_jobs_filters_and_limits() {
        let queue = JobQueue::new();
        for _ in 0..3 {
            queue.enqueue(job(Priority::Normal));
        }
        queue.dequeue();

        assert_eq!(queue.list_jobs(None, 10).len(), 3);
        assert_eq!(queue.list_jobs(Some(JobStatus::Pending), 10).len(), 2);
        assert_eq!(queue.list_jobs(None, 1).len(), 1);
        assert_eq!(queue.get_jobs_by_status(JobStatus::Running).len(), 1);
    }

    #[test]
    fn requeue_keeps_place_and_rejects_running_jobs() {
        let queue = JobQueue::new();
        let first = queue.enqueue(job(Priority::Normal));
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = queue.enqueue(job(Priority::Normal));

        let pending = queue.get_job(first).unwrap();
        assert!(queue.requeue(pending));
        assert_eq!(queue.get_queue_length(), 2);

        let running = queue.dequeue().unwrap();
        assert_eq!(running.id(), first);
        assert!(!queue.requeue(running));
        assert_eq!(queue.dequeue().map(|j| j.id()), Some(second));
        assert!(queue.dequeue().is_none());
    }
}
