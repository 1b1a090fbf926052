//! Batch-aware facade over the job queue and its worker pool.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use actors::{JobHandlerRegistry, JobQueue, WorkerPool};
use queue_core::{
    BatchId, BatchResult, BatchStatus, Job, JobId, JobInput, JobPayload, JobStatus, Priority,
    QueueStats, ValidationError,
};
use serde_json::{Map, Value};

use crate::collaborators::{ExtractionPipeline, LiteratureSource};
use crate::config::ManagerConfig;
use crate::error::ManagerError;
use crate::handler::ExtractionHandler;

/// Submits extraction jobs, groups them into batches and controls the
/// workers that process them.
pub struct QueueManager {
    queue: Arc<JobQueue>,
    pool: WorkerPool,
    batches: Mutex<HashMap<BatchId, BatchResult>>,
    max_retries: u32,
}

impl std::fmt::Debug for QueueManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueManager")
            .field("pool", &self.pool)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl QueueManager {
    pub fn new(config: &ManagerConfig, handlers: JobHandlerRegistry) -> Self {
        let queue = Arc::new(JobQueue::new());
        let pool = WorkerPool::new(config.pool.clone(), queue.clone(), Arc::new(handlers));
        Self {
            queue,
            pool,
            batches: Mutex::new(HashMap::new()),
            max_retries: config.max_retries,
        }
    }

    /// Manager whose workers run extraction jobs against `source` and `pipeline`.
    pub fn with_collaborators(
        config: &ManagerConfig,
        source: Arc<dyn LiteratureSource>,
        pipeline: Arc<dyn ExtractionPipeline>,
    ) -> Self {
        let handlers = JobHandlerRegistry::new().with(ExtractionHandler::new(source, pipeline));
        Self::new(config, handlers)
    }

    pub fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }

    fn batches(&self) -> MutexGuard<'_, HashMap<BatchId, BatchResult>> {
        self.batches.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn build_job(
        &self,
        input: JobInput,
        priority: Priority,
        options: Map<String, Value>,
    ) -> Result<Job, ValidationError> {
        let payload = JobPayload::new(input, options)?;
        Ok(Job::extraction(payload, priority)?.with_max_retries(self.max_retries))
    }

    pub fn submit_item(
        &self,
        input: JobInput,
        priority: Priority,
        options: Map<String, Value>,
    ) -> Result<JobId, ManagerError> {
        let job = self.build_job(input, priority, options)?;
        let job_id = self.queue.enqueue(job);
        tracing::info!("Submitted extraction job {} ({})", job_id, priority);
        Ok(job_id)
    }

    /// Submit a loosely-typed payload of the form
    /// `{"article_id" | "text": "...", "options": {...}}`.
    pub fn submit_payload(&self, payload: Value, priority: Priority) -> Result<JobId, ManagerError> {
        let payload = JobPayload::try_from(payload)?;
        self.submit_item(payload.input, priority, payload.options)
    }

    pub fn submit_article_id(
        &self,
        article_id: impl Into<String>,
        priority: Priority,
    ) -> Result<JobId, ManagerError> {
        self.submit_item(JobInput::identifier(article_id), priority, Map::new())
    }

    pub fn submit_text(
        &self,
        text: impl Into<String>,
        priority: Priority,
    ) -> Result<JobId, ManagerError> {
        self.submit_item(JobInput::raw_text(text), priority, Map::new())
    }

    /// Submit several inputs sharing one priority and option set.
    ///
    /// Every input is validated before any job is enqueued, so a rejected
    /// batch leaves the queue untouched.
    pub fn submit_batch(
        &self,
        inputs: Vec<JobInput>,
        priority: Priority,
        options: Map<String, Value>,
    ) -> Result<BatchId, ManagerError> {
        let jobs = inputs
            .into_iter()
            .map(|input| self.build_job(input, priority, options.clone()))
            .collect::<Result<Vec<_>, _>>()?;

        let job_ids = jobs
            .into_iter()
            .map(|job| self.queue.enqueue(job))
            .collect::<Vec<_>>();

        let batch = BatchResult::new(job_ids);
        let batch_id = batch.batch_id;
        tracing::info!("Submitted batch {} with {} jobs", batch_id, batch.job_ids.len());
        self.batches().insert(batch_id, batch);
        Ok(batch_id)
    }

    pub fn submit_batch_article_ids<I, S>(
        &self,
        article_ids: I,
        priority: Priority,
    ) -> Result<BatchId, ManagerError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let inputs = article_ids.into_iter().map(JobInput::identifier).collect();
        self.submit_batch(inputs, priority, Map::new())
    }

    pub fn submit_batch_texts<I, S>(&self, texts: I, priority: Priority) -> Result<BatchId, ManagerError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let inputs = texts.into_iter().map(JobInput::raw_text).collect();
        self.submit_batch(inputs, priority, Map::new())
    }

    pub fn get_job(&self, job_id: JobId) -> Option<Job> {
        self.queue.get_job(job_id)
    }

    pub fn get_job_status(&self, job_id: JobId) -> Option<JobStatus> {
        self.queue.get_job(job_id).map(|job| job.status())
    }

    /// The job's output, once it has completed.
    pub fn get_job_result(&self, job_id: JobId) -> Option<Value> {
        let job = self.queue.get_job(job_id)?;
        if job.status() != JobStatus::Completed {
            return None;
        }
        job.result().cloned()
    }

    /// Current status of every job in the batch, or `None` for an unknown batch.
    pub fn get_batch_status(&self, batch_id: BatchId) -> Option<BatchStatus> {
        let batch = self.batches().get(&batch_id).cloned()?;
        Some(batch.status(|job_id| self.queue.get_job(job_id)))
    }

    pub fn get_queue_stats(&self) -> QueueStats {
        self.queue.get_stats()
    }

    /// Cancel a pending job. Running and finished jobs are left alone.
    pub fn cancel_job(&self, job_id: JobId) -> bool {
        self.queue.cancel_job(job_id)
    }

    /// Cancel every still-pending job of a batch. True if any was cancelled.
    pub fn cancel_batch(&self, batch_id: BatchId) -> bool {
        let Some(job_ids) = self.batches().get(&batch_id).map(|b| b.job_ids.clone()) else {
            return false;
        };

        let cancelled = job_ids
            .into_iter()
            .filter(|&job_id| self.queue.cancel_job(job_id))
            .count();
        if cancelled > 0 {
            tracing::info!("Cancelled {} jobs of batch {}", cancelled, batch_id);
        }
        cancelled > 0
    }

    /// Put a failed job with retries left back in the queue.
    pub fn retry_job(&self, job_id: JobId) -> bool {
        self.queue.retry_job(job_id)
    }

    pub async fn start(&self) -> Result<(), ManagerError> {
        self.pool.start().await?;
        Ok(())
    }

    pub async fn stop(&self) {
        self.pool.stop().await;
    }

    pub fn is_running(&self) -> bool {
        self.pool.is_running()
    }
}
