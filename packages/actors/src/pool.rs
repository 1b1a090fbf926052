//! Worker pool that owns the worker actors for one queue.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use ractor::{Actor, ActorRef};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::handler::JobHandlerRegistry;
use crate::messages::WorkerMessage;
use crate::queue::JobQueue;
use crate::worker_actor::{WorkerActor, WorkerArgs};

/// Configuration for worker pool behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerPoolConfig {
    /// Number of concurrent workers.
    pub workers: usize,
    /// Sleep between polls of an empty queue.
    pub poll_interval: Duration,
    /// Bounded wait for each worker on stop.
    pub join_timeout: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            poll_interval: Duration::from_millis(100),
            join_timeout: Duration::from_secs(1),
        }
    }
}

impl WorkerPoolConfig {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_join_timeout(mut self, join_timeout: Duration) -> Self {
        self.join_timeout = join_timeout;
        self
    }
}

/// Worker pool errors.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("failed to spawn worker: {0}")]
    Spawn(#[from] ractor::SpawnErr),
}

struct WorkerHandle {
    worker_id: String,
    actor: ActorRef<WorkerMessage>,
    handle: JoinHandle<()>,
}

/// A fixed set of worker actors pulling from a shared [`JobQueue`].
pub struct WorkerPool {
    config: WorkerPoolConfig,
    queue: Arc<JobQueue>,
    handlers: Arc<JobHandlerRegistry>,
    workers: Mutex<Vec<WorkerHandle>>,
    running: AtomicBool,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("config", &self.config)
            .field("running", &self.is_running())
            .finish()
    }
}

impl WorkerPool {
    pub fn new(
        config: WorkerPoolConfig,
        queue: Arc<JobQueue>,
        handlers: Arc<JobHandlerRegistry>,
    ) -> Self {
        Self {
            config,
            queue,
            handlers,
            workers: Mutex::new(Vec::new()),
            running: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &WorkerPoolConfig {
        &self.config
    }

    pub fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Spawn the workers. Does nothing if the pool is already running.
    pub async fn start(&self) -> Result<(), PoolError> {
        let mut workers = self.workers.lock().await;
        if self.is_running() {
            return Ok(());
        }

        for n in 1..=self.config.workers {
            let worker_id = format!("worker-{n}");
            let args = WorkerArgs {
                worker_id: worker_id.clone(),
                queue: self.queue.clone(),
                handlers: self.handlers.clone(),
                poll_interval: self.config.poll_interval,
            };

            match Actor::spawn(None, WorkerActor, args).await {
                Ok((actor, handle)) => workers.push(WorkerHandle {
                    worker_id,
                    actor,
                    handle,
                }),
                Err(e) => {
                    tracing::error!("Failed to spawn {}: {}", worker_id, e);
                    stop_workers(workers.drain(..), self.config.join_timeout).await;
                    return Err(e.into());
                }
            }
        }

        self.running.store(true, Ordering::SeqCst);
        tracing::info!("Started worker pool with {} workers", workers.len());
        Ok(())
    }

    /// Stop dispatching and wait, bounded per worker, for workers to exit.
    ///
    /// Jobs already executing are allowed to finish within the wait.
    pub async fn stop(&self) {
        let mut workers = self.workers.lock().await;
        if !self.is_running() {
            return;
        }

        self.running.store(false, Ordering::SeqCst);
        stop_workers(workers.drain(..), self.config.join_timeout).await;
        tracing::info!("Stopped worker pool");
    }

    /// Total jobs finished by the live workers.
    pub async fn processed(&self) -> u64 {
        let workers = self.workers.lock().await;
        let mut total = 0;
        for worker in workers.iter() {
            let result = ractor::rpc::call(
                &worker.actor,
                |reply| WorkerMessage::Processed { reply },
                Some(Duration::from_secs(5)),
            )
            .await;
            if let Ok(ractor::rpc::CallResult::Success(count)) = result {
                total += count;
            }
        }
        total
    }
}

async fn stop_workers(workers: impl Iterator<Item = WorkerHandle>, join_timeout: Duration) {
    let workers: Vec<WorkerHandle> = workers.collect();

    for worker in &workers {
        worker.actor.stop(None);
    }

    for worker in workers {
        if tokio::time::timeout(join_timeout, worker.handle)
            .await
            .is_err()
        {
            tracing::warn!(
                "Worker {} did not stop within {:?}",
                worker.worker_id,
                join_timeout
            );
        }
    }
}
