//! Worker actor for executing jobs.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use queue_core::{Job, JobId, JobStatus};
use ractor::{Actor, ActorProcessingErr, ActorRef};

use crate::handler::JobHandlerRegistry;
use crate::messages::WorkerMessage;
use crate::queue::JobQueue;

/// State for the worker actor.
pub struct WorkerActorState {
    /// Unique worker ID.
    pub worker_id: String,
    /// Queue this worker pulls from.
    pub queue: Arc<JobQueue>,
    /// Handler registry.
    pub handlers: Arc<JobHandlerRegistry>,
    /// Sleep between polls of an empty queue.
    pub poll_interval: Duration,
    /// Current job being processed.
    pub current_job: Option<JobId>,
    /// Jobs finished by this worker.
    pub processed: u64,
}

/// Worker actor arguments.
pub struct WorkerArgs {
    pub worker_id: String,
    pub queue: Arc<JobQueue>,
    pub handlers: Arc<JobHandlerRegistry>,
    pub poll_interval: Duration,
}

/// Worker actor that executes jobs.
///
/// The worker drives itself with `Poll` messages: after a job it polls again
/// right away, and on an empty queue it schedules the next poll after
/// `poll_interval`.
pub struct WorkerActor;

impl Actor for WorkerActor {
    type Msg = WorkerMessage;
    type State = WorkerActorState;
    type Arguments = WorkerArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!("Starting worker: {}", args.worker_id);

        // Start the work loop
        myself.send_message(WorkerMessage::Poll)?;

        Ok(WorkerActorState {
            worker_id: args.worker_id,
            queue: args.queue,
            handlers: args.handlers,
            poll_interval: args.poll_interval,
            current_job: None,
            processed: 0,
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            WorkerMessage::Poll => match state.queue.dequeue() {
                Some(job) => {
                    state.current_job = Some(job.id());
                    process_job(&state.queue, &state.handlers, job, &state.worker_id).await;
                    state.current_job = None;
                    state.processed += 1;

                    myself.send_message(WorkerMessage::Poll)?;
                }
                None => {
                    let myself_clone = myself.clone();
                    let interval = state.poll_interval;
                    tokio::spawn(async move {
                        tokio::time::sleep(interval).await;
                        // Fails once the worker has stopped.
                        let _ = myself_clone.send_message(WorkerMessage::Poll);
                    });
                }
            },

            WorkerMessage::CurrentJob { reply } => {
                let _ = reply.send(state.current_job);
            }

            WorkerMessage::Processed { reply } => {
                let _ = reply.send(state.processed);
            }

            WorkerMessage::Shutdown => {
                tracing::info!("Shutting down worker: {}", state.worker_id);
                myself.stop(None);
            }
        }

        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        tracing::info!(
            "Worker {} stopped after {} jobs",
            state.worker_id,
            state.processed
        );
        Ok(())
    }
}

/// Run one dequeued job through its handler and publish the outcome.
///
/// Handler errors and panics are recorded on the job as a failure; nothing
/// escapes to the caller. The final state is written back with
/// [`JobQueue::update_job`] and also returned.
pub async fn process_job(
    queue: &JobQueue,
    handlers: &JobHandlerRegistry,
    mut job: Job,
    worker_id: &str,
) -> Job {
    let job_id = job.id();

    let outcome = match handlers.get(job.job_type()) {
        None => Err(format!(
            "no handler registered for job type '{}'",
            job.job_type()
        )),
        Some(handler) => {
            match std::panic::catch_unwind(AssertUnwindSafe(|| handler.handle(&job))) {
                Err(panic) => Err(panic_message(panic.as_ref())),
                Ok(future) => match AssertUnwindSafe(future).catch_unwind().await {
                    Ok(Ok(value)) => Ok(value),
                    Ok(Err(error)) => Err(error.to_string()),
                    Err(panic) => Err(panic_message(panic.as_ref())),
                },
            }
        }
    };

    match outcome {
        Ok(value) => {
            if job.status() == JobStatus::Running {
                job.complete(value);
                tracing::info!("{} completed job {}", worker_id, job_id);
            }
        }
        Err(error) => {
            tracing::error!("{} failed job {}: {}", worker_id, job_id, error);
            job.fail(error);
        }
    }

    if !queue.update_job(job.clone()) {
        tracing::warn!(
            "{}: job {} was removed before its result was recorded",
            worker_id,
            job_id
        );
    }

    job
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("handler panicked: {detail}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{BoxError, FnHandler, HandlerFuture};
    use queue_core::{JobInput, JobPayload, Priority};
    use serde_json::{Map, json};

    fn job(job_type: &str) -> Job {
        let payload = JobPayload::new(JobInput::raw_text("text"), Map::new()).unwrap();
        Job::new(job_type, payload).with_priority(Priority::Normal)
    }

    fn registry() -> JobHandlerRegistry {
        let mut handlers = JobHandlerRegistry::new();
        handlers.register(FnHandler::new("echo", |job: &Job| -> HandlerFuture {
            let text = job.payload().text().map(str::to_owned);
            Box::pin(async move { Ok::<_, BoxError>(json!({ "text": text })) })
        }));
        handlers.register(FnHandler::new("fail", |_: &Job| -> HandlerFuture {
            Box::pin(async { Err::<serde_json::Value, _>(BoxError::from("pipeline rejected input")) })
        }));
        handlers.register(FnHandler::new("panic", |job: &Job| -> HandlerFuture {
            let text = job.payload().text().map(str::to_owned);
            Box::pin(async move {
                if text.is_some() {
                    panic!("extractor crashed");
                }
                Ok::<_, BoxError>(serde_json::Value::Null)
            })
        }));
        handlers
    }

    async fn run(job_type: &str) -> Job {
        let queue = JobQueue::new();
        queue.enqueue(job(job_type));
        let running = queue.dequeue().unwrap();
        let finished = process_job(&queue, &registry(), running, "worker-test").await;
        assert_eq!(queue.get_job(finished.id()).as_ref(), Some(&finished));
        finished
    }

    #[tokio::test]
    async fn success_completes_job() {
        let job = run("echo").await;
        assert_eq!(job.status(), JobStatus::Completed);
        assert_eq!(job.result(), Some(&json!({"text": "text"})));
    }

    #[tokio::test]
    async fn handler_error_fails_job() {
        let job = run("fail").await;
        assert_eq!(job.status(), JobStatus::Failed);
        assert_eq!(job.error(), Some("pipeline rejected input"));
    }

    #[tokio::test]
    async fn panicking_handler_is_contained() {
        let job = run("panic").await;
        assert_eq!(job.status(), JobStatus::Failed);
        assert_eq!(job.error(), Some("handler panicked: extractor crashed"));
    }

    #[tokio::test]
    async fn missing_handler_fails_job() {
        let job = run("unknown").await;
        assert_eq!(job.status(), JobStatus::Failed);
        assert!(job.error().unwrap().contains("unknown"));
    }

    #[tokio::test]
    async fn idle_worker_answers_queries_and_shuts_down() {
        let queue = Arc::new(JobQueue::new());
        let args = WorkerArgs {
            worker_id: "worker-idle".to_string(),
            queue: queue.clone(),
            handlers: Arc::new(registry()),
            poll_interval: Duration::from_millis(5),
        };
        let (actor, handle) = Actor::spawn(None, WorkerActor, args).await.unwrap();

        let current = ractor::rpc::call(
            &actor,
            |reply| WorkerMessage::CurrentJob { reply },
            Some(Duration::from_secs(1)),
        )
        .await
        .unwrap();
        assert!(matches!(current, ractor::rpc::CallResult::Success(None)));

        queue.enqueue(job("echo"));
        for _ in 0..100 {
            if queue.get_stats().completed == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(queue.get_stats().completed, 1);

        actor.send_message(WorkerMessage::Shutdown).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
