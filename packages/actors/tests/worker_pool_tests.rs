#![allow(clippy::disallowed_methods)]

use std::error::Error;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use actors::{
    BoxError, FnHandler, HandlerFuture, JobHandlerRegistry, JobQueue, WorkerPool, WorkerPoolConfig,
};
use queue_core::{Job, JobId, JobInput, JobPayload, JobStatus, Priority};
use serde_json::{Map, json};

fn text_job(text: &str, priority: Priority) -> Job {
    let payload = JobPayload::new(JobInput::raw_text(text), Map::new()).unwrap();
    Job::new("count_words", payload).with_priority(priority)
}

fn word_counter(in_flight: Arc<AtomicUsize>, peak: Arc<AtomicUsize>) -> JobHandlerRegistry {
    let mut handlers = JobHandlerRegistry::new();
    handlers.register(FnHandler::new("count_words", move |job: &Job| -> HandlerFuture {
        let text = job.payload().text().unwrap_or_default().to_owned();
        let in_flight = in_flight.clone();
        let peak = peak.clone();
        Box::pin(async move {
            let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            in_flight.fetch_sub(1, Ordering::SeqCst);

            if text == "bad" {
                return Err(BoxError::from("cannot parse document"));
            }
            Ok(json!({ "words": text.split_whitespace().count() }))
        })
    }));
    handlers
}

async fn wait_until_drained(queue: &JobQueue, ids: &[JobId]) {
    for _ in 0..200 {
        let done = ids.iter().all(|id| {
            queue
                .get_job(*id)
                .is_some_and(|job| job.status().is_terminal())
        });
        if done {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("jobs did not finish in time");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn pool_processes_jobs_concurrently() -> Result<(), Box<dyn Error>> {
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let queue = Arc::new(JobQueue::new());
    let pool = WorkerPool::new(
        WorkerPoolConfig::default()
            .with_workers(3)
            .with_poll_interval(Duration::from_millis(10)),
        queue.clone(),
        Arc::new(word_counter(in_flight, peak.clone())),
    );

    let ids: Vec<JobId> = ["one two", "bad", "three four five", "six", "seven eight"]
        .into_iter()
        .map(|text| queue.enqueue(text_job(text, Priority::Normal)))
        .collect();

    pool.start().await?;
    assert!(pool.is_running());
    wait_until_drained(&queue, &ids).await;

    let stats = queue.get_stats();
    assert_eq!(stats.completed, 4);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.pending + stats.running, 0);
    assert!(peak.load(Ordering::SeqCst) > 1);

    let failed = queue.get_job(ids[1]).unwrap();
    assert_eq!(failed.error(), Some("cannot parse document"));
    let done = queue.get_job(ids[2]).unwrap();
    assert_eq!(done.result(), Some(&json!({"words": 3})));
    assert_eq!(pool.processed().await, 5);

    pool.stop().await;
    assert!(!pool.is_running());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stopped_pool_dispatches_nothing() -> Result<(), Box<dyn Error>> {
    let queue = Arc::new(JobQueue::new());
    let handlers = word_counter(Arc::default(), Arc::default());
    let pool = WorkerPool::new(
        WorkerPoolConfig::default()
            .with_workers(2)
            .with_poll_interval(Duration::from_millis(10)),
        queue.clone(),
        Arc::new(handlers),
    );

    pool.start().await?;
    pool.start().await?;
    pool.stop().await;
    pool.stop().await;

    let id = queue.enqueue(text_job("late arrival", Priority::High));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(queue.get_job(id).unwrap().status(), JobStatus::Pending);

    pool.start().await?;
    wait_until_drained(&queue, &[id]).await;
    assert_eq!(queue.get_job(id).unwrap().status(), JobStatus::Completed);
    pool.stop().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn single_worker_follows_priority_order() -> Result<(), Box<dyn Error>> {
    let order = Arc::new(std::sync::Mutex::new(Vec::new()));
    let seen = order.clone();
    let mut handlers = JobHandlerRegistry::new();
    handlers.register(FnHandler::new("count_words", move |job: &Job| -> HandlerFuture {
        seen.lock().unwrap().push(job.id());
        Box::pin(async { Ok::<_, BoxError>(json!(null)) })
    }));

    let queue = Arc::new(JobQueue::new());
    let low = queue.enqueue(text_job("a", Priority::Low));
    let critical = queue.enqueue(text_job("b", Priority::Critical));
    let normal = queue.enqueue(text_job("c", Priority::Normal));

    let pool = WorkerPool::new(
        WorkerPoolConfig::default().with_workers(1),
        queue.clone(),
        Arc::new(handlers),
    );
    pool.start().await?;
    wait_until_drained(&queue, &[low, critical, normal]).await;
    pool.stop().await;

    assert_eq!(*order.lock().unwrap(), vec![critical, normal, low]);
    Ok(())
}
