//! Handlers that turn a dequeued job into a result.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use queue_core::Job;
use serde_json::Value;

/// Error returned by a handler. Its `Display` text is recorded as the job error.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Outcome of running one job. `Ok` becomes the job result.
pub type HandlerResult = Result<Value, BoxError>;

/// Owned future so a worker can await it without borrowing the job.
pub type HandlerFuture = Pin<Box<dyn Future<Output = HandlerResult> + Send>>;

/// Executes jobs of a single `job_type`.
///
/// `handle` receives a snapshot of the running job; anything the returned
/// future needs must be cloned out of it first.
pub trait JobHandler: Send + Sync + 'static {
    fn job_type(&self) -> &str;

    fn handle(&self, job: &Job) -> HandlerFuture;
}

/// Job type to handler lookup shared by every worker of a pool.
#[derive(Default)]
pub struct JobHandlerRegistry {
    by_type: BTreeMap<String, Arc<dyn JobHandler>>,
}

impl std::fmt::Debug for JobHandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.job_types()).finish()
    }
}

impl JobHandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handler. A later handler for the same job type wins.
    pub fn register<H: JobHandler>(&mut self, handler: H) {
        let job_type = handler.job_type().to_owned();
        if self.by_type.insert(job_type.clone(), Arc::new(handler)).is_some() {
            tracing::warn!("Replaced existing handler for job type {}", job_type);
        }
    }

    pub fn with<H: JobHandler>(mut self, handler: H) -> Self {
        self.register(handler);
        self
    }

    pub fn get(&self, job_type: &str) -> Option<Arc<dyn JobHandler>> {
        self.by_type.get(job_type).cloned()
    }

    /// Registered job types in sorted order.
    pub fn job_types(&self) -> impl Iterator<Item = &str> {
        self.by_type.keys().map(String::as_str)
    }
}

/// Handler backed by a closure, mostly for tests and small job types.
pub struct FnHandler<F> {
    job_type: String,
    run: F,
}

impl<F> FnHandler<F>
where
    F: Fn(&Job) -> HandlerFuture + Send + Sync + 'static,
{
    pub fn new(job_type: impl Into<String>, run: F) -> Self {
        Self {
            job_type: job_type.into(),
            run,
        }
    }
}

impl<F> JobHandler for FnHandler<F>
where
    F: Fn(&Job) -> HandlerFuture + Send + Sync + 'static,
{
    fn job_type(&self) -> &str {
        &self.job_type
    }

    fn handle(&self, job: &Job) -> HandlerFuture {
        (self.run)(job)
    }
}
