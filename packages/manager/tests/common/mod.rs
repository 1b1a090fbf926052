use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use actors::WorkerPoolConfig;
use manager::{
    ExtractionPipeline, LiteratureSource, ManagerConfig, PipelineError, PipelineFuture,
    QueueManager, SourceError, SourceFuture,
};
use queue_core::JobId;
use serde_json::json;

/// Serves article texts from a fixed map.
pub struct MapSource {
    texts: HashMap<String, String>,
}

impl MapSource {
    pub fn new(entries: &[(&str, &str)]) -> Self {
        let texts = entries
            .iter()
            .map(|(id, text)| (id.to_string(), text.to_string()))
            .collect();
        Self { texts }
    }
}

impl LiteratureSource for MapSource {
    fn fetch_text<'a>(&'a self, article_id: &'a str) -> SourceFuture<'a> {
        Box::pin(async move {
            self.texts
                .get(article_id)
                .cloned()
                .ok_or_else(|| SourceError::NotFound(article_id.to_string()))
        })
    }
}

/// Word-count pipeline driven by markers in the text:
/// `FAIL` always fails, `FLAKY` fails on its first call only, and
/// `SLOW` takes half a second.
#[derive(Default)]
pub struct MarkerPipeline {
    flaky_calls: AtomicUsize,
}

impl ExtractionPipeline for MarkerPipeline {
    fn process<'a>(&'a self, text: &'a str) -> PipelineFuture<'a> {
        Box::pin(async move {
            if text.contains("SLOW") {
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
            if text.contains("FAIL") {
                return Err(PipelineError::Failed("unparseable document".to_string()));
            }
            if text.contains("FLAKY") && self.flaky_calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(PipelineError::Failed("model unavailable".to_string()));
            }
            Ok(json!({ "words": text.split_whitespace().count() }))
        })
    }
}

pub fn test_config(workers: usize) -> ManagerConfig {
    ManagerConfig::default().with_pool(
        WorkerPoolConfig::default()
            .with_workers(workers)
            .with_poll_interval(Duration::from_millis(10)),
    )
}

pub fn manager_with(config: &ManagerConfig, source: MapSource) -> QueueManager {
    QueueManager::with_collaborators(
        config,
        Arc::new(source),
        Arc::new(MarkerPipeline::default()),
    )
}

pub async fn wait_for_terminal(manager: &QueueManager, job_ids: &[JobId]) {
    for _ in 0..300 {
        let done = job_ids.iter().all(|id| {
            manager
                .get_job_status(*id)
                .is_some_and(|status| status.is_terminal())
        });
        if done {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("jobs did not reach a terminal state in time");
}
