//! Runs a small batch through the queue with in-memory collaborators.

use std::collections::HashMap;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use cache::CacheManager;
use manager::{
    ExtractionPipeline, LiteratureSource, ManagerConfig, PipelineError, PipelineFuture,
    QueueManager, ResilientSource, SourceError, SourceFuture, init_tracing,
};
use queue_core::Priority;
use resilience::RateLimiter;
use serde_json::json;

struct InMemorySource {
    texts: HashMap<String, String>,
}

impl LiteratureSource for InMemorySource {
    fn fetch_text<'a>(&'a self, article_id: &'a str) -> SourceFuture<'a> {
        Box::pin(async move {
            self.texts
                .get(article_id)
                .cloned()
                .ok_or_else(|| SourceError::NotFound(article_id.to_string()))
        })
    }
}

/// Counts words and picks out capitalised terms.
struct KeywordPipeline;

impl ExtractionPipeline for KeywordPipeline {
    fn process<'a>(&'a self, text: &'a str) -> PipelineFuture<'a> {
        Box::pin(async move {
            let words: Vec<&str> = text.split_whitespace().collect();
            if words.is_empty() {
                return Err(PipelineError::MalformedInput("empty text".to_string()));
            }
            let terms: Vec<&str> = words
                .iter()
                .copied()
                .filter(|w| w.chars().next().is_some_and(char::is_uppercase))
                .collect();
            Ok(json!({ "words": words.len(), "terms": terms }))
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    init_tracing();
    let config = ManagerConfig::from_env()?;

    let texts = HashMap::from([
        (
            "PMC100".to_string(),
            "Aspirin reduces Inflammation in most patients".to_string(),
        ),
        (
            "PMC200".to_string(),
            "Metformin lowers glucose via AMPK activation".to_string(),
        ),
    ]);
    let source = ResilientSource::new(
        InMemorySource { texts },
        Arc::new(CacheManager::new(config.cache.clone())),
        Arc::new(RateLimiter::new(config.source_rate_limit.clone())),
        config.source_retry.clone(),
    );

    let manager = QueueManager::with_collaborators(&config, Arc::new(source), Arc::new(KeywordPipeline));
    manager.start().await?;

    let batch_id =
        manager.submit_batch_article_ids(["PMC100", "PMC200", "PMC999"], Priority::High)?;
    manager.submit_text("Ibuprofen and Paracetamol compared", Priority::Low)?;

    let status = loop {
        let Some(status) = manager.get_batch_status(batch_id) else {
            return Err(format!("batch {batch_id} disappeared").into());
        };
        if status.is_finished() {
            break status;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    };

    println!("{}", serde_json::to_string_pretty(&status)?);
    println!("{}", serde_json::to_string_pretty(&manager.get_queue_stats())?);

    manager.stop().await;
    Ok(())
}
