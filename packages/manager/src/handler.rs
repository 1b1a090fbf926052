//! Job handler bridging queued extraction jobs to the collaborators.

use std::sync::Arc;

use actors::{BoxError, HandlerFuture, JobHandler};
use queue_core::{Job, JobInput, LITERATURE_EXTRACTION};

use crate::collaborators::{ExtractionPipeline, LiteratureSource};

/// Resolves a job's text (fetching it for identifiers) and runs it
/// through the extraction pipeline. The pipeline output is the job result.
///
/// Collaborator errors are passed through untouched, so their messages
/// become the job error.
#[derive(Clone)]
pub struct ExtractionHandler {
    source: Arc<dyn LiteratureSource>,
    pipeline: Arc<dyn ExtractionPipeline>,
}

impl ExtractionHandler {
    pub fn new(source: Arc<dyn LiteratureSource>, pipeline: Arc<dyn ExtractionPipeline>) -> Self {
        Self { source, pipeline }
    }
}

impl JobHandler for ExtractionHandler {
    fn job_type(&self) -> &str {
        LITERATURE_EXTRACTION
    }

    fn handle(&self, job: &Job) -> HandlerFuture {
        let source = self.source.clone();
        let pipeline = self.pipeline.clone();
        let input = job.payload().input.clone();
        let job_id = job.id();

        Box::pin(async move {
            let text = match input {
                JobInput::Identifier(article_id) => {
                    let text = source.fetch_text(&article_id).await?;
                    if text.trim().is_empty() {
                        return Err(format!("no text found for article {article_id}").into());
                    }
                    text
                }
                JobInput::RawText(text) => text,
            };

            let output = pipeline.process(&text).await?;
            tracing::info!("Processed extraction job {}", job_id);
            Ok::<_, BoxError>(output)
        })
    }
}
