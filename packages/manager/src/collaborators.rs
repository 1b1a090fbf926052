//! Contracts for the external services a job talks to.

use std::future::Future;
use std::pin::Pin;

use resilience::{Classify, RateLimitError, TransientKind, classify_status};
use serde_json::Value;

/// Future returned by [`LiteratureSource::fetch_text`].
pub type SourceFuture<'a> = Pin<Box<dyn Future<Output = Result<String, SourceError>> + Send + 'a>>;

/// Future returned by [`ExtractionPipeline::process`].
pub type PipelineFuture<'a> = Pin<Box<dyn Future<Output = Result<Value, PipelineError>> + Send + 'a>>;

/// Resolves article identifiers to their text.
pub trait LiteratureSource: Send + Sync + 'static {
    fn fetch_text<'a>(&'a self, article_id: &'a str) -> SourceFuture<'a>;
}

/// Turns text into structured extraction output.
pub trait ExtractionPipeline: Send + Sync + 'static {
    fn process<'a>(&'a self, text: &'a str) -> PipelineFuture<'a>;
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("article {0} not found")]
    NotFound(String),

    #[error("request timed out")]
    Timeout,

    #[error("connection reset by peer")]
    ConnectionReset,

    #[error("too many requests")]
    TooManyRequests,

    #[error("network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error(transparent)]
    RateLimited(#[from] RateLimitError),

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl Classify for SourceError {
    fn transient_kind(&self) -> Option<TransientKind> {
        match self {
            SourceError::Timeout => Some(TransientKind::Timeout),
            SourceError::ConnectionReset => Some(TransientKind::ConnectionReset),
            SourceError::TooManyRequests | SourceError::RateLimited(_) => {
                Some(TransientKind::TooManyRequests)
            }
            SourceError::Network(_) => Some(TransientKind::Network),
            SourceError::Api { status, .. } => classify_status(*status),
            SourceError::NotFound(_) | SourceError::Malformed(_) => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("extraction failed: {0}")]
    Failed(String),
}
