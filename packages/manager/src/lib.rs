//! Literature extraction queue: batch submission on top of the actor pool.
//!
//! # Usage
//!
//! ```ignore
//! use manager::{ManagerConfig, QueueManager};
//!
//! let manager = QueueManager::with_collaborators(&ManagerConfig::from_env()?, source, pipeline);
//! manager.start().await?;
//! let batch_id = manager.submit_batch_article_ids(["PMC1", "PMC2"], Priority::High)?;
//! ```

mod collaborators;
mod config;
mod error;
mod handler;
mod manager;
mod resilient_source;
mod telemetry;

pub use collaborators::{
    ExtractionPipeline, LiteratureSource, PipelineError, PipelineFuture, SourceError, SourceFuture,
};
pub use config::{ConfigError, ManagerConfig};
pub use error::ManagerError;
pub use handler::ExtractionHandler;
pub use manager::QueueManager;
pub use resilient_source::{ResilientSource, TEXT_CACHE_TTL, source_rate_limit, source_retry_policy};
pub use telemetry::init_tracing;
