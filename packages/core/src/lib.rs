//! Core domain types for the extraction job queue.
//!
//! This crate contains shared types used across all packages:
//! - Job, JobStatus and JobPayload for work items
//! - BatchResult and BatchStatus for grouped submissions
//! - QueueStats for aggregate queue metrics

mod batch;
mod job;
mod stats;

pub use batch::{BatchId, BatchResult, BatchStatus};
pub use job::{
    Job, JobId, JobInput, JobPayload, JobStatus, LITERATURE_EXTRACTION, Priority, ValidationError,
};
pub use stats::QueueStats;
