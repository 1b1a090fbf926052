//! Actor system for the extraction job queue.
//!
//! This crate provides the priority queue and the Ractor-based workers
//! that drain it.
//!
//! # Architecture
//!
//! - `JobQueue` - Priority-ordered registry of jobs, shared behind an `Arc`
//! - `WorkerPool` - Starts and stops a fixed set of workers
//! - `WorkerActor` - Pulls jobs from the queue and runs their handlers
//!
//! # Usage
//!
//! ```ignore
//! use actors::{JobHandlerRegistry, JobQueue, WorkerPool, WorkerPoolConfig};
//!
//! let queue = Arc::new(JobQueue::new());
//! let pool = WorkerPool::new(WorkerPoolConfig::default(), queue.clone(), Arc::new(handlers));
//! pool.start().await?;
//! ```

mod handler;
mod messages;
mod pool;
mod queue;
mod worker_actor;

pub use handler::{BoxError, FnHandler, HandlerFuture, HandlerResult, JobHandler, JobHandlerRegistry};
pub use messages::WorkerMessage;
pub use pool::{PoolError, WorkerPool, WorkerPoolConfig};
pub use queue::JobQueue;
pub use worker_actor::{WorkerActor, WorkerArgs, process_job};

/// Re-export ractor types for convenience.
pub use ractor::{Actor, ActorRef, RpcReplyPort};
