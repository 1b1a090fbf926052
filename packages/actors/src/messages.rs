//! Message types for actor communication.

use queue_core::JobId;
use ractor::RpcReplyPort;

/// Messages for the WorkerActor.
#[derive(Debug)]
pub enum WorkerMessage {
    /// Try to take the next job from the queue.
    Poll,

    /// The job currently executing, if any.
    CurrentJob { reply: RpcReplyPort<Option<JobId>> },

    /// Number of jobs this worker has finished.
    Processed { reply: RpcReplyPort<u64> },

    /// Stop after the current message.
    Shutdown,
}
