//! Error taxonomy for the job execution engine.

use thiserror::Error;

/// Failures surfaced by a [`crate::queue::JobQueue`] implementation.
///
/// These are distinct from [`crate::job::ClassifiedError`]: a `QueueError`
/// means the queue itself could not complete an operation (backing-store
/// I/O, codec failure), not that a job's execution raised a classified
/// failure.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The durable backing store could not be read or written.
    #[error("queue \"{name}\" I/O failure: {source}")]
    Io {
        /// Name of the queue that failed.
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// A job could not be encoded or decoded for durable storage.
    #[error("codec failure in queue \"{name}\": {source}")]
    Codec {
        /// Name of the queue that failed.
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Top-level error type for the engine.
#[derive(Debug, Error)]
pub enum KestrelError {
    /// A queue operation failed.
    #[error(transparent)]
    Queue(#[from] QueueError),

    /// Configuration could not be loaded or was invalid.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// `put` was called with a priority that has no registered scheduler.
    #[error("no scheduler registered for priority {0}")]
    UnknownPriority(i32),

    /// A ticket's ack token was already consumed (or never existed).
    #[error("ticket already acknowledged")]
    DoubleAck,
}

/// Convenience result alias used throughout the crate.
pub type Result<T, E = KestrelError> = std::result::Result<T, E>;
