//! kestrel — a durable, priority-partitioned job execution engine.
//!
//! Producers submit opaque jobs tagged with a priority class; the engine
//! persists each job to a per-priority queue, dispatches it to a worker
//! pool, tracks per-job execution failures, reroutes transient failures
//! through a delayed retry queue, and sinks permanently-failing jobs into
//! an out-of-band bad-job sink. Unified lifecycle control (start / pause /
//! resume / shutdown / retry-errors) is exposed over the entire set of
//! priority queues.
//!
//! ```rust,ignore
//! use std::collections::HashMap;
//! use std::sync::Arc;
//! use kestrel::{JobScheduler, SchedulerConfig, MemoryJobQueue, PrioritizingJobScheduler};
//!
//! let primary = Arc::new(MemoryJobQueue::new("primary"));
//! let errors = Arc::new(MemoryJobQueue::new("errors"));
//! let scheduler = Arc::new(JobScheduler::new(primary, errors, None, SchedulerConfig::default()));
//!
//! let mut map = HashMap::new();
//! map.insert(0, scheduler);
//! let fanout = PrioritizingJobScheduler::new(map);
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod job;
pub mod lifecycle;
pub mod metrics;
mod pool;
pub mod priority;
pub mod queue;
pub mod scheduler;
pub mod sink;
mod strobe;

pub use codec::{CodecRegistry, JobCodec, JsonJobCodec};
pub use config::{Config, PriorityMapping};
pub use error::{KestrelError, QueueError, Result};
pub use job::{ClassifiedError, DeadJob, Job, JobBody};
pub use lifecycle::{Lifecycle, LifecycleState, State};
pub use metrics::{AtomicMetrics, MetricsSnapshot, SchedulerMetrics};
pub use priority::PrioritizingJobScheduler;
pub use queue::{AckToken, DurableJobQueue, JobQueue, MemoryJobQueue, QueueKind, Ticket};
pub use scheduler::{JobScheduler, SchedulerConfig, SchedulerStats};
pub use sink::{BadJobSink, LoggingBadJobSink, MemoryBadJobSink};

/// Install a `tracing` subscriber reading its filter from `RUST_LOG`
/// (or `default_filter` if unset), the way the embedding binary is
/// expected to initialize logging before constructing any scheduler.
pub fn init_tracing(default_filter: &str) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init();
}
