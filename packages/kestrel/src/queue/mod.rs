//! FIFO job queue contract and its two variants.
//!
//! A named FIFO with lifecycle, acknowledgement tickets, size introspection
//! and a drain-into relation. Two concrete implementations share the
//! capability set through the [`JobQueue`] trait object rather than a
//! common base class: [`MemoryJobQueue`] (bounded, in-process) and
//! [`DurableJobQueue`] (append-only log on disk).

mod durable;
mod fifo;
mod memory;

pub use durable::DurableJobQueue;
pub use memory::MemoryJobQueue;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::job::Job;
use crate::lifecycle::Lifecycle;

/// Opaque, `Copy`-able one-shot ack capability handed out alongside a job
/// by [`JobQueue::get`].
///
/// Kept separate from the [`Job`] itself (rather than folding `ack` into a
/// `Ticket` that bundles both) because by the time a worker is ready to
/// acknowledge a ticket, the job may already have been moved elsewhere
/// (re-enqueued to the error queue). The token alone is what `ack` needs
/// to release the underlying queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckToken(pub(crate) u64);

/// A one-shot handle binding a job to a pending acknowledgement.
///
/// Exactly one of `ack` (via the token) or re-enqueue-via-error-path must
/// be observed for every ticket a queue emits; leaking a ticket means the
/// underlying entry remains invisible (moved out of `size()`) but
/// undrained forever.
pub struct Ticket {
    /// The job bound to this ticket.
    pub job: Job,
    token: AckToken,
}

impl Ticket {
    fn new(job: Job, token: AckToken) -> Self {
        Self { job, token }
    }

    /// Split the ticket into its job and ack token.
    pub fn split(self) -> (Job, AckToken) {
        (self.job, self.token)
    }

    /// The ack token, without consuming the ticket.
    pub fn ack_token(&self) -> AckToken {
        self.token
    }
}

pub(crate) struct QueueEntry {
    pub entry_id: u64,
    pub job: Job,
    pub enqueued_at: DateTime<Utc>,
}

/// Which [`JobQueue`] variant a configured queue should materialize as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueKind {
    /// Bounded, in-process, non-durable.
    Memory,
    /// Append-only log on disk, durable across restarts.
    Durable,
}

impl std::str::FromStr for QueueKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "memory" => Ok(QueueKind::Memory),
            "durable" => Ok(QueueKind::Durable),
            other => Err(format!("unknown queue type: {other}")),
        }
    }
}

/// A named FIFO queue of jobs.
///
/// Implementations share [`Lifecycle`] as a supertrait: `start`,
/// `pause`, `resume`, `shutdown`, `is_shutdown` mean the same thing for a
/// queue as they do for a [`crate::scheduler::JobScheduler`].
#[async_trait::async_trait]
pub trait JobQueue: Lifecycle {
    /// The queue's configured name.
    fn name(&self) -> &str;

    /// Enqueue a job at the tail.
    ///
    /// A bounded memory queue at capacity evicts the head to make room
    /// (lossy under memory pressure); a durable queue never drops jobs but
    /// surfaces backing-store failures here.
    async fn put(&self, job: Job) -> Result<()>;

    /// Dequeue the head job, if the queue is running and non-empty.
    ///
    /// Returns `None` if the queue is paused, shut down, or has nothing
    /// pending right now — callers should treat `None` as "retry soon",
    /// not as a terminal signal.
    async fn get(&self) -> Option<Ticket>;

    /// Finalize removal of the entry behind `token`.
    ///
    /// Returns [`crate::error::KestrelError::DoubleAck`] if the token does
    /// not correspond to a currently in-flight entry (already acked, or
    /// never issued by this queue).
    async fn ack(&self, token: AckToken) -> Result<()>;

    /// Current pending count. Does not include in-flight (dequeued but
    /// not yet acked) entries.
    fn size(&self) -> usize;

    /// Register a drain-into relation: entries at least `delay` old
    /// become eligible for [`JobQueue::check_expiration`] to move onto
    /// `target`.
    fn drain_to(&self, target: Arc<dyn JobQueue>, delay: Duration);

    /// Transfer up to `flush_limit` expired entries onto the configured
    /// drain target, oldest first. Stops early if the next entry isn't
    /// expired yet. Returns the number of entries transferred.
    async fn check_expiration(&self, flush_limit: usize) -> Result<usize>;
}
