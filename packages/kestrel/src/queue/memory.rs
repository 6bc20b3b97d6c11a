//! Bounded, in-process [`JobQueue`] variant.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use super::fifo::Fifo;
use super::{AckToken, JobQueue, QueueEntry, Ticket};
use crate::error::Result;
use crate::job::Job;
use crate::lifecycle::Lifecycle;

/// In-memory FIFO with an optional capacity bound.
///
/// `put` on a full bounded queue (`size_limit > 0`) evicts the head entry
/// to make room — a lossy FIFO under memory pressure, by design: this
/// variant trades durability for zero I/O.
pub struct MemoryJobQueue {
    name: String,
    size_limit: usize,
    fifo: Fifo,
}

impl MemoryJobQueue {
    /// Create an unbounded memory queue.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_size_limit(name, 0)
    }

    /// Create a memory queue bounded to `size_limit` pending entries
    /// (`0` means unbounded).
    pub fn with_size_limit(name: impl Into<String>, size_limit: usize) -> Self {
        Self {
            name: name.into(),
            size_limit,
            fifo: Fifo::new(),
        }
    }
}

#[async_trait::async_trait]
impl Lifecycle for MemoryJobQueue {
    async fn start(&self) -> Result<()> {
        self.fifo.state.start();
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        self.fifo.state.pause();
        self.fifo.wake();
        Ok(())
    }

    async fn resume(&self) -> Result<()> {
        self.fifo.state.resume();
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        self.fifo.state.shutdown();
        self.fifo.wake();
        Ok(())
    }

    fn is_shutdown(&self) -> bool {
        self.fifo.state.is_shutdown()
    }
}

#[async_trait::async_trait]
impl JobQueue for MemoryJobQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn put(&self, job: Job) -> Result<()> {
        let entry = QueueEntry {
            entry_id: self.fifo.next_entry_id(),
            job,
            enqueued_at: Utc::now(),
        };
        self.fifo.push(entry, self.size_limit);
        Ok(())
    }

    async fn get(&self) -> Option<Ticket> {
        self.fifo.get().await
    }

    async fn ack(&self, token: AckToken) -> Result<()> {
        self.fifo.ack(token)
    }

    fn size(&self) -> usize {
        self.fifo.size()
    }

    fn drain_to(&self, target: Arc<dyn JobQueue>, delay: Duration) {
        self.fifo.drain_to(target, delay);
    }

    async fn check_expiration(&self, flush_limit: usize) -> Result<usize> {
        let expired = self.fifo.pop_expired(flush_limit);
        let count = expired.len();
        if count == 0 {
            return Ok(0);
        }
        let Some(target) = self.fifo.drain_target() else {
            return Ok(0);
        };
        for entry in expired {
            target.put(entry.job).await?;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::tests_support::ScriptedJob;

    #[tokio::test]
    async fn put_get_ack_round_trip() {
        let queue = MemoryJobQueue::new("primary");
        queue.start().await.unwrap();

        queue.put(Job::new(ScriptedJob::new(vec![Ok(())]))).await.unwrap();
        assert_eq!(queue.size(), 1);

        let ticket = queue.get().await.expect("job should be available");
        assert_eq!(queue.size(), 0);

        let (_, token) = ticket.split();
        queue.ack(token).await.unwrap();
    }

    #[tokio::test]
    async fn double_ack_is_rejected() {
        let queue = MemoryJobQueue::new("primary");
        queue.start().await.unwrap();
        queue.put(Job::new(ScriptedJob::new(vec![Ok(())]))).await.unwrap();

        let ticket = queue.get().await.unwrap();
        let (_, token) = ticket.split();
        queue.ack(token).await.unwrap();

        assert!(queue.ack(token).await.is_err());
    }

    #[tokio::test]
    async fn bounded_queue_evicts_head_on_overflow() {
        let queue = MemoryJobQueue::with_size_limit("primary", 2);
        queue.start().await.unwrap();

        for _ in 0..3 {
            queue.put(Job::new(ScriptedJob::new(vec![Ok(())]))).await.unwrap();
        }

        assert_eq!(queue.size(), 2);
    }

    #[tokio::test]
    async fn paused_queue_emits_no_tickets() {
        let queue = MemoryJobQueue::new("primary");
        queue.start().await.unwrap();
        queue.put(Job::new(ScriptedJob::new(vec![Ok(())]))).await.unwrap();
        queue.pause().await.unwrap();

        assert!(queue.get().await.is_none());
    }

    #[tokio::test]
    async fn drain_moves_expired_entries_to_target() {
        let primary = Arc::new(MemoryJobQueue::new("primary"));
        let error_queue = MemoryJobQueue::new("errors");
        error_queue.drain_to(primary.clone(), Duration::from_millis(0));
        error_queue.start().await.unwrap();

        error_queue
            .put(Job::new(ScriptedJob::new(vec![Ok(())])))
            .await
            .unwrap();

        let moved = error_queue.check_expiration(10).await.unwrap();
        assert_eq!(moved, 1);
        assert_eq!(error_queue.size(), 0);
        assert_eq!(primary.size(), 1);
    }
}
