//! Terminal consumer for permanently-failing jobs.
//!
//! `put` failures here are logged and swallowed by the caller, never
//! allowed to take down a worker.

use std::sync::Mutex;

use crate::job::DeadJob;

/// A single operation consuming permanently-failed jobs. May be absent
/// (a `JobScheduler` with `bad_job_queue: None` simply drops such jobs
/// after logging).
#[async_trait::async_trait]
pub trait BadJobSink: Send + Sync {
    /// Consume a dead-lettered job.
    async fn put(&self, job: DeadJob) -> anyhow::Result<()>;
}

/// Default sink: a single structured log line per dead job.
pub struct LoggingBadJobSink;

#[async_trait::async_trait]
impl BadJobSink for LoggingBadJobSink {
    async fn put(&self, job: DeadJob) -> anyhow::Result<()> {
        tracing::error!(
            job_id = %job.id,
            job_type = job.job_type,
            error_count = job.error_count,
            error = job.error_message.as_deref().unwrap_or(""),
            "job exceeded error limit, dead-lettered"
        );
        Ok(())
    }
}

/// In-memory sink for tests: records everything it receives for later
/// inspection instead of discarding it.
#[derive(Default)]
pub struct MemoryBadJobSink {
    jobs: Mutex<Vec<DeadJob>>,
}

impl MemoryBadJobSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// All jobs received so far, in arrival order.
    pub fn jobs(&self) -> Vec<DeadJob> {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of jobs received so far.
    pub fn len(&self) -> usize {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether any jobs have been received.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl BadJobSink for MemoryBadJobSink {
    async fn put(&self, job: DeadJob) -> anyhow::Result<()> {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner()).push(job);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn sample(id: Uuid) -> DeadJob {
        DeadJob {
            id,
            job_type: "test:job",
            description: "a job".to_string(),
            error_count: 4,
            error_message: Some("boom".to_string()),
        }
    }

    #[tokio::test]
    async fn memory_sink_records_jobs() {
        let sink = MemoryBadJobSink::new();
        assert!(sink.is_empty());

        let id = Uuid::new_v4();
        sink.put(sample(id)).await.unwrap();

        assert_eq!(sink.len(), 1);
        assert_eq!(sink.jobs()[0].id, id);
    }
}
