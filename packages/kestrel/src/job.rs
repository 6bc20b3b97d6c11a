//! Job interfaces: opaque payloads with mutable error metadata.
//!
//! A policy-light split between interface and policy: `JobBody` carries
//! only the capability set an executor needs (`execute`, `describe`, and
//! the `job_type`/`to_json` pair a durable queue needs to round-trip it),
//! never a handling strategy.

use serde_json::Value;
use uuid::Uuid;

/// The three execution-failure classifications that determine routing.
///
/// See the scheduler's classification branch in
/// [`crate::pool`] for how each variant is handled.
#[derive(Debug, Clone)]
pub enum ClassifiedError {
    /// The job's target is permanently unreachable. Drop silently, don't retry.
    Blackhole,
    /// The target is present but transiently refusing work. Re-queue without
    /// incrementing `error_count`.
    Rejected,
    /// Any other failure. Increments `error_count`; dead-lettered once the
    /// configured `error_limit` is exceeded.
    Other(String),
}

impl std::fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClassifiedError::Blackhole => write!(f, "blackhole"),
            ClassifiedError::Rejected => write!(f, "rejected"),
            ClassifiedError::Other(msg) => write!(f, "{msg}"),
        }
    }
}

/// The opaque, executable payload of a [`Job`].
///
/// Implementers own their business semantics entirely; the engine only
/// ever calls `execute`, `describe`, `job_type`, and `to_json`. `to_json`
/// only needs to round-trip through a matching [`crate::codec::CodecRegistry`]
/// entry when a job travels through a [`crate::queue::DurableJobQueue`] —
/// memory-only callers may return any stable value.
#[async_trait::async_trait]
pub trait JobBody: Send + Sync {
    /// Run the job's effect. Completion is success; a raised
    /// [`ClassifiedError`] determines how the pool routes the job next.
    async fn execute(&self) -> Result<(), ClassifiedError>;

    /// Human-readable description used in log lines and dead-letter entries.
    fn describe(&self) -> String;

    /// Stable type tag used to look the body's deserializer up in a
    /// [`crate::codec::CodecRegistry`].
    fn job_type(&self) -> &'static str;

    /// Serialize this body's data (not its behavior) for durable storage.
    fn to_json(&self) -> Value;
}

/// Opaque unit of work with mutable error metadata.
///
/// Owned by whichever queue currently holds it; after a worker dequeues a
/// [`crate::queue::Ticket`] the job is owned by the worker until it is
/// acknowledged or re-enqueued.
pub struct Job {
    /// Unique identifier, stable across durable persistence and restarts.
    pub id: Uuid,
    /// The executable payload.
    pub body: Box<dyn JobBody>,
    /// Number of "Other" classified failures observed so far.
    pub error_count: u32,
    /// Human description of the most recent "Other" failure, if any.
    pub error_message: Option<String>,
}

impl Job {
    /// Wrap a job body as a fresh job with zeroed error metadata.
    pub fn new(body: impl JobBody + 'static) -> Self {
        Self {
            id: Uuid::new_v4(),
            body: Box::new(body),
            error_count: 0,
            error_message: None,
        }
    }

    /// Reconstruct a job from its durable parts (used by codecs on decode).
    pub fn from_parts(
        id: Uuid,
        body: Box<dyn JobBody>,
        error_count: u32,
        error_message: Option<String>,
    ) -> Self {
        Self {
            id,
            body,
            error_count,
            error_message,
        }
    }

    /// The job body's stable type tag.
    pub fn job_type(&self) -> &'static str {
        self.body.job_type()
    }

    /// Human-readable description, forwarded to the job body.
    pub fn describe(&self) -> String {
        self.body.describe()
    }
}

/// Snapshot of a job that exceeded `error_limit`, handed to a
/// [`crate::sink::BadJobSink`].
///
/// Carries a description rather than the live [`Job`] because the job's
/// `JobBody` is not necessarily serializable beyond its `to_json`
/// projection, and the sink is a terminal, out-of-band consumer that has
/// no further use for the executable behavior.
#[derive(Debug, Clone)]
pub struct DeadJob {
    /// The job's id.
    pub id: Uuid,
    /// The job body's type tag.
    pub job_type: &'static str,
    /// Human description, from `JobBody::describe`.
    pub description: String,
    /// Error count at the time of dead-lettering.
    pub error_count: u32,
    /// Most recent error message, if any.
    pub error_message: Option<String>,
}

impl DeadJob {
    /// Snapshot a [`Job`] for handoff to a bad-job sink.
    pub fn from_job(job: &Job) -> Self {
        Self {
            id: job.id,
            job_type: job.job_type(),
            description: job.describe(),
            error_count: job.error_count,
            error_message: job.error_message.clone(),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests_support {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// A job body whose outcome is scripted call-by-call, for scheduler tests.
    pub struct ScriptedJob {
        pub outcomes: std::sync::Mutex<std::collections::VecDeque<Result<(), ClassifiedError>>>,
        pub invocations: Arc<AtomicUsize>,
        pub label: &'static str,
    }

    impl ScriptedJob {
        pub fn new(outcomes: Vec<Result<(), ClassifiedError>>) -> Self {
            Self {
                outcomes: std::sync::Mutex::new(outcomes.into()),
                invocations: Arc::new(AtomicUsize::new(0)),
                label: "scripted",
            }
        }

        pub fn invocation_count(&self) -> usize {
            self.invocations.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl JobBody for ScriptedJob {
        async fn execute(&self) -> Result<(), ClassifiedError> {
            self.invocations.fetch_add(1, Ordering::SeqCst);
            let mut outcomes = self.outcomes.lock().unwrap_or_else(|e| e.into_inner());
            outcomes
                .pop_front()
                .unwrap_or(Err(ClassifiedError::Other("no more scripted outcomes".into())))
        }

        fn describe(&self) -> String {
            format!("scripted:{}", self.label)
        }

        fn job_type(&self) -> &'static str {
            "test:scripted"
        }

        fn to_json(&self) -> Value {
            serde_json::json!({})
        }
    }
}

#[cfg(test)]
mod tests {
    use super::tests_support::ScriptedJob;
    use super::*;

    #[test]
    fn dead_job_captures_snapshot() {
        let body = ScriptedJob::new(vec![]);
        let mut job = Job::new(body);
        job.error_count = 3;
        job.error_message = Some("boom".into());

        let dead = DeadJob::from_job(&job);
        assert_eq!(dead.id, job.id);
        assert_eq!(dead.error_count, 3);
        assert_eq!(dead.error_message.as_deref(), Some("boom"));
    }
}
