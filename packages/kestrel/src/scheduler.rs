//! Single-priority scheduler: composes a primary queue, an error
//! queue, a worker pool, a retry strobe and an optional bad-job sink.
//!
//! ## Lifecycle state machine
//!
//! | From | Input | To | Effect |
//! |---|---|---|---|
//! | Fresh | start | Running | start both queues; spawn workers; start strobe |
//! | Running | pause | Paused | pause both queues; tear down workers; strobe keeps running |
//! | Paused | resume | Running | resume both queues; respawn workers |
//! | Running | shutdown | Shutdown | shutdown queues; tear down workers; shutdown strobe |
//! | Paused | shutdown | Shutdown | as above |
//! | any | start on already-running | unchanged | idempotent no-op |
//! | Shutdown | any | Shutdown | no-op; terminal |
//!
//! `is_shutdown` mirrors `primary_queue.is_shutdown()` rather than a
//! free-standing flag, so an externally-shutdown queue stays observable
//! through the scheduler.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;

use crate::error::Result;
use crate::job::Job;
use crate::lifecycle::{Lifecycle, LifecycleState, State};
use crate::metrics::{AtomicMetrics, MetricsSnapshot, SchedulerMetrics};
use crate::pool::{self, WorkerContext, WorkerPool};
use crate::queue::JobQueue;
use crate::sink::BadJobSink;
use crate::strobe::RetryStrobe;

/// Immutable per-scheduler tuning, set at construction.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Worker task count.
    pub thread_count: usize,
    /// Mean retry strobe period.
    pub strobe_interval: Duration,
    /// `errorCount` threshold past which a job is dead-lettered.
    pub error_limit: u32,
    /// Max entries the strobe moves from error to primary per cycle.
    pub flush_limit: usize,
    /// Standard deviation multiplier applied to strobe jitter.
    pub jitter_rate: f64,
    /// Minimum age before an error-queue entry is drain-eligible.
    pub error_delay: Duration,
    /// Whether the strobe keeps running while the scheduler is paused.
    /// Defaults to `true`: replaying matured errors during a quiescent
    /// period is desirable, so pausing workers does not by itself pause
    /// retry replay.
    pub strobe_runs_while_paused: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            thread_count: 4,
            strobe_interval: Duration::from_secs(30),
            error_limit: 3,
            flush_limit: 50,
            jitter_rate: 0.1,
            error_delay: Duration::from_secs(60),
            strobe_runs_while_paused: true,
        }
    }
}

/// Point-in-time introspection snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Counters from [`AtomicMetrics`].
    pub metrics: MetricsSnapshot,
    /// Primary queue pending count.
    pub primary_size: usize,
    /// Error queue pending count.
    pub error_size: usize,
    /// In-flight job count.
    pub active_threads: usize,
}

/// The single-priority scheduler cluster: durable primary queue, delayed
/// error queue, bounded worker pool, periodic retry strobe, and an
/// optional bad-job sink.
pub struct JobScheduler {
    primary_queue: Arc<dyn JobQueue>,
    error_queue: Arc<dyn JobQueue>,
    bad_job_queue: Option<Arc<dyn BadJobSink>>,
    metrics: Arc<dyn SchedulerMetrics>,
    config: SchedulerConfig,
    state: LifecycleState,
    // Worker pool and strobe are only present while Running/Paused (strobe
    // may outlive a pause per `strobe_runs_while_paused`); guarded by a
    // single async mutex since lifecycle transitions are single-writer
    // and not expected to contend under normal use.
    runtime: AsyncMutex<Option<Runtime>>,
}

struct Runtime {
    pool: Option<WorkerPool>,
    strobe: Option<RetryStrobe>,
}

impl JobScheduler {
    /// Compose a scheduler from its collaborators, with its own private
    /// [`AtomicMetrics`] sink. `error_queue` is wired to drain onto
    /// `primary_queue` after `config.error_delay` as part of construction.
    pub fn new(
        primary_queue: Arc<dyn JobQueue>,
        error_queue: Arc<dyn JobQueue>,
        bad_job_queue: Option<Arc<dyn BadJobSink>>,
        config: SchedulerConfig,
    ) -> Self {
        Self::with_metrics(
            primary_queue,
            error_queue,
            bad_job_queue,
            config,
            Arc::new(AtomicMetrics::new()),
        )
    }

    /// Compose a scheduler against an injected counter sink, so several
    /// schedulers (e.g. one per priority in a
    /// [`crate::priority::PrioritizingJobScheduler`]) can share one
    /// process-wide [`SchedulerMetrics`] instance instead of each keeping
    /// its own and requiring callers to sum `stats()` after the fact.
    pub fn with_metrics(
        primary_queue: Arc<dyn JobQueue>,
        error_queue: Arc<dyn JobQueue>,
        bad_job_queue: Option<Arc<dyn BadJobSink>>,
        config: SchedulerConfig,
        metrics: Arc<dyn SchedulerMetrics>,
    ) -> Self {
        error_queue.drain_to(primary_queue.clone(), config.error_delay);
        Self {
            primary_queue,
            error_queue,
            bad_job_queue,
            metrics,
            config,
            state: LifecycleState::new(),
            runtime: AsyncMutex::new(None),
        }
    }

    /// Submit a job onto the primary queue.
    pub async fn put(&self, job: Job) -> Result<()> {
        self.primary_queue.put(job).await
    }

    /// Immediate, unconditional drain of the error queue back onto the
    /// primary queue, bounded by the error queue's size observed at
    /// entry. Distinct from the strobe: this is a synchronous
    /// administrative operation, not a background cycle.
    pub async fn retry_errors(&self) -> Result<usize> {
        pool::retry_errors(self.error_queue.as_ref(), self.primary_queue.as_ref()).await
    }

    /// Point-in-time counters and queue sizes.
    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            metrics: self.metrics.snapshot(),
            primary_size: self.primary_queue.size(),
            error_size: self.error_queue.size(),
            active_threads: self.active_threads(),
        }
    }

    fn active_threads(&self) -> usize {
        // Synchronous path: peek without awaiting the runtime mutex by
        // caching the last known count. Workers hold their own atomic;
        // expose it through a best-effort try_lock so `stats()` stays a
        // plain (non-async) read as the rest of the introspection API is.
        match self.runtime.try_lock() {
            Ok(guard) => guard
                .as_ref()
                .and_then(|rt| rt.pool.as_ref())
                .map(WorkerPool::active_threads)
                .unwrap_or(0),
            Err(_) => 0,
        }
    }

    fn worker_context(&self) -> Arc<WorkerContext> {
        let metrics = self.metrics.clone();
        Arc::new(WorkerContext {
            primary_queue: self.primary_queue.clone(),
            error_queue: self.error_queue.clone(),
            bad_job_queue: self.bad_job_queue.clone(),
            metrics,
            error_limit: self.config.error_limit,
        })
    }

    async fn spawn_workers(&self) -> WorkerPool {
        WorkerPool::spawn(self.config.thread_count, self.worker_context())
    }

    async fn spawn_strobe(&self) -> RetryStrobe {
        RetryStrobe::spawn(
            self.error_queue.clone(),
            self.config.strobe_interval,
            self.config.jitter_rate,
            self.config.flush_limit,
        )
    }
}

#[async_trait::async_trait]
impl Lifecycle for JobScheduler {
    async fn start(&self) -> Result<()> {
        if self.state.current() == State::Shutdown {
            return Ok(());
        }
        if self.state.current() == State::Running {
            return Ok(());
        }

        self.primary_queue.start().await?;
        self.error_queue.start().await?;

        let pool = self.spawn_workers().await;
        let strobe = self.spawn_strobe().await;
        *self.runtime.lock().await = Some(Runtime {
            pool: Some(pool),
            strobe: Some(strobe),
        });

        self.state.start();
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        if self.state.current() != State::Running {
            return Ok(());
        }

        self.primary_queue.pause().await?;
        self.error_queue.pause().await?;

        let mut guard = self.runtime.lock().await;
        if let Some(runtime) = guard.as_mut() {
            if let Some(pool) = runtime.pool.take() {
                pool.shutdown().await;
            }
            if !self.config.strobe_runs_while_paused {
                if let Some(strobe) = runtime.strobe.take() {
                    strobe.shutdown().await;
                }
            }
        }
        drop(guard);

        self.state.pause();
        Ok(())
    }

    async fn resume(&self) -> Result<()> {
        if self.state.current() != State::Paused {
            return Ok(());
        }

        self.primary_queue.resume().await?;
        self.error_queue.resume().await?;

        let pool = self.spawn_workers().await;
        let strobe_needed = {
            let guard = self.runtime.lock().await;
            guard.as_ref().map(|rt| rt.strobe.is_none()).unwrap_or(true)
        };
        let fresh_strobe = if strobe_needed {
            Some(self.spawn_strobe().await)
        } else {
            None
        };

        let mut guard = self.runtime.lock().await;
        if let Some(runtime) = guard.as_mut() {
            runtime.pool = Some(pool);
            if let Some(strobe) = fresh_strobe {
                runtime.strobe = Some(strobe);
            }
        }
        drop(guard);

        self.state.resume();
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        if self.state.current() == State::Shutdown {
            return Ok(());
        }

        self.primary_queue.shutdown().await?;
        self.error_queue.shutdown().await?;

        let runtime = self.runtime.lock().await.take();
        if let Some(runtime) = runtime {
            if let Some(pool) = runtime.pool {
                pool.shutdown().await;
            }
            if let Some(strobe) = runtime.strobe {
                strobe.shutdown().await;
            }
        }

        self.state.shutdown();
        Ok(())
    }

    fn is_shutdown(&self) -> bool {
        self.primary_queue.is_shutdown()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::tests_support::ScriptedJob;
    use crate::job::ClassifiedError;
    use crate::queue::MemoryJobQueue;
    use crate::sink::MemoryBadJobSink;

    fn scheduler(config: SchedulerConfig, sink: Arc<MemoryBadJobSink>) -> JobScheduler {
        let primary = Arc::new(MemoryJobQueue::new("primary"));
        let errors = Arc::new(MemoryJobQueue::new("errors"));
        JobScheduler::new(primary, errors, Some(sink), config)
    }

    #[tokio::test]
    async fn permanent_failure_dead_letters_after_error_limit() {
        let sink = Arc::new(MemoryBadJobSink::new());
        let config = SchedulerConfig {
            thread_count: 1,
            error_limit: 2,
            strobe_interval: Duration::from_secs(3600),
            ..Default::default()
        };
        let sched = scheduler(config, sink.clone());
        sched.start().await.unwrap();

        sched
            .put(Job::new(ScriptedJob::new(vec![
                Err(ClassifiedError::Other("boom".into())),
                Err(ClassifiedError::Other("boom".into())),
                Err(ClassifiedError::Other("boom".into())),
            ])))
            .await
            .unwrap();

        // Let the worker drain through all three attempts via the error
        // queue's own retry path. Poll rather than sleep a fixed amount so
        // this isn't a timing-flaky test.
        for _ in 0..200 {
            if !sink.is_empty() {
                break;
            }
            sched.retry_errors().await.unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        sched.shutdown().await.unwrap();
        assert_eq!(sink.len(), 1);
    }

    #[tokio::test]
    async fn shutdown_zeroes_active_threads() {
        let sink = Arc::new(MemoryBadJobSink::new());
        let sched = scheduler(SchedulerConfig::default(), sink);
        sched.start().await.unwrap();
        sched.shutdown().await.unwrap();
        assert_eq!(sched.active_threads(), 0);
        assert!(sched.is_shutdown());
    }

    #[tokio::test]
    async fn start_is_idempotent_when_already_running() {
        let sink = Arc::new(MemoryBadJobSink::new());
        let sched = scheduler(SchedulerConfig::default(), sink);
        sched.start().await.unwrap();
        sched.start().await.unwrap();
        sched.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_after_shutdown_is_noop() {
        let sink = Arc::new(MemoryBadJobSink::new());
        let sched = scheduler(SchedulerConfig::default(), sink);
        sched.start().await.unwrap();
        sched.shutdown().await.unwrap();
        sched.shutdown().await.unwrap();
        assert!(sched.is_shutdown());
    }

    #[tokio::test]
    async fn with_metrics_shares_one_sink_across_schedulers() {
        let shared: Arc<AtomicMetrics> = Arc::new(AtomicMetrics::new());

        let build = |shared: Arc<AtomicMetrics>| {
            let primary = Arc::new(MemoryJobQueue::new("primary"));
            let errors = Arc::new(MemoryJobQueue::new("errors"));
            let config = SchedulerConfig {
                thread_count: 1,
                strobe_interval: Duration::from_secs(3600),
                ..Default::default()
            };
            JobScheduler::with_metrics(primary, errors, None, config, shared)
        };

        let low = build(shared.clone());
        let high = build(shared.clone());
        low.start().await.unwrap();
        high.start().await.unwrap();

        low.put(Job::new(ScriptedJob::new(vec![Ok(())]))).await.unwrap();
        high.put(Job::new(ScriptedJob::new(vec![Ok(())]))).await.unwrap();

        for _ in 0..200 {
            if shared.snapshot().success == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(shared.snapshot().success, 2);

        low.shutdown().await.unwrap();
        high.shutdown().await.unwrap();
    }
}
