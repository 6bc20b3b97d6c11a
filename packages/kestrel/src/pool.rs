//! Bounded worker pool polling one primary queue.
//!
//! Each worker runs the classification loop: dequeue, execute, route by
//! [`ClassifiedError`] variant, ack last. Torn down entirely on
//! `pause`/`shutdown` and respawned fresh on `resume` — there is no paused
//! worker state to resume into; a worker task is disposable, not
//! suspendable.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::job::{ClassifiedError, Job};
use crate::metrics::SchedulerMetrics;
use crate::queue::JobQueue;
use crate::sink::BadJobSink;

/// Scope guard incrementing `active_threads` on construction and
/// decrementing it on drop, so a panic or early return mid-classification
/// still releases the count.
struct ActiveGuard<'a>(&'a AtomicUsize);

impl<'a> ActiveGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Everything a worker needs, shared across the pool's tasks.
pub(crate) struct WorkerContext {
    pub primary_queue: Arc<dyn JobQueue>,
    pub error_queue: Arc<dyn JobQueue>,
    pub bad_job_queue: Option<Arc<dyn BadJobSink>>,
    pub metrics: Arc<dyn SchedulerMetrics>,
    pub error_limit: u32,
}

/// A bounded set of long-lived worker tasks polling `primary_queue`.
pub(crate) struct WorkerPool {
    active_threads: Arc<AtomicUsize>,
    handles: Vec<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl WorkerPool {
    /// Spawn `thread_count` workers against `ctx`.
    pub(crate) fn spawn(thread_count: usize, ctx: Arc<WorkerContext>) -> Self {
        let active_threads = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();
        let mut handles = Vec::with_capacity(thread_count);

        for _ in 0..thread_count {
            let ctx = ctx.clone();
            let active_threads = active_threads.clone();
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                worker_loop(ctx, active_threads, cancel).await;
            }));
        }

        Self {
            active_threads,
            handles,
            cancel,
        }
    }

    /// Current in-flight job count across all workers in this pool.
    pub(crate) fn active_threads(&self) -> usize {
        self.active_threads.load(Ordering::SeqCst)
    }

    /// Signal every worker to stop polling once its current iteration
    /// finishes, and wait for all of them to exit.
    pub(crate) async fn shutdown(self) {
        self.cancel.cancel();
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

async fn worker_loop(
    ctx: Arc<WorkerContext>,
    active_threads: Arc<AtomicUsize>,
    cancel: CancellationToken,
) {
    loop {
        if cancel.is_cancelled() {
            return;
        }

        let ticket = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            ticket = ctx.primary_queue.get() => ticket,
        };

        let Some(ticket) = ticket else {
            continue;
        };

        let _guard = ActiveGuard::enter(&active_threads);
        let (job, token) = ticket.split();
        run_one(&ctx, job).await;
        if let Err(e) = ctx.primary_queue.ack(token).await {
            tracing::warn!(error = %e, "failed to ack primary queue entry after classification");
        }
    }
}

/// Execute one job and route it by its [`ClassifiedError`] outcome.
/// Ack of the *ticket* happens in the caller, after this returns, so that
/// any re-enqueue this function performs is durable before the original
/// entry is released.
async fn run_one(ctx: &WorkerContext, mut job: Job) {
    match job.body.execute().await {
        Ok(()) => {
            ctx.metrics.record_success();
        }
        Err(ClassifiedError::Blackhole) => {
            ctx.metrics.record_blackhole();
        }
        Err(ClassifiedError::Rejected) => {
            ctx.metrics.record_rejected();
            requeue(ctx, job).await;
        }
        Err(ClassifiedError::Other(message)) => {
            ctx.metrics.record_error();
            tracing::error!(job = %job.describe(), error = %message, "job execution failed");
            job.error_count += 1;
            job.error_message = Some(message);

            if job.error_count > ctx.error_limit {
                dead_letter(ctx, job).await;
            } else {
                requeue(ctx, job).await;
            }
        }
    }
}

async fn requeue(ctx: &WorkerContext, job: Job) {
    if let Err(e) = ctx.error_queue.put(job).await {
        tracing::warn!(error = %e, "failed to re-enqueue job onto error queue");
    }
}

async fn dead_letter(ctx: &WorkerContext, job: Job) {
    let dead = crate::job::DeadJob::from_job(&job);
    if let Some(sink) = &ctx.bad_job_queue {
        if let Err(e) = sink.put(dead).await {
            tracing::warn!(error = %e, "bad job sink rejected dead-lettered job");
        }
    } else {
        tracing::warn!(job = %job.describe(), "job exceeded error limit with no bad job sink configured");
    }
}

/// Unbounded, immediate administrative drain: repeatedly `get`/`put`/`ack`
/// from `source` onto `target`, bounded by the size observed at entry so a
/// live-lock from freshly re-errored jobs can't keep the loop running
/// forever.
pub(crate) async fn retry_errors(source: &dyn JobQueue, target: &dyn JobQueue) -> Result<usize> {
    let bound = source.size();
    let mut moved = 0;
    for _ in 0..bound {
        let Some(ticket) = source.get().await else {
            break;
        };
        let (job, token) = ticket.split();
        target.put(job).await?;
        source.ack(token).await?;
        moved += 1;
    }
    Ok(moved)
}
