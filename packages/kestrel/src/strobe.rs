//! Periodic expiration-driven retry task.
//!
//! One background task per [`crate::scheduler::JobScheduler`]. Runs
//! independently of worker pause state: replaying matured error entries
//! during a quiescent period is desirable, so by default the strobe keeps
//! ticking while workers are torn down (see `strobe_runs_while_paused` in
//! [`crate::scheduler::SchedulerConfig`]).

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::SmallRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::queue::JobQueue;

/// Compute `strobe_interval + jitter`, jitter drawn from
/// `round(strobe_interval_ms * jitter_rate * G)` with `G ~ N(0, 1)`,
/// clamped so the result is never negative.
fn jittered_interval(base: Duration, jitter_rate: f64, rng: &mut SmallRng) -> Duration {
    let g: f64 = StandardNormal.sample(rng);
    let base_ms = base.as_millis() as f64;
    let jitter_ms = (base_ms * jitter_rate * g).round();
    let total_ms = (base_ms + jitter_ms).max(0.0);
    Duration::from_millis(total_ms as u64)
}

/// Handle to the spawned strobe task.
pub(crate) struct RetryStrobe {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

impl RetryStrobe {
    /// Spawn the strobe loop against `error_queue`, transferring up to
    /// `flush_limit` matured entries per cycle.
    pub(crate) fn spawn(
        error_queue: Arc<dyn JobQueue>,
        strobe_interval: Duration,
        jitter_rate: f64,
        flush_limit: usize,
    ) -> Self {
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut rng = SmallRng::from_entropy();
            loop {
                let sleep_for = jittered_interval(strobe_interval, jitter_rate, &mut rng);
                tokio::select! {
                    _ = task_cancel.cancelled() => return,
                    _ = tokio::time::sleep(sleep_for) => {}
                }

                if task_cancel.is_cancelled() {
                    return;
                }

                if let Err(e) = error_queue.check_expiration(flush_limit).await {
                    tracing::warn!(error = %e, "retry strobe check_expiration failed");
                }
            }
        });

        Self {
            handle,
            cancel,
        }
    }

    /// Signal the strobe to stop and wait for it to exit.
    pub(crate) async fn shutdown(self) {
        self.cancel.cancel();
        let _ = self.handle.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_never_produces_negative_duration() {
        let mut rng = SmallRng::seed_from_u64(7);
        for _ in 0..1000 {
            let interval = jittered_interval(Duration::from_millis(100), 5.0, &mut rng);
            assert!(interval >= Duration::ZERO);
        }
    }

    #[test]
    fn zero_jitter_rate_is_deterministic() {
        let mut rng = SmallRng::seed_from_u64(1);
        let interval = jittered_interval(Duration::from_millis(250), 0.0, &mut rng);
        assert_eq!(interval, Duration::from_millis(250));
    }
}
