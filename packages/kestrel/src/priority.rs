//! Priority-partitioned fan-out over a fixed `priority -> JobScheduler` map.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{KestrelError, Result};
use crate::job::Job;
use crate::lifecycle::Lifecycle;
use crate::scheduler::{JobScheduler, SchedulerStats};

/// Routes submissions to the [`JobScheduler`] registered at a given
/// priority and fans lifecycle operations out across all of them.
///
/// The priority map is fixed at construction for the fan-out path; `update`
/// exists purely as a testing hook (gated behind `cfg(test)`) and must not
/// be called while any lifecycle transition is in progress — not
/// separately enforced, matching the documented UB-on-misuse contract.
pub struct PrioritizingJobScheduler {
    schedulers: HashMap<i32, Arc<JobScheduler>>,
}

impl PrioritizingJobScheduler {
    /// Build a fan-out over a fixed `priority -> scheduler` mapping.
    pub fn new(schedulers: HashMap<i32, Arc<JobScheduler>>) -> Self {
        Self { schedulers }
    }

    /// The scheduler registered at `priority`, for inspection.
    pub fn apply(&self, priority: i32) -> Option<Arc<JobScheduler>> {
        self.schedulers.get(&priority).cloned()
    }

    /// Route `job` to the scheduler registered at `priority`.
    pub async fn put(&self, priority: i32, job: Job) -> Result<()> {
        let scheduler = self
            .schedulers
            .get(&priority)
            .ok_or(KestrelError::UnknownPriority(priority))?;
        scheduler.put(job).await
    }

    /// Immediate administrative drain, fanned out to every member.
    /// Best-effort: every member is visited even after one fails; the
    /// first error observed (if any) is returned once all members have
    /// been attempted.
    pub async fn retry_errors(&self) -> Result<usize> {
        let mut total = 0;
        let mut first_error = None;
        for scheduler in self.schedulers.values() {
            match scheduler.retry_errors().await {
                Ok(moved) => total += moved,
                Err(e) if first_error.is_none() => first_error = Some(e),
                Err(_) => {}
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(total),
        }
    }

    /// Sum of `active_threads` across all members.
    pub fn active_threads(&self) -> usize {
        self.schedulers
            .values()
            .map(|s| s.stats().active_threads)
            .sum()
    }

    /// Sum of primary-queue sizes across all members.
    pub fn size(&self) -> usize {
        self.schedulers.values().map(|s| s.stats().primary_size).sum()
    }

    /// Per-priority stats snapshot.
    pub fn stats(&self) -> HashMap<i32, SchedulerStats> {
        self.schedulers
            .iter()
            .map(|(priority, scheduler)| (*priority, scheduler.stats()))
            .collect()
    }

    /// Testing-only mutator: replace or insert the scheduler registered at
    /// `priority`. Must not be called while any member's lifecycle
    /// transition is in progress.
    #[cfg(any(test, feature = "testing"))]
    pub fn update(&mut self, priority: i32, scheduler: Arc<JobScheduler>) {
        self.schedulers.insert(priority, scheduler);
    }
}

#[async_trait::async_trait]
impl Lifecycle for PrioritizingJobScheduler {
    async fn start(&self) -> Result<()> {
        let mut first_error = None;
        for scheduler in self.schedulers.values() {
            if let Err(e) = scheduler.start().await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    async fn pause(&self) -> Result<()> {
        let mut first_error = None;
        for scheduler in self.schedulers.values() {
            if let Err(e) = scheduler.pause().await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    async fn resume(&self) -> Result<()> {
        let mut first_error = None;
        for scheduler in self.schedulers.values() {
            if let Err(e) = scheduler.resume().await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    async fn shutdown(&self) -> Result<()> {
        let mut first_error = None;
        for scheduler in self.schedulers.values() {
            if let Err(e) = scheduler.shutdown().await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Conjunction: only `true` once every member reports shut down.
    fn is_shutdown(&self) -> bool {
        self.schedulers.values().all(|s| s.is_shutdown())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::tests_support::ScriptedJob;
    use crate::queue::MemoryJobQueue;
    use crate::scheduler::SchedulerConfig;
    use std::time::Duration;

    fn scheduler() -> Arc<JobScheduler> {
        let primary = Arc::new(MemoryJobQueue::new("primary"));
        let errors = Arc::new(MemoryJobQueue::new("errors"));
        let config = SchedulerConfig {
            strobe_interval: Duration::from_secs(3600),
            ..Default::default()
        };
        Arc::new(JobScheduler::new(primary, errors, None, config))
    }

    #[tokio::test]
    async fn put_routes_by_priority() {
        let mut map = HashMap::new();
        map.insert(1, scheduler());
        map.insert(5, scheduler());
        let fanout = PrioritizingJobScheduler::new(map);
        fanout.start().await.unwrap();

        fanout
            .put(5, Job::new(ScriptedJob::new(vec![Ok(())])))
            .await
            .unwrap();

        assert_eq!(fanout.apply(5).unwrap().stats().primary_size, 1);
        assert_eq!(fanout.apply(1).unwrap().stats().primary_size, 0);

        fanout.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn put_on_unknown_priority_fails() {
        let map = HashMap::new();
        let fanout = PrioritizingJobScheduler::new(map);
        let err = fanout
            .put(99, Job::new(ScriptedJob::new(vec![Ok(())])))
            .await
            .unwrap_err();
        assert!(matches!(err, KestrelError::UnknownPriority(99)));
    }

    #[tokio::test]
    async fn is_shutdown_is_conjunction_over_members() {
        let mut map = HashMap::new();
        map.insert(1, scheduler());
        map.insert(2, scheduler());
        let fanout = PrioritizingJobScheduler::new(map);
        fanout.start().await.unwrap();
        assert!(!fanout.is_shutdown());

        fanout.apply(1).unwrap().shutdown().await.unwrap();
        assert!(!fanout.is_shutdown());

        fanout.apply(2).unwrap().shutdown().await.unwrap();
        assert!(fanout.is_shutdown());
    }
}
