//! Shared process-lifecycle contract.
//!
//! [`JobQueue`](crate::queue::JobQueue), [`JobScheduler`](crate::scheduler::JobScheduler)
//! and [`PrioritizingJobScheduler`](crate::priority::PrioritizingJobScheduler) all
//! expose the same start/pause/resume/shutdown/is_shutdown protocol. This module
//! provides the trait plus a small internal state machine the concrete queue
//! implementations share, rather than duplicating a four-state enum in each one.

use std::sync::Mutex;

use crate::error::Result;

/// The four lifecycle states a [`JobQueue`](crate::queue::JobQueue) or
/// [`JobScheduler`](crate::scheduler::JobScheduler) can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Constructed but never started.
    Fresh,
    /// Accepting `get`/dispatching work.
    Running,
    /// Not emitting tickets, but not terminal.
    Paused,
    /// Terminal. No further transitions are possible.
    Shutdown,
}

/// Shared lifecycle protocol implemented by queues and schedulers alike.
#[async_trait::async_trait]
pub trait Lifecycle: Send + Sync {
    /// Transition to `Running`. Idempotent when already running.
    async fn start(&self) -> Result<()>;
    /// Transition to `Paused`. No-op from `Fresh`/`Shutdown`.
    async fn pause(&self) -> Result<()>;
    /// Transition back to `Running` from `Paused`.
    async fn resume(&self) -> Result<()>;
    /// Transition to the terminal `Shutdown` state. Idempotent.
    async fn shutdown(&self) -> Result<()>;
    /// Whether this component has reached the terminal state.
    fn is_shutdown(&self) -> bool;
}

/// Small synchronized state machine reused by both queue variants.
///
/// Transitions are cheap, synchronous critical sections (an `enum` swap
/// behind a [`Mutex`]), so a plain `std::sync::Mutex` is used rather than
/// an async one — consistent with how the rest of this crate treats
/// short, non-blocking state reads.
pub struct LifecycleState {
    inner: Mutex<State>,
}

impl LifecycleState {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(State::Fresh),
        }
    }

    fn set(&self, to: State) -> bool {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if *guard == State::Shutdown {
            return false;
        }
        *guard = to;
        true
    }

    pub fn start(&self) -> bool {
        self.set(State::Running)
    }

    pub fn pause(&self) -> bool {
        self.set(State::Paused)
    }

    pub fn resume(&self) -> bool {
        self.set(State::Running)
    }

    pub fn shutdown(&self) -> bool {
        self.set(State::Shutdown)
    }

    pub fn current(&self) -> State {
        *self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_running(&self) -> bool {
        self.current() == State::Running
    }

    pub fn is_shutdown(&self) -> bool {
        self.current() == State::Shutdown
    }
}

impl Default for LifecycleState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shutdown_is_terminal() {
        let state = LifecycleState::new();
        assert!(state.shutdown());
        assert!(!state.start());
        assert!(!state.resume());
        assert_eq!(state.current(), State::Shutdown);
    }

    #[test]
    fn pause_resume_cycle() {
        let state = LifecycleState::new();
        assert!(state.start());
        assert!(state.is_running());
        assert!(state.pause());
        assert!(!state.is_running());
        assert!(state.resume());
        assert!(state.is_running());
    }
}
