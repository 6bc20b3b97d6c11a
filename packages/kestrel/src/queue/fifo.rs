//! Shared FIFO bookkeeping used by both queue variants.
//!
//! Both [`super::MemoryJobQueue`] and [`super::DurableJobQueue`] need the same
//! pending/in-flight bookkeeping, age tracking for drain, and lifecycle
//! state; they differ only in whether `put`/`ack` also touch a backing
//! store. This is composed into each variant as a field, not pulled in
//! through a common base class.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Notify;

use super::{AckToken, QueueEntry, Ticket};
use crate::error::{KestrelError, Result};
use crate::lifecycle::LifecycleState;
use crate::queue::JobQueue;

/// How long `get()` waits on an empty queue before returning `None`.
/// Bounds how long a call can block internally waiting on new work.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

pub(crate) struct Fifo {
    pending: Mutex<VecDeque<QueueEntry>>,
    inflight: Mutex<HashSet<u64>>,
    next_id: AtomicU64,
    pub(crate) state: LifecycleState,
    notify: Notify,
    drain: Mutex<Option<(Arc<dyn JobQueue>, Duration)>>,
}

impl Fifo {
    pub(crate) fn new() -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
            inflight: Mutex::new(HashSet::new()),
            next_id: AtomicU64::new(1),
            state: LifecycleState::new(),
            notify: Notify::new(),
            drain: Mutex::new(None),
        }
    }

    /// Rebuild from replayed durable entries, preserving their original
    /// `entry_id`/`enqueued_at` and advancing `next_id` past the highest seen.
    pub(crate) fn restore(entries: VecDeque<QueueEntry>, max_id: u64) -> Self {
        let fifo = Self::new();
        *fifo.pending.lock().unwrap_or_else(|e| e.into_inner()) = entries;
        fifo.next_id.store(max_id + 1, Ordering::SeqCst);
        fifo
    }

    pub(crate) fn next_entry_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Push a fresh entry, evicting the oldest pending entry first if
    /// `size_limit` is non-zero and already at capacity. Returns the
    /// evicted entry, if any.
    pub(crate) fn push(&self, entry: QueueEntry, size_limit: usize) -> Option<QueueEntry> {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        let evicted = if size_limit > 0 && pending.len() >= size_limit {
            pending.pop_front()
        } else {
            None
        };
        pending.push_back(entry);
        drop(pending);
        self.notify.notify_one();
        evicted
    }

    fn try_pop(&self) -> Option<QueueEntry> {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        let entry = pending.pop_front()?;
        drop(pending);
        self.inflight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(entry.entry_id);
        Some(entry)
    }

    pub(crate) async fn get(&self) -> Option<Ticket> {
        if !self.state.is_running() {
            return None;
        }
        if let Some(entry) = self.try_pop() {
            return Some(Ticket::new(entry.job, AckToken(entry.entry_id)));
        }
        let notified = self.notify.notified();
        let _ = tokio::time::timeout(POLL_INTERVAL, notified).await;
        if !self.state.is_running() {
            return None;
        }
        self.try_pop()
            .map(|entry| Ticket::new(entry.job, AckToken(entry.entry_id)))
    }

    pub(crate) fn ack(&self, token: AckToken) -> Result<()> {
        let mut inflight = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
        if inflight.remove(&token.0) {
            Ok(())
        } else {
            Err(KestrelError::DoubleAck)
        }
    }

    pub(crate) fn size(&self) -> usize {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub(crate) fn drain_to(&self, target: Arc<dyn JobQueue>, delay: Duration) {
        *self.drain.lock().unwrap_or_else(|e| e.into_inner()) = Some((target, delay));
    }

    pub(crate) fn wake(&self) {
        self.notify.notify_waiters();
    }

    /// Pop up to `flush_limit` expired entries off the front, oldest
    /// first, stopping at the first entry that isn't expired yet. Caller
    /// is responsible for actually enqueueing them onto the drain target.
    pub(crate) fn pop_expired(&self, flush_limit: usize) -> Vec<QueueEntry> {
        let Some((_, delay)) = self.drain.lock().unwrap_or_else(|e| e.into_inner()).clone() else {
            return Vec::new();
        };
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        let mut popped = Vec::new();
        while popped.len() < flush_limit {
            let Some(front) = pending.front() else { break };
            let age = Utc::now().signed_duration_since(front.enqueued_at);
            let age = age.to_std().unwrap_or(Duration::ZERO);
            if age < delay {
                break;
            }
            popped.push(pending.pop_front().expect("front already checked"));
        }
        popped
    }

    pub(crate) fn drain_target(&self) -> Option<Arc<dyn JobQueue>> {
        self.drain
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|(target, _)| target.clone())
    }
}
