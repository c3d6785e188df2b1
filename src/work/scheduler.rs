// src/work/scheduler.rs

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace, warn};

use crate::dag::sort::sort_by;
use crate::work::item::{WorkItem, WorkKey};
use crate::work::predicate::DependencyPredicate;

/// What [`WorkScheduler::offer`] did with an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    Accepted,
    /// A logically identical item is already pending.
    Duplicate,
    /// The scheduler is closed. The item is kept for
    /// [`leftovers`](WorkScheduler::leftovers) and will not run here.
    Parked,
}

impl Submission {
    pub fn is_accepted(self) -> bool {
        self == Submission::Accepted
    }
}

/// Pending list plus active set. Always accessed under one lock so the
/// blocked-score computation sees a consistent view of both.
#[derive(Debug, Default)]
struct QueueState {
    /// Pending items in the order fixed by the most recent sort.
    pending: Vec<WorkItem>,
    /// Items claimed by a worker and not yet completed.
    active: Vec<WorkItem>,
    /// Items offered after close, in arrival order.
    parked: Vec<WorkItem>,
    closed: bool,
}

impl QueueState {
    fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.active.is_empty()
    }

    /// Append `item` unless a duplicate is already pending.
    fn accept(&mut self, item: WorkItem) -> bool {
        if self.pending.iter().any(|p| p.is_duplicate_of(&item)) {
            trace!(item = %item, "duplicate of a pending item; rejected");
            return false;
        }
        if self.active.iter().any(|a| a.is_duplicate_of(&item)) {
            debug!(item = %item, "duplicate of an active item; accepted as re-trigger");
        }
        self.pending.push(item);
        true
    }

    fn park(&mut self, item: WorkItem) -> Submission {
        let known = self
            .pending
            .iter()
            .chain(self.parked.iter())
            .any(|p| p.is_duplicate_of(&item));
        if known {
            return Submission::Duplicate;
        }
        warn!(item = %item, "scheduler closed; item parked for recovery");
        self.parked.push(item);
        Submission::Parked
    }

    fn resort(&mut self, predicate: &dyn DependencyPredicate) {
        let pending = std::mem::take(&mut self.pending);
        self.pending = sort_by(pending, |a, b| predicate.depends_on(a, b));
    }

    /// 0 means runnable now. Otherwise the number of active items and
    /// earlier pending items the item at `idx` has to wait for.
    fn blocked_score(&self, idx: usize, predicate: &dyn DependencyPredicate) -> usize {
        let item = &self.pending[idx];

        let by_active = self
            .active
            .iter()
            .filter(|a| item.is_duplicate_of(a) || predicate.depends_on(item, a))
            .count();
        let by_pending = self.pending[..idx]
            .iter()
            .filter(|p| predicate.depends_on(item, p))
            .count();

        by_active + by_pending
    }

    /// Move the first runnable pending item into the active set.
    fn claim_next(&mut self, predicate: &dyn DependencyPredicate) -> Option<WorkItem> {
        let idx = (0..self.pending.len()).find(|&i| self.blocked_score(i, predicate) == 0)?;
        let item = self.pending.remove(idx);
        self.active.push(item.clone());
        debug!(
            item = %item,
            pending = self.pending.len(),
            active = self.active.len(),
            "work item claimed"
        );
        Some(item)
    }
}

/// Thread-safe, order-aware, blocking collection of work items.
///
/// Items move pending → active (on [`take`](Self::take) / `poll`) → removed
/// (on [`complete`](Self::complete)). A pending item is handed out only when
/// nothing in the active set, and nothing pending ahead of it, is something
/// it depends on according to the [`DependencyPredicate`].
///
/// One mutex guards all state. `available` wakes takers when something may
/// have become takeable; `idle` wakes [`wait_idle`](Self::wait_idle) callers.
pub struct WorkScheduler {
    state: Mutex<QueueState>,
    available: Condvar,
    idle: Condvar,
    predicate: Arc<dyn DependencyPredicate>,
}

impl fmt::Debug for WorkScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("WorkScheduler")
            .field("pending", &state.pending.len())
            .field("active", &state.active.len())
            .field("parked", &state.parked.len())
            .field("closed", &state.closed)
            .finish_non_exhaustive()
    }
}

impl WorkScheduler {
    pub fn new(predicate: Arc<dyn DependencyPredicate>) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            available: Condvar::new(),
            idle: Condvar::new(),
            predicate,
        }
    }

    /// Enqueue one item and report what happened to it.
    ///
    /// A duplicate of an *active* item is accepted. Once the scheduler is
    /// closed nothing is accepted, but the item is parked so that
    /// [`leftovers`](Self::leftovers) still returns it.
    pub fn offer(&self, item: WorkItem) -> Submission {
        let mut state = self.state.lock();
        if state.closed {
            return state.park(item);
        }
        if !state.accept(item) {
            return Submission::Duplicate;
        }
        state.resort(self.predicate.as_ref());
        drop(state);

        self.available.notify_one();
        Submission::Accepted
    }

    /// [`offer`](Self::offer), reduced to whether the item was accepted.
    pub fn submit(&self, item: WorkItem) -> bool {
        self.offer(item).is_accepted()
    }

    /// Enqueue many items under one lock, sorting once at the end.
    ///
    /// Used for crash recovery: reloaded items go through the same duplicate
    /// rejection as live submissions. Returns how many were accepted.
    pub fn submit_all(&self, items: impl IntoIterator<Item = WorkItem>) -> usize {
        let mut state = self.state.lock();
        if state.closed {
            let parked = items
                .into_iter()
                .map(|item| state.park(item))
                .filter(|outcome| *outcome == Submission::Parked)
                .count();
            debug!(parked, "submit_all on closed scheduler");
            return 0;
        }

        let accepted = items
            .into_iter()
            .map(|item| state.accept(item))
            .filter(|accepted| *accepted)
            .count();
        if accepted > 0 {
            state.resort(self.predicate.as_ref());
        }
        drop(state);

        debug!(accepted, "batch submitted");
        if accepted > 0 {
            self.available.notify_all();
        }
        accepted
    }

    /// Re-enqueue a failed active item as its next attempt.
    ///
    /// The original stays active until the caller completes it, so the
    /// retry is accepted as a duplicate of an active item and cannot be
    /// claimed before that completion.
    pub fn retry(&self, item: &WorkItem) -> Submission {
        let next = item.next_attempt();
        debug!(item = %item, retry = next.retry_count(), "re-enqueueing for retry");
        self.offer(next)
    }

    /// Block until a runnable item is available and claim it.
    ///
    /// Returns `None` once the scheduler is closed.
    pub fn take(&self) -> Option<WorkItem> {
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return None;
            }
            if let Some(item) = state.claim_next(self.predicate.as_ref()) {
                return Some(item);
            }
            self.available.wait(&mut state);
        }
    }

    /// Claim a runnable item if there is one right now.
    pub fn poll(&self) -> Option<WorkItem> {
        let mut state = self.state.lock();
        if state.closed {
            return None;
        }
        state.claim_next(self.predicate.as_ref())
    }

    /// Like [`take`](Self::take) but gives up after `timeout`.
    ///
    /// A timeout too large to express as a deadline waits like `take`.
    pub fn poll_timeout(&self, timeout: Duration) -> Option<WorkItem> {
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return None;
            }
            if let Some(item) = state.claim_next(self.predicate.as_ref()) {
                return Some(item);
            }
            match deadline {
                Some(deadline) => {
                    if self.available.wait_until(&mut state, deadline).timed_out() {
                        if state.closed {
                            return None;
                        }
                        return state.claim_next(self.predicate.as_ref());
                    }
                }
                None => self.available.wait(&mut state),
            }
        }
    }

    /// Remove a claimed item from the active set and wake every waiter.
    ///
    /// One completion can unblock several pending items at once, hence the
    /// broadcast. Returns `false` if no matching active item was found.
    pub fn complete(&self, item: &WorkItem) -> bool {
        let mut state = self.state.lock();
        let Some(idx) = state.active.iter().position(|a| a.is_duplicate_of(item)) else {
            warn!(item = %item, "complete called for an item that is not active");
            return false;
        };
        state.active.remove(idx);
        let now_idle = state.is_idle();
        debug!(
            item = %item,
            pending = state.pending.len(),
            active = state.active.len(),
            "work item completed"
        );
        drop(state);

        self.available.notify_all();
        if now_idle {
            self.idle.notify_all();
        }
        true
    }

    /// Drop a pending item. Active items cannot be cancelled.
    pub fn cancel(&self, key: &WorkKey) -> bool {
        self.retain_pending(|item| !item.matches(key)) > 0
    }

    /// Keep only pending items matching `keep`. Returns how many were removed.
    pub fn retain_pending(&self, mut keep: impl FnMut(&WorkItem) -> bool) -> usize {
        let mut state = self.state.lock();
        let before = state.pending.len() + state.parked.len();
        state.pending.retain(|item| keep(item));
        state.parked.retain(|item| keep(item));
        let removed = before - state.pending.len() - state.parked.len();
        if removed == 0 {
            return 0;
        }
        state.resort(self.predicate.as_ref());
        let now_idle = state.is_idle();
        drop(state);

        debug!(removed, "pending work items removed");
        self.available.notify_all();
        if now_idle {
            self.idle.notify_all();
        }
        removed
    }

    /// Stop handing out work. Blocked takers return `None`; pending items
    /// stay in place so they can be snapshotted, and later offers are parked.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        drop(state);

        debug!("work scheduler closed");
        self.available.notify_all();
        self.idle.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Wait until nothing is pending or active. Returns whether that happened
    /// before `timeout`.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.state.lock();
        loop {
            if state.is_idle() {
                return true;
            }
            match deadline {
                Some(deadline) => {
                    if self.idle.wait_until(&mut state, deadline).timed_out() {
                        return state.is_idle();
                    }
                }
                None => self.idle.wait(&mut state),
            }
        }
    }

    pub fn is_idle(&self) -> bool {
        self.state.lock().is_idle()
    }

    /// Pending plus active.
    pub fn len(&self) -> usize {
        let state = self.state.lock();
        state.pending.len() + state.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn active_len(&self) -> usize {
        self.state.lock().active.len()
    }

    /// Pending items in current order.
    pub fn pending(&self) -> Vec<WorkItem> {
        self.state.lock().pending.clone()
    }

    pub fn active(&self) -> Vec<WorkItem> {
        self.state.lock().active.clone()
    }

    /// Items offered after [`close`](Self::close).
    pub fn parked(&self) -> Vec<WorkItem> {
        self.state.lock().parked.clone()
    }

    /// Everything that still has to run somewhere: pending items in order,
    /// then parked ones.
    pub fn leftovers(&self) -> Vec<WorkItem> {
        let state = self.state.lock();
        state
            .pending
            .iter()
            .chain(state.parked.iter())
            .cloned()
            .collect()
    }

    /// Pending items paired with their blocked score, in current order.
    pub fn blocked(&self) -> Vec<(WorkItem, usize)> {
        let state = self.state.lock();
        (0..state.pending.len())
            .map(|i| {
                (
                    state.pending[i].clone(),
                    state.blocked_score(i, self.predicate.as_ref()),
                )
            })
            .collect()
    }
}
