// Copyright 2026 the HwCompat Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Synchronization fences.
//!
//! A [`Fence`] marks a future point at which a buffer becomes safe to read or
//! write. It is either a no-op fence (already satisfied, nothing to wait on) or
//! it shares a primitive with exactly one [`FenceSignal`], the producer side.
//! Fences are reference-counted: [`Fence::dup`] is a cheap handle copy, and all
//! duplicates observe the same signal.
//!
//! [`DeferredFenceQueue`] keeps the two most recent fences of a stream so that
//! a consumer can be handed the fence of the *previous* frame while the
//! current one is still in flight.

use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};
use core::time::Duration;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Condvar, Mutex};

static NEXT_FENCE_ID: AtomicU64 = AtomicU64::new(1);

/// Observable state of a fence primitive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FenceStatus {
    /// The producer has not signalled yet.
    Pending,
    /// The producer signalled (or the fence is a no-op fence).
    Signaled,
    /// The producer was dropped without signalling.
    Abandoned,
}

/// Errors reported while waiting on a [`Fence`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, thiserror::Error)]
pub enum FenceError {
    /// The fence did not signal before the timeout elapsed.
    #[error("fence wait timed out")]
    Timeout,
    /// The producer went away without signalling.
    #[error("fence producer abandoned the fence")]
    Abandoned,
}

struct FenceState {
    id: u64,
    status: Mutex<FenceStatus>,
    cond: Condvar,
}

impl FenceState {
    fn finish(&self, status: FenceStatus) {
        let mut current = self.status.lock();
        if *current == FenceStatus::Pending {
            *current = status;
            self.cond.notify_all();
        }
    }
}

/// A shareable handle to a future synchronization point.
#[derive(Clone, Default)]
pub struct Fence {
    inner: Option<Arc<FenceState>>,
}

impl Fence {
    /// Returns a no-op fence that is already satisfied.
    #[inline]
    #[must_use]
    pub const fn signaled() -> Self {
        Self { inner: None }
    }

    /// Creates a pending fence together with the signal that completes it.
    #[must_use]
    pub fn pending() -> (Self, FenceSignal) {
        let state = Arc::new(FenceState {
            id: NEXT_FENCE_ID.fetch_add(1, Ordering::Relaxed),
            status: Mutex::new(FenceStatus::Pending),
            cond: Condvar::new(),
        });
        (
            Self {
                inner: Some(Arc::clone(&state)),
            },
            FenceSignal { state },
        )
    }

    /// Returns `true` for a no-op fence with no primitive behind it.
    #[inline]
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.inner.is_none()
    }

    /// Returns a diagnostic id for fences backed by a primitive.
    #[must_use]
    pub fn id(&self) -> Option<u64> {
        self.inner.as_ref().map(|state| state.id)
    }

    /// Returns the current status without blocking.
    #[must_use]
    pub fn status(&self) -> FenceStatus {
        match &self.inner {
            None => FenceStatus::Signaled,
            Some(state) => *state.status.lock(),
        }
    }

    /// Returns `true` once the fence has signalled.
    #[must_use]
    pub fn is_signaled(&self) -> bool {
        self.status() == FenceStatus::Signaled
    }

    /// Returns another handle to the same fence.
    #[inline]
    #[must_use]
    pub fn dup(&self) -> Self {
        self.clone()
    }

    /// Returns `true` if both handles refer to the same primitive, or both are
    /// no-op fences.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        match (&self.inner, &other.inner) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Blocks until the fence signals.
    ///
    /// Waiting is idempotent: waiting on a signalled fence returns at once.
    ///
    /// # Errors
    ///
    /// Returns [`FenceError::Abandoned`] if the producer was dropped without
    /// signalling.
    pub fn wait(&self) -> Result<(), FenceError> {
        let Some(state) = &self.inner else {
            return Ok(());
        };
        let mut status = state.status.lock();
        while *status == FenceStatus::Pending {
            state.cond.wait(&mut status);
        }
        status_to_result(*status)
    }

    /// Blocks until the fence signals or `timeout` elapses.
    ///
    /// # Errors
    ///
    /// Returns [`FenceError::Timeout`] if the deadline passes first, or
    /// [`FenceError::Abandoned`] if the producer went away.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<(), FenceError> {
        let Some(state) = &self.inner else {
            return Ok(());
        };
        let deadline = Instant::now().checked_add(timeout);
        let mut status = state.status.lock();
        while *status == FenceStatus::Pending {
            match deadline {
                Some(deadline) => {
                    if state.cond.wait_until(&mut status, deadline).timed_out()
                        && *status == FenceStatus::Pending
                    {
                        return Err(FenceError::Timeout);
                    }
                }
                None => state.cond.wait(&mut status),
            }
        }
        status_to_result(*status)
    }
}

fn status_to_result(status: FenceStatus) -> Result<(), FenceError> {
    match status {
        FenceStatus::Abandoned => Err(FenceError::Abandoned),
        FenceStatus::Pending | FenceStatus::Signaled => Ok(()),
    }
}

impl fmt::Debug for Fence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            None => f.write_str("Fence(noop)"),
            Some(state) => write!(f, "Fence(#{} {:?})", state.id, *state.status.lock()),
        }
    }
}

/// The producer side of a pending [`Fence`].
///
/// Dropping a signal without calling [`signal`](Self::signal) abandons the
/// fence, which wakes every waiter with [`FenceError::Abandoned`].
pub struct FenceSignal {
    state: Arc<FenceState>,
}

impl FenceSignal {
    /// Marks the fence as signalled and wakes all waiters.
    pub fn signal(self) {
        self.state.finish(FenceStatus::Signaled);
    }

    /// Returns the id of the fence this signal completes.
    #[must_use]
    pub fn fence_id(&self) -> u64 {
        self.state.id
    }
}

impl Drop for FenceSignal {
    fn drop(&mut self) {
        self.state.finish(FenceStatus::Abandoned);
    }
}

impl fmt::Debug for FenceSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FenceSignal")
            .field("fence_id", &self.state.id)
            .finish_non_exhaustive()
    }
}

/// Number of fences a [`DeferredFenceQueue`] retains.
pub const DEFERRED_FENCE_DEPTH: usize = 2;

/// Fixed-depth fence queue with a drop-oldest policy.
///
/// Starts out holding two no-op fences. Each [`push`](Self::push) evicts the
/// oldest entry, so the queue never grows and [`deferred`](Self::deferred)
/// always yields the fence pushed one frame before [`latest`](Self::latest).
#[derive(Clone, Debug, Default)]
pub struct DeferredFenceQueue {
    // [older, newer]
    fences: [Fence; DEFERRED_FENCE_DEPTH],
    dropped_count: u64,
}

impl DeferredFenceQueue {
    /// Creates a queue holding two no-op fences.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes `fence` as the newest entry and returns the evicted oldest one.
    pub fn push(&mut self, fence: Fence) -> Fence {
        let [older, newer] = core::mem::take(&mut self.fences);
        self.fences = [newer, fence];
        self.dropped_count += 1;
        older
    }

    /// Returns the older of the two retained fences.
    #[must_use]
    pub fn deferred(&self) -> &Fence {
        &self.fences[0]
    }

    /// Returns the most recently pushed fence.
    #[must_use]
    pub fn latest(&self) -> &Fence {
        &self.fences[DEFERRED_FENCE_DEPTH - 1]
    }

    /// Iterates over retained fences, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Fence> {
        self.fences.iter()
    }

    /// Returns the number of retained fences, which is always
    /// [`DEFERRED_FENCE_DEPTH`].
    #[must_use]
    pub const fn len(&self) -> usize {
        DEFERRED_FENCE_DEPTH
    }

    /// Always `false`; present for API symmetry with collections.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }

    /// Returns how many fences have been evicted so far.
    #[must_use]
    pub const fn dropped_count(&self) -> u64 {
        self.dropped_count
    }
}

#[cfg(test)]
mod tests {
    use core::time::Duration;
    use std::thread;

    use super::{DeferredFenceQueue, Fence, FenceError, FenceStatus};

    #[test]
    fn noop_fence_is_already_signaled() {
        let fence = Fence::signaled();
        assert!(fence.is_noop(), "signaled() has no primitive");
        assert!(fence.is_signaled(), "no-op fence reports signaled");
        assert_eq!(fence.wait(), Ok(()));
        assert_eq!(fence.wait_timeout(Duration::ZERO), Ok(()));
    }

    #[test]
    fn duplicates_observe_the_same_signal() {
        let (fence, signal) = Fence::pending();
        let dup = fence.dup();
        assert!(fence.same_as(&dup), "dup shares the primitive");
        assert_eq!(dup.status(), FenceStatus::Pending);

        signal.signal();
        assert!(fence.is_signaled(), "first handle sees the signal");
        assert!(dup.is_signaled(), "duplicate sees the signal");
        assert_eq!(dup.wait(), Ok(()));
        assert_eq!(dup.wait(), Ok(()), "waiting twice is fine");
    }

    #[test]
    fn wait_blocks_until_signaled_from_another_thread() {
        let (fence, signal) = Fence::pending();
        let waiter = {
            let fence = fence.dup();
            thread::spawn(move || fence.wait())
        };
        thread::sleep(Duration::from_millis(10));
        signal.signal();
        assert_eq!(waiter.join().ok(), Some(Ok(())));
    }

    #[test]
    fn wait_timeout_expires_on_pending_fence() {
        let (fence, _signal) = Fence::pending();
        assert_eq!(
            fence.wait_timeout(Duration::from_millis(5)),
            Err(FenceError::Timeout)
        );
    }

    #[test]
    fn dropping_signal_abandons_fence() {
        let (fence, signal) = Fence::pending();
        drop(signal);
        assert_eq!(fence.status(), FenceStatus::Abandoned);
        assert_eq!(fence.wait(), Err(FenceError::Abandoned));
        assert!(!fence.is_signaled(), "abandoned is not signaled");
    }

    #[test]
    fn distinct_fences_are_not_the_same() {
        let (a, _sa) = Fence::pending();
        let (b, _sb) = Fence::pending();
        assert!(!a.same_as(&b), "different primitives");
        assert!(!a.same_as(&Fence::signaled()), "pending vs no-op");
        assert!(Fence::signaled().same_as(&Fence::signaled()), "no-op vs no-op");
    }

    #[test]
    fn deferred_queue_starts_with_two_noop_fences() {
        let queue = DeferredFenceQueue::new();
        assert_eq!(queue.len(), 2);
        assert!(queue.iter().all(Fence::is_noop), "initial entries are no-ops");
    }

    #[test]
    fn deferred_queue_keeps_most_recent_two() {
        let mut queue = DeferredFenceQueue::new();
        let mut made = Vec::new();
        let mut signals = Vec::new();
        for _ in 0..5 {
            let (fence, signal) = Fence::pending();
            made.push(fence.dup());
            signals.push(signal);
            let _ = queue.push(fence);
        }

        assert_eq!(queue.iter().count(), 2, "depth never grows");
        assert!(queue.deferred().same_as(&made[3]), "older entry is frame n-1");
        assert!(queue.latest().same_as(&made[4]), "newer entry is frame n");
        assert_eq!(queue.dropped_count(), 5);
    }

    #[test]
    fn push_returns_evicted_fence() {
        let mut queue = DeferredFenceQueue::new();
        let (first, _s1) = Fence::pending();
        let (second, _s2) = Fence::pending();
        assert!(queue.push(first.dup()).is_noop(), "first eviction is a no-op");
        assert!(queue.push(second).is_noop(), "second eviction is a no-op");
        let (third, _s3) = Fence::pending();
        assert!(queue.push(third).same_as(&first), "third push evicts first");
    }
}
