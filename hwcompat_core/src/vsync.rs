// Copyright 2026 the HwCompat Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Periodic vsync generation.
//!
//! [`VsyncSignaler`] runs one timer thread that calls a callback once per
//! period with the *deadline* of each tick, not the time the thread woke up.
//!
//! | State     | Thread  | Callback |
//! |-----------|---------|----------|
//! | `Stopped` | none    | never    |
//! | `Idle`    | waiting | gated    |
//! | `Running` | ticking | per tick |
//!
//! When the thread falls behind (or delivery was disabled for a while) the
//! next deadline jumps forward by the smallest whole number of periods that
//! puts it after now. Missed ticks are never delivered as a burst.
//!
//! The thread sleeps on a condition variable, so [`VsyncSignaler::stop`] and
//! [`VsyncSignaler::set_enabled`] take effect without waiting out a period.
//! The callback runs with no signaler lock held.

use core::fmt;
use core::time::Duration;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, warn};
use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::time::{self, HostTime};

/// Callback invoked with each tick's deadline.
pub type VsyncCallback = Arc<dyn Fn(HostTime) + Send + Sync>;

/// Observable state of a [`VsyncSignaler`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SignalerState {
    /// No timer thread.
    Stopped,
    /// Timer thread started, delivery disabled.
    Idle,
    /// Timer thread started, delivering ticks.
    Running,
}

/// Errors from [`VsyncSignaler::start`].
#[derive(Debug, thiserror::Error)]
pub enum VsyncError {
    /// The signaler is already started.
    #[error("vsync signaler already started")]
    AlreadyStarted,
    /// A zero period was requested.
    #[error("vsync period must be non-zero")]
    ZeroPeriod,
    /// The timer thread could not be spawned.
    #[error("failed to spawn vsync thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Returns the first deadline strictly after `now`, stepping from `deadline`
/// by whole periods. A deadline that has not elapsed is returned unchanged.
#[must_use]
pub fn catch_up(deadline: HostTime, period: Duration, now: HostTime) -> HostTime {
    if deadline >= now {
        return deadline;
    }
    let period_ns = u64::try_from(period.as_nanos()).unwrap_or(u64::MAX).max(1);
    let behind = now.nanos() - deadline.nanos();
    let periods = behind / period_ns + 1;
    HostTime(deadline.nanos().saturating_add(periods.saturating_mul(period_ns)))
}

struct LoopState {
    started: bool,
    /// Bumped by every start; a thread whose generation is stale exits.
    generation: u64,
    enabled: bool,
    period: Duration,
    next_deadline: HostTime,
    ticks: u64,
}

struct Shared {
    state: Mutex<LoopState>,
    cond: Condvar,
    callback: VsyncCallback,
}

/// A periodic vsync timer thread.
pub struct VsyncSignaler {
    shared: Arc<Shared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for VsyncSignaler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VsyncSignaler")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl VsyncSignaler {
    /// Creates a stopped signaler that will deliver ticks to `callback`.
    pub fn new<F: Fn(HostTime) + Send + Sync + 'static>(callback: F) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(LoopState {
                    started: false,
                    generation: 0,
                    enabled: false,
                    period: Duration::ZERO,
                    next_deadline: HostTime(0),
                    ticks: 0,
                }),
                cond: Condvar::new(),
                callback: Arc::new(callback),
            }),
            thread: Mutex::new(None),
        }
    }

    /// Starts the timer thread with delivery disabled.
    ///
    /// # Errors
    ///
    /// Returns [`VsyncError::AlreadyStarted`] if running,
    /// [`VsyncError::ZeroPeriod`] for a zero period, or
    /// [`VsyncError::Spawn`] if the thread cannot be created.
    pub fn start(&self, first_deadline: HostTime, period: Duration) -> Result<(), VsyncError> {
        if period.is_zero() {
            return Err(VsyncError::ZeroPeriod);
        }
        let mut thread = self.thread.lock();
        let generation = {
            let mut state = self.shared.state.lock();
            if state.started {
                return Err(VsyncError::AlreadyStarted);
            }
            state.started = true;
            state.generation += 1;
            state.period = period;
            state.next_deadline = first_deadline;
            state.generation
        };

        let shared = Arc::clone(&self.shared);
        match thread::Builder::new()
            .name("vsync".into())
            .spawn(move || run(&shared, generation))
        {
            Ok(handle) => {
                *thread = Some(handle);
                debug!("vsync signaler started, period {period:?}");
                Ok(())
            }
            Err(err) => {
                self.shared.state.lock().started = false;
                Err(VsyncError::Spawn(err))
            }
        }
    }

    /// Gates callback delivery.
    ///
    /// Enabling does not replay ticks missed while disabled.
    pub fn set_enabled(&self, enabled: bool) {
        let mut state = self.shared.state.lock();
        if state.enabled != enabled {
            state.enabled = enabled;
            self.shared.cond.notify_all();
        }
    }

    /// Changes the period; the next deadline is kept.
    ///
    /// A zero period is ignored.
    pub fn set_period(&self, period: Duration) {
        if period.is_zero() {
            warn!("ignoring zero vsync period");
            return;
        }
        let mut state = self.shared.state.lock();
        state.period = period;
        self.shared.cond.notify_all();
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> SignalerState {
        let state = self.shared.state.lock();
        match (state.started, state.enabled) {
            (false, _) => SignalerState::Stopped,
            (true, false) => SignalerState::Idle,
            (true, true) => SignalerState::Running,
        }
    }

    /// Returns the configured period.
    #[must_use]
    pub fn period(&self) -> Duration {
        self.shared.state.lock().period
    }

    /// Returns the number of ticks delivered so far.
    #[must_use]
    pub fn ticks_delivered(&self) -> u64 {
        self.shared.state.lock().ticks
    }

    /// Stops the timer thread and waits for it to exit.
    ///
    /// Safe from any state. If a callback is in flight the call waits for it
    /// to return, except when called from the callback itself, in which case
    /// the thread exits as soon as the callback returns, even if the signaler
    /// has been started again in the meantime.
    pub fn stop(&self) {
        let handle = {
            let mut thread = self.thread.lock();
            {
                let mut state = self.shared.state.lock();
                state.started = false;
                self.shared.cond.notify_all();
            }
            thread.take()
        };
        let Some(handle) = handle else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            warn!("vsync thread panicked");
        }
        debug!("vsync signaler stopped");
    }
}

impl Drop for VsyncSignaler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(shared: &Shared, generation: u64) {
    let mut state = shared.state.lock();
    while state.started && state.generation == generation {
        if !state.enabled {
            shared.cond.wait(&mut state);
            continue;
        }

        let now = time::now();
        let deadline = catch_up(state.next_deadline, state.period, now);
        state.next_deadline = deadline;

        let wait = deadline.saturating_duration_since(now);
        if !wait.is_zero() && !shared.cond.wait_for(&mut state, wait).timed_out() {
            // Woken by a state change; re-evaluate from the top.
            continue;
        }
        if !state.started || !state.enabled || state.generation != generation {
            continue;
        }

        state.next_deadline = deadline + state.period;
        state.ticks += 1;
        let callback = Arc::clone(&shared.callback);
        MutexGuard::unlocked(&mut state, || callback(deadline));
    }
}

#[cfg(test)]
mod tests {
    use core::time::Duration;
    use std::sync::Arc;
    use std::sync::mpsc;
    use std::thread;

    use parking_lot::Mutex;

    use super::{SignalerState, VsyncError, VsyncSignaler, catch_up};
    use crate::time::{self, HostTime};

    const PERIOD: Duration = Duration::from_millis(2);

    #[test]
    fn catch_up_skips_whole_periods() {
        let period = Duration::from_nanos(10);
        assert_eq!(catch_up(HostTime(100), period, HostTime(95)), HostTime(100), "not elapsed");
        assert_eq!(catch_up(HostTime(100), period, HostTime(100)), HostTime(100), "exactly now");
        assert_eq!(catch_up(HostTime(100), period, HostTime(101)), HostTime(110));
        assert_eq!(catch_up(HostTime(100), period, HostTime(110)), HostTime(120), "strictly after now");
        assert_eq!(catch_up(HostTime(100), period, HostTime(157)), HostTime(160));
    }

    #[test]
    fn state_transitions() {
        let signaler = VsyncSignaler::new(|_| {});
        assert_eq!(signaler.state(), SignalerState::Stopped);
        signaler.start(time::now(), PERIOD).expect("start");
        assert_eq!(signaler.state(), SignalerState::Idle);
        signaler.set_enabled(true);
        assert_eq!(signaler.state(), SignalerState::Running);
        signaler.stop();
        assert_eq!(signaler.state(), SignalerState::Stopped);
        signaler.stop();
    }

    #[test]
    fn start_rejects_zero_period_and_double_start() {
        let signaler = VsyncSignaler::new(|_| {});
        assert!(matches!(
            signaler.start(time::now(), Duration::ZERO),
            Err(VsyncError::ZeroPeriod)
        ));
        signaler.start(time::now(), PERIOD).expect("start");
        assert!(matches!(
            signaler.start(time::now(), PERIOD),
            Err(VsyncError::AlreadyStarted)
        ));
    }

    #[test]
    fn delivers_deadlines_one_period_apart() {
        let (tx, rx) = mpsc::channel();
        let signaler = VsyncSignaler::new(move |deadline| {
            let _ = tx.send(deadline);
        });
        let first = time::now() + PERIOD;
        signaler.start(first, PERIOD).expect("start");
        signaler.set_enabled(true);

        let a = rx.recv_timeout(Duration::from_secs(1)).expect("first tick");
        let b = rx.recv_timeout(Duration::from_secs(1)).expect("second tick");
        signaler.stop();

        assert!(a >= first, "deadline never precedes the first scheduled one");
        let gap = b - a;
        assert_eq!(gap.as_nanos() % PERIOD.as_nanos(), 0, "ticks stay on the period grid");
        assert!(gap >= PERIOD, "ticks are at least a period apart");
    }

    #[test]
    fn disabled_signaler_delivers_nothing() {
        let count = Arc::new(Mutex::new(0_u32));
        let signaler = {
            let count = Arc::clone(&count);
            VsyncSignaler::new(move |_| *count.lock() += 1)
        };
        signaler.start(time::now(), PERIOD).expect("start");
        thread::sleep(PERIOD * 5);
        assert_eq!(*count.lock(), 0, "no ticks while idle");
        assert_eq!(signaler.ticks_delivered(), 0);
    }

    #[test]
    fn stop_from_callback_does_not_deadlock() {
        let (tx, rx) = mpsc::channel();
        let slot: Arc<Mutex<Option<Arc<VsyncSignaler>>>> = Arc::new(Mutex::new(None));
        let signaler = {
            let slot = Arc::clone(&slot);
            Arc::new(VsyncSignaler::new(move |_| {
                if let Some(signaler) = slot.lock().take() {
                    signaler.stop();
                    let _ = tx.send(());
                }
            }))
        };
        *slot.lock() = Some(Arc::clone(&signaler));
        signaler.start(time::now(), PERIOD).expect("start");
        signaler.set_enabled(true);

        rx.recv_timeout(Duration::from_secs(1)).expect("callback stopped the signaler");
        assert_eq!(signaler.state(), SignalerState::Stopped);
    }

    #[test]
    fn restart_from_callback_leaves_one_thread() {
        let (tx, rx) = mpsc::channel();
        let slot: Arc<Mutex<Option<Arc<VsyncSignaler>>>> = Arc::new(Mutex::new(None));
        let signaler = {
            let slot = Arc::clone(&slot);
            Arc::new(VsyncSignaler::new(move |_| {
                if let Some(signaler) = slot.lock().take() {
                    signaler.stop();
                    signaler.start(time::now(), PERIOD).expect("restart");
                    return;
                }
                let _ = tx.send(thread::current().id());
            }))
        };
        *slot.lock() = Some(Arc::clone(&signaler));
        signaler.start(time::now(), PERIOD).expect("start");
        signaler.set_enabled(true);

        let ticks: Vec<_> = (0..8)
            .map(|_| rx.recv_timeout(Duration::from_secs(1)).expect("tick after restart"))
            .collect();
        signaler.stop();
        assert!(
            ticks.iter().all(|id| *id == ticks[0]),
            "only the restarted thread ticks: {ticks:?}"
        );
    }

    #[test]
    fn stop_wakes_sleeping_thread() {
        let signaler = VsyncSignaler::new(|_| {});
        signaler.start(time::now(), Duration::from_secs(3600)).expect("start");
        signaler.set_enabled(true);
        let before = time::now();
        signaler.stop();
        assert!(
            time::now() - before < Duration::from_secs(10),
            "stop does not wait out the period"
        );
    }
}
