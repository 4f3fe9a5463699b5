use crate::sync::{Condvar, Mutex, MutexGuard};
use core::fmt;
use std::sync::PoisonError;
use std::time::{Duration, Instant};

/// The outcome of a timed wait.
///
/// Running out of time is an ordinary result, not an error: the caller decides whether to wait
/// again, give up, or do something else in the meantime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[must_use]
pub enum WaitStatus {
    /// The awaited condition held before the deadline.
    Satisfied,
    /// The deadline passed and the condition still did not hold.
    TimedOut,
}

impl WaitStatus {
    /// Returns `true` if the wait ended because the deadline passed.
    pub fn timed_out(self) -> bool {
        self == WaitStatus::TimedOut
    }

    /// Returns `true` if the awaited condition held.
    pub fn is_satisfied(self) -> bool {
        self == WaitStatus::Satisfied
    }
}

/// A lock and a condition variable used to announce that a lineage has fully drained.
///
/// The lock guards no data. Its only job is ordering: a waiter checks its condition while holding
/// the lock, and [`broadcast`](WakeChannel::broadcast) takes the lock before notifying. So a
/// waiter either sees the condition already satisfied, or is parked by the time the notification
/// goes out. It can never observe the old state and then sleep through the wakeup.
///
/// Anything the condition reads must be updated _before_ `broadcast` is called.
pub struct WakeChannel {
    lock: Mutex<()>,
    cvar: Condvar,
}

impl Default for WakeChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl WakeChannel {
    pub fn new() -> Self {
        Self {
            lock: Mutex::new(()),
            cvar: Condvar::new(),
        }
    }

    /// Wakes every thread parked on this channel.
    pub fn broadcast(&self) {
        // Acquire lock after updating the condition, see wait_until().
        drop(self.lock());
        self.cvar.notify_all();
    }

    /// Parks the calling thread until `predicate` returns `true`.
    ///
    /// The predicate is evaluated with the channel's lock held, once up front and again after
    /// every wakeup (spurious or not). It must not call [`broadcast`](WakeChannel::broadcast) on
    /// the same channel.
    pub fn wait_until<F>(&self, mut predicate: F)
    where
        F: FnMut() -> bool,
    {
        // We check the condition while holding the lock, and broadcasters acquire the lock
        // between updating the condition and notifying, ensuring we can not miss the
        // notification.
        let mut guard = self.lock();
        while !predicate() {
            guard = self.cvar.wait(guard).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Like [`wait_until`](WakeChannel::wait_until), but gives up once `deadline` has passed.
    ///
    /// The predicate gets one final evaluation after the deadline, so a condition that became
    /// true at the last moment is still reported as [`WaitStatus::Satisfied`].
    pub fn wait_deadline_until<F>(&self, deadline: Instant, mut predicate: F) -> WaitStatus
    where
        F: FnMut() -> bool,
    {
        let mut guard = self.lock();
        loop {
            if predicate() {
                return WaitStatus::Satisfied;
            }
            let now = Instant::now();
            if now >= deadline {
                return WaitStatus::TimedOut;
            }
            // The timeout result is ignored; the deadline check above is authoritative, which
            // also covers wakeups that arrive a little early.
            let (g, _) = self
                .cvar
                .wait_timeout(guard, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            guard = g;
        }
    }

    /// Like [`wait_deadline_until`](WakeChannel::wait_deadline_until) with a relative timeout.
    pub fn wait_timeout_until<F>(&self, timeout: Duration, predicate: F) -> WaitStatus
    where
        F: FnMut() -> bool,
    {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.wait_deadline_until(deadline, predicate),
            None => {
                // Not representable, which is as good as forever.
                self.wait_until(predicate);
                WaitStatus::Satisfied
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        // The lock protects no data, so a panic while it was held can not have left anything in
        // an inconsistent state.
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for WakeChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WakeChannel").finish_non_exhaustive()
    }
}
