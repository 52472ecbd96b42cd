//! The lock module.
//!
//! Two flavors of mutual exclusion are used by the core:
//!
//! * `SpinLock` for short critical sections that never sleep (the file
//!   table, the device registry).
//! * `SleepableLock` plus `WaitChannel` for everything that follows the
//!   examine-sleep-reexamine idiom: a table mutex guards the shared state,
//!   and a task that finds a slot locked or a resource exhausted sleeps on
//!   a channel, releasing the mutex while it waits.  Every sleeper
//!   re-checks its condition after waking, so wakeups may be (and are)
//!   broadcast.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// Mutual exclusion lock that busy waits (spins).
pub struct SpinLock<T> {
    inner: spin::Mutex<T>,
}

impl<T> SpinLock<T> {
    pub const fn new(data: T) -> Self {
        Self {
            inner: spin::Mutex::new(data),
        }
    }

    pub fn lock(&self) -> spin::MutexGuard<'_, T> {
        self.inner.lock()
    }
}

/// Mutex whose guards can be handed to a `WaitChannel` to sleep on.
pub struct SleepableLock<T> {
    inner: Mutex<T>,
}

pub type SleepableLockGuard<'s, T> = MutexGuard<'s, T>;

impl<T> SleepableLock<T> {
    pub const fn new(data: T) -> Self {
        Self {
            inner: Mutex::new(data),
        }
    }

    pub fn lock(&self) -> SleepableLockGuard<'_, T> {
        // A poisoned lock means some task panicked mid-update; the kernel
        // treats that as fatal anyway, so keep the guard and carry on.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A queue of tasks waiting for some condition on a `SleepableLock`.
///
/// A channel is permanently paired with exactly one lock; sleeping releases
/// that lock until the wakeup arrives.
pub struct WaitChannel {
    cond: Condvar,
}

impl WaitChannel {
    pub const fn new() -> Self {
        Self {
            cond: Condvar::new(),
        }
    }

    /// Atomically releases the guard and sleeps until `wakeup`, then
    /// re-acquires the lock.  The caller must re-check its condition.
    pub fn sleep<'s, T>(&self, guard: SleepableLockGuard<'s, T>) -> SleepableLockGuard<'s, T> {
        self.cond
            .wait(guard)
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Wakes up all tasks sleeping on this channel.
    pub fn wakeup(&self) {
        self.cond.notify_all();
    }
}
