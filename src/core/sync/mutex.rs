/*!
 * Mutex
 *
 * Non-recursive mutual exclusion on a single atomic word.
 *
 * # Design
 *
 * - Fast path: one compare-and-swap, no syscalls, no allocation
 * - Slow path: brief spin, then mark the word contended and park through
 *   the compile-time park strategy; retry on wake
 * - Unlock: one compare-and-swap when uncontended, otherwise reset the word
 *   and wake exactly one waiter
 *
 * # Fairness
 *
 * Acquisition is NOT fair. A woken waiter competes with threads arriving on
 * the fast path, and a newcomer may win (barging). This keeps throughput
 * high under contention; code must not expect FIFO hand-off.
 */

use super::config;
use super::slot::{AtomicOwnerSlot, OwnerState, Release};
use super::traits::{ParkOutcome, Parker};
use super::ActiveParker;
use crate::core::types::Deadline;
use parking_lot::lock_api;
use std::hint;
use std::time::{Duration, Instant};

/// Raw mutex guarding no data of its own
///
/// Use [`Guarded`] to protect a value, or lock/unlock explicitly and pair
/// with [`ScopedLock`](crate::core::guard::ScopedLock).
///
/// # Examples
///
/// ```
/// use thread_core::core::sync::Mutex;
/// use std::time::Duration;
///
/// let mutex = Mutex::new();
/// mutex.lock();
/// assert!(!mutex.try_lock_for(Duration::from_millis(10)));
/// mutex.unlock();
/// assert!(mutex.try_lock());
/// mutex.unlock();
/// ```
#[derive(Debug, Default)]
pub struct Mutex {
    slot: AtomicOwnerSlot,
}

impl Mutex {
    pub const fn new() -> Self {
        Self {
            slot: AtomicOwnerSlot::new(),
        }
    }

    /// Block until the calling thread holds the lock
    #[inline]
    pub fn lock(&self) {
        if !self.slot.try_acquire() {
            self.lock_contended(Deadline::Forever);
        }
    }

    /// Single fast-path attempt; never blocks
    #[inline]
    pub fn try_lock(&self) -> bool {
        self.slot.try_acquire()
    }

    /// Attempt to lock, waiting at most `timeout`
    ///
    /// A zero timeout is equivalent to [`try_lock`](Self::try_lock).
    pub fn try_lock_for(&self, timeout: Duration) -> bool {
        if self.slot.try_acquire() {
            return true;
        }
        if timeout.is_zero() {
            return false;
        }
        self.lock_contended(Deadline::after(timeout))
    }

    /// Attempt to lock before `deadline` passes
    pub fn try_lock_until(&self, deadline: Deadline) -> bool {
        if self.slot.try_acquire() {
            return true;
        }
        if deadline.has_expired() {
            return false;
        }
        self.lock_contended(deadline)
    }

    /// Release the lock
    ///
    /// Must be called by the thread that last acquired it.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is not locked.
    #[inline]
    pub fn unlock(&self) {
        match self.slot.release() {
            Release::NoWaiters => {}
            Release::HadWaiters(handle) => {
                ActiveParker::unpark_one(handle.key());
            }
            Release::NotLocked => panic!("Mutex::unlock: mutex is not locked"),
        }
    }

    #[inline]
    pub fn is_locked(&self) -> bool {
        self.slot.is_locked()
    }

    /// Decoded state of the owner word (for diagnostics)
    pub fn state(&self) -> OwnerState {
        self.slot.state()
    }

    #[cold]
    fn lock_contended(&self, deadline: Deadline) -> bool {
        // Spin while the holder is likely about to release and nobody parks yet
        for _ in 0..config::spin_limit() {
            if self.slot.is_unlocked() && self.slot.try_acquire() {
                return true;
            }
            if self.slot.is_contended() {
                break;
            }
            hint::spin_loop();
        }

        let key = self.slot.waiter_handle().key();
        loop {
            if self.slot.acquire_contended() {
                return true;
            }
            if deadline.has_expired() {
                return false;
            }

            let outcome = ActiveParker::park(key, &|| self.slot.is_contended(), deadline);
            if outcome == ParkOutcome::TimedOut && deadline.has_expired() {
                return false;
            }
        }
    }
}

impl Drop for Mutex {
    fn drop(&mut self) {
        debug_assert!(
            !self.slot.is_locked(),
            "Mutex dropped while locked"
        );
    }
}

// SAFETY: exclusivity is provided by the owner slot; unlock is only reached
// through lock_api guards created by a successful lock.
unsafe impl lock_api::RawMutex for Mutex {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = Mutex::new();

    type GuardMarker = lock_api::GuardNoSend;

    #[inline]
    fn lock(&self) {
        Mutex::lock(self);
    }

    #[inline]
    fn try_lock(&self) -> bool {
        Mutex::try_lock(self)
    }

    #[inline]
    unsafe fn unlock(&self) {
        Mutex::unlock(self);
    }

    #[inline]
    fn is_locked(&self) -> bool {
        Mutex::is_locked(self)
    }
}

// SAFETY: same invariants as the untimed implementation
unsafe impl lock_api::RawMutexTimed for Mutex {
    type Duration = Duration;
    type Instant = Instant;

    fn try_lock_for(&self, timeout: Duration) -> bool {
        Mutex::try_lock_for(self, timeout)
    }

    fn try_lock_until(&self, timeout: Instant) -> bool {
        Mutex::try_lock_until(self, Deadline::At(timeout))
    }
}

/// A value protected by this crate's [`Mutex`]
pub type Guarded<T> = lock_api::Mutex<Mutex, T>;

/// RAII guard of a [`Guarded`] value
pub type GuardedGuard<'a, T> = lock_api::MutexGuard<'a, Mutex, T>;
