/*!
 * Recursive Mutex
 *
 * A mutex that the holding thread may lock again without deadlocking.
 * Ownership is tracked as an owner identity plus a reentrancy count on top
 * of a plain [`Mutex`]; relocking by the owner never touches the inner lock.
 */

use super::mutex::Mutex;
use super::slot::OwnerState;
use crate::core::types::{Deadline, ThreadId};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

const NO_OWNER: usize = 0;

/// Reentrant mutex guarding no data of its own
///
/// Invariant: `count() > 0` exactly when `owner()` is the thread holding
/// the inner mutex.
///
/// # Examples
///
/// ```
/// use thread_core::core::sync::RecursiveMutex;
///
/// let mutex = RecursiveMutex::new();
/// mutex.lock();
/// mutex.lock();
/// assert_eq!(mutex.count(), 2);
/// mutex.unlock();
/// mutex.unlock();
/// assert_eq!(mutex.owner(), None);
/// ```
#[derive(Debug, Default)]
pub struct RecursiveMutex {
    mutex: Mutex,
    owner: AtomicUsize,
    count: AtomicUsize,
}

impl RecursiveMutex {
    pub const fn new() -> Self {
        Self {
            mutex: Mutex::new(),
            owner: AtomicUsize::new(NO_OWNER),
            count: AtomicUsize::new(0),
        }
    }

    /// Lock, or bump the reentrancy count if the caller already owns it
    pub fn lock(&self) {
        let me = ThreadId::current();
        if self.reenter(me) {
            return;
        }
        self.mutex.lock();
        self.take_ownership(me);
    }

    /// Non-blocking variant of [`lock`](Self::lock)
    pub fn try_lock(&self) -> bool {
        let me = ThreadId::current();
        if self.reenter(me) {
            return true;
        }
        if !self.mutex.try_lock() {
            return false;
        }
        self.take_ownership(me);
        true
    }

    /// Lock, waiting at most `timeout` for another owner to release
    pub fn try_lock_for(&self, timeout: Duration) -> bool {
        let me = ThreadId::current();
        if self.reenter(me) {
            return true;
        }
        if !self.mutex.try_lock_for(timeout) {
            return false;
        }
        self.take_ownership(me);
        true
    }

    /// Lock before `deadline` passes
    pub fn try_lock_until(&self, deadline: Deadline) -> bool {
        let me = ThreadId::current();
        if self.reenter(me) {
            return true;
        }
        if !self.mutex.try_lock_until(deadline) {
            return false;
        }
        self.take_ownership(me);
        true
    }

    /// Drop one level of ownership; the last level releases the lock
    ///
    /// # Panics
    ///
    /// Panics if the calling thread does not own the mutex.
    pub fn unlock(&self) {
        let me = ThreadId::current().as_usize();
        assert_eq!(
            self.owner.load(Ordering::Relaxed),
            me,
            "RecursiveMutex::unlock: calling thread is not the owner"
        );

        // Only the owner touches the count, so relaxed ordering suffices;
        // the inner mutex publishes the release.
        let remaining = self.count.load(Ordering::Relaxed) - 1;
        self.count.store(remaining, Ordering::Relaxed);
        if remaining == 0 {
            self.owner.store(NO_OWNER, Ordering::Relaxed);
            self.mutex.unlock();
        }
    }

    /// Current owner, if any
    pub fn owner(&self) -> Option<ThreadId> {
        ThreadId::from_usize(self.owner.load(Ordering::Relaxed))
    }

    /// Current reentrancy depth (0 when unlocked)
    pub fn count(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }

    pub fn is_locked(&self) -> bool {
        self.mutex.is_locked()
    }

    /// Whether the calling thread holds the mutex
    pub fn is_owned_by_current_thread(&self) -> bool {
        self.owner.load(Ordering::Relaxed) == ThreadId::current().as_usize()
    }

    /// Decoded state of the inner owner word (for diagnostics)
    pub fn state(&self) -> OwnerState {
        self.mutex.state()
    }

    #[inline]
    fn reenter(&self, me: ThreadId) -> bool {
        if self.owner.load(Ordering::Relaxed) != me.as_usize() {
            return false;
        }
        let count = self.count.load(Ordering::Relaxed);
        let next = count
            .checked_add(1)
            .expect("RecursiveMutex: reentrancy count overflow");
        self.count.store(next, Ordering::Relaxed);
        true
    }

    #[inline]
    fn take_ownership(&self, me: ThreadId) {
        self.owner.store(me.as_usize(), Ordering::Relaxed);
        self.count.store(1, Ordering::Relaxed);
    }
}
