/*!
 * Scoped Lock Guard
 *
 * RAII acquisition of a raw `Mutex` or `RecursiveMutex`, with early
 * release and relocking
 */

use super::traits::{Guard, GuardDrop};
use super::{GuardError, GuardResult};
use crate::core::sync::{Mutex, RecursiveMutex};
use std::marker::PhantomData;

/// Raw locks a [`ScopedLock`] can manage
pub trait Lockable {
    fn lock(&self);
    fn unlock(&self);
}

impl Lockable for Mutex {
    #[inline]
    fn lock(&self) {
        Mutex::lock(self);
    }

    #[inline]
    fn unlock(&self) {
        Mutex::unlock(self);
    }
}

impl Lockable for RecursiveMutex {
    #[inline]
    fn lock(&self) {
        RecursiveMutex::lock(self);
    }

    #[inline]
    fn unlock(&self) {
        RecursiveMutex::unlock(self);
    }
}

/// Holds a lock for the duration of a scope
///
/// A guard built from `None` is a valid no-op guard: it never locks and
/// `unlock`/`relock` do nothing. The guard can be moved (responsibility for
/// unlocking moves with it) but never cloned, and it must stay on the
/// thread that locked.
///
/// # Example
///
/// ```
/// use thread_core::core::guard::ScopedLock;
/// use thread_core::core::sync::Mutex;
///
/// let mutex = Mutex::new();
/// {
///     let mut guard = ScopedLock::new(Some(&mutex));
///     assert!(mutex.is_locked());
///     guard.unlock();
///     assert!(!mutex.is_locked());
///     guard.relock();
/// }
/// assert!(!mutex.is_locked());
/// ```
pub struct ScopedLock<'a, L: Lockable + ?Sized> {
    lock: Option<&'a L>,
    locked: bool,
    _not_send: PhantomData<*const ()>,
}

impl<'a, L: Lockable + ?Sized> ScopedLock<'a, L> {
    /// Lock `lock` immediately, or build a no-op guard from `None`
    pub fn new(lock: Option<&'a L>) -> Self {
        if let Some(lock) = lock {
            lock.lock();
        }
        Self {
            lock,
            locked: lock.is_some(),
            _not_send: PhantomData,
        }
    }

    /// Shorthand for `ScopedLock::new(Some(lock))`
    pub fn locked(lock: &'a L) -> Self {
        Self::new(Some(lock))
    }

    /// Release early
    ///
    /// # Panics
    ///
    /// Panics if this guard already released its lock.
    pub fn unlock(&mut self) {
        let Some(lock) = self.lock else { return };
        assert!(self.locked, "ScopedLock::unlock: lock already released");
        lock.unlock();
        self.locked = false;
    }

    /// Re-acquire after an early [`unlock`](Self::unlock)
    ///
    /// # Panics
    ///
    /// Panics if this guard still holds its lock.
    pub fn relock(&mut self) {
        let Some(lock) = self.lock else { return };
        assert!(!self.locked, "ScopedLock::relock: lock already held");
        lock.lock();
        self.locked = true;
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// The managed lock, if any
    pub fn mutex(&self) -> Option<&'a L> {
        self.lock
    }
}

impl<L: Lockable + ?Sized> Guard for ScopedLock<'_, L> {
    fn resource_type(&self) -> &'static str {
        if self.locked {
            "scoped_lock_locked"
        } else {
            "scoped_lock_unlocked"
        }
    }

    fn is_active(&self) -> bool {
        self.locked
    }

    fn release(&mut self) -> GuardResult<()> {
        if self.lock.is_none() {
            return Err(GuardError::NullLock);
        }
        if !self.locked {
            return Err(GuardError::AlreadyReleased);
        }
        self.unlock();
        Ok(())
    }
}

impl<L: Lockable + ?Sized> GuardDrop for ScopedLock<'_, L> {
    fn on_drop(&mut self) {
        if self.locked {
            if let Some(lock) = self.lock {
                lock.unlock();
            }
            self.locked = false;
        }
    }
}

impl<L: Lockable + ?Sized> Drop for ScopedLock<'_, L> {
    fn drop(&mut self) {
        self.on_drop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scoped_lock_unlocks_on_drop() {
        let mutex = Mutex::new();
        {
            let guard = ScopedLock::locked(&mutex);
            assert!(guard.is_locked());
            assert!(mutex.is_locked());
        }
        assert!(!mutex.is_locked());
    }

    #[test]
    fn test_guard_is_pointer_sized_plus_flag() {
        // Construction records nothing beyond the lock and its state
        assert!(std::mem::size_of::<ScopedLock<'static, Mutex>>() <= 2 * std::mem::size_of::<usize>());
    }

    #[test]
    fn test_null_guard_is_noop() {
        let mut guard: ScopedLock<'_, Mutex> = ScopedLock::new(None);
        assert!(!guard.is_locked());
        guard.unlock();
        guard.relock();
        assert!(!guard.is_locked());
        assert_eq!(guard.release(), Err(GuardError::NullLock));
    }

    #[test]
    fn test_unlock_relock() {
        let mutex = Mutex::new();
        let mut guard = ScopedLock::locked(&mutex);
        guard.unlock();
        assert!(!mutex.is_locked());
        guard.relock();
        assert!(mutex.is_locked());
        drop(guard);
        assert!(!mutex.is_locked());
    }

    #[test]
    #[should_panic(expected = "already released")]
    fn test_double_unlock_rejected() {
        let mutex = Mutex::new();
        let mut guard = ScopedLock::locked(&mutex);
        guard.unlock();
        guard.unlock();
    }

    #[test]
    fn test_move_transfers_responsibility() {
        let mutex = Mutex::new();
        let guard = ScopedLock::locked(&mutex);
        let moved = guard;
        assert!(mutex.is_locked());
        drop(moved);
        assert!(!mutex.is_locked());
    }

    #[test]
    fn test_release_via_guard_trait() {
        let mutex = RecursiveMutex::new();
        let mut guard = ScopedLock::locked(&mutex);
        assert_eq!(guard.resource_type(), "scoped_lock_locked");
        assert!(guard.release().is_ok());
        assert_eq!(guard.release(), Err(GuardError::AlreadyReleased));
        assert_eq!(mutex.count(), 0);
    }

    #[test]
    fn test_recursive_scoped_locks() {
        let mutex = RecursiveMutex::new();
        {
            let _outer = ScopedLock::locked(&mutex);
            let _inner = ScopedLock::locked(&mutex);
            assert_eq!(mutex.count(), 2);
        }
        assert_eq!(mutex.count(), 0);
        assert_eq!(mutex.owner(), None);
    }
}
