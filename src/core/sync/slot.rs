/*!
 * Atomic Owner Slot
 *
 * The single machine word behind every `Mutex`.
 *
 * # States
 *
 * - `0`: unlocked
 * - `1`: locked, nobody waiting (sentinel)
 * - `3`: locked with waiters; the word is a handle to the wait queue the
 *   park strategy keeps for this slot's address
 *
 * A thread that moves the word from unlocked to any locked value holds the
 * lock. The word only becomes "with waiters" when a second thread must block.
 */

use std::sync::atomic::{AtomicUsize, Ordering};

const UNLOCKED: usize = 0;
const LOCKED: usize = 1;
const CONTENDED: usize = 3;

/// Handle to the wait queue of a contended slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WaiterHandle(usize);

impl WaiterHandle {
    /// Key under which waiters are parked
    #[inline]
    pub fn key(self) -> usize {
        self.0
    }
}

/// Decoded view of the slot word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerState {
    Unlocked,
    LockedNoWaiters,
    LockedWithWaiters(WaiterHandle),
}

/// What a release found in the slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    /// Uncontended release, nobody to wake
    NoWaiters,
    /// Waiters are registered and one must be woken
    HadWaiters(WaiterHandle),
    /// The slot was not locked at all
    NotLocked,
}

/// Atomic lock word
#[repr(transparent)]
#[derive(Debug, Default)]
pub struct AtomicOwnerSlot(AtomicUsize);

impl AtomicOwnerSlot {
    pub const fn new() -> Self {
        Self(AtomicUsize::new(UNLOCKED))
    }

    /// Fast path: unlocked -> locked-no-waiters
    #[inline]
    pub fn try_acquire(&self) -> bool {
        self.0
            .compare_exchange(UNLOCKED, LOCKED, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Slow path: mark the slot as having waiters
    ///
    /// Returns `true` if the slot was unlocked, in which case the caller now
    /// owns it (conservatively still flagged as contended).
    #[inline]
    pub fn acquire_contended(&self) -> bool {
        self.0.swap(CONTENDED, Ordering::Acquire) == UNLOCKED
    }

    /// Release the slot, reporting whether waiters must be woken
    #[inline]
    pub fn release(&self) -> Release {
        if self
            .0
            .compare_exchange(LOCKED, UNLOCKED, Ordering::Release, Ordering::Relaxed)
            .is_ok()
        {
            return Release::NoWaiters;
        }

        match self.0.swap(UNLOCKED, Ordering::Release) {
            UNLOCKED => Release::NotLocked,
            LOCKED => Release::NoWaiters,
            _ => Release::HadWaiters(self.waiter_handle()),
        }
    }

    #[inline]
    pub fn is_locked(&self) -> bool {
        self.0.load(Ordering::Relaxed) != UNLOCKED
    }

    #[inline]
    pub fn is_contended(&self) -> bool {
        self.0.load(Ordering::Relaxed) == CONTENDED
    }

    #[inline]
    pub fn is_unlocked(&self) -> bool {
        self.0.load(Ordering::Relaxed) == UNLOCKED
    }

    /// Current decoded state
    pub fn state(&self) -> OwnerState {
        match self.0.load(Ordering::Acquire) {
            UNLOCKED => OwnerState::Unlocked,
            LOCKED => OwnerState::LockedNoWaiters,
            _ => OwnerState::LockedWithWaiters(self.waiter_handle()),
        }
    }

    /// Wait-queue handle for this slot (its address)
    #[inline]
    pub fn waiter_handle(&self) -> WaiterHandle {
        WaiterHandle(&self.0 as *const AtomicUsize as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fast_path_transitions() {
        let slot = AtomicOwnerSlot::new();
        assert_eq!(slot.state(), OwnerState::Unlocked);

        assert!(slot.try_acquire());
        assert_eq!(slot.state(), OwnerState::LockedNoWaiters);
        assert!(!slot.try_acquire());

        assert_eq!(slot.release(), Release::NoWaiters);
        assert!(slot.is_unlocked());
    }

    #[test]
    fn test_contended_transitions() {
        let slot = AtomicOwnerSlot::new();
        assert!(slot.try_acquire());

        // A second thread registers as waiter
        assert!(!slot.acquire_contended());
        assert_eq!(
            slot.state(),
            OwnerState::LockedWithWaiters(slot.waiter_handle())
        );

        assert_eq!(slot.release(), Release::HadWaiters(slot.waiter_handle()));
        assert!(slot.is_unlocked());
    }

    #[test]
    fn test_contended_acquire_of_free_slot() {
        let slot = AtomicOwnerSlot::new();
        assert!(slot.acquire_contended());
        assert!(slot.is_contended());
    }

    #[test]
    fn test_release_unlocked_slot() {
        let slot = AtomicOwnerSlot::new();
        assert_eq!(slot.release(), Release::NotLocked);
    }
}
