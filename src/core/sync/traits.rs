/*!
 * Park Strategy Traits
 *
 * Core abstraction over the OS wait/wake capability the locks sit on.
 *
 * # Design: Static Dispatch
 *
 * Every lock in this crate parks on an address-derived key. The strategy
 * is chosen at compile time, so the trait has no `self` receiver and calls
 * inline into the lock's slow path.
 */

use crate::core::types::Deadline;

/// Result of a wake operation
///
/// Compact representation (single usize) for efficient returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeResult {
    /// Successfully woke N waiters (N >= 1)
    Woken(usize),
    /// No waiters were waiting
    NoWaiters,
}

impl WakeResult {
    /// Check if any waiters were woken
    #[inline(always)]
    pub fn is_woken(&self) -> bool {
        matches!(self, WakeResult::Woken(_))
    }

    /// Get number of woken waiters (0 if none)
    #[inline(always)]
    pub fn count(&self) -> usize {
        match self {
            WakeResult::Woken(n) => *n,
            WakeResult::NoWaiters => 0,
        }
    }

    pub(crate) fn from_count(n: usize) -> Self {
        if n == 0 {
            WakeResult::NoWaiters
        } else {
            WakeResult::Woken(n)
        }
    }
}

/// Outcome of parking a thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParkOutcome {
    /// Woken by an unpark call (or the parked-on state changed)
    Woken,
    /// The deadline elapsed first
    TimedOut,
    /// Validation failed before sleeping; the state already changed
    Invalid,
}

/// Strategy for blocking a thread on a key until another thread wakes it
///
/// Implementations must be:
/// - **Race-free**: `validate` is evaluated atomically with respect to
///   `unpark_*` on the same key, so a wake issued after the parked-on state
///   changed is never lost
/// - **Deadline-bounded**: `park` never sleeps past `deadline`
///
/// Spurious wakeups are allowed; callers re-check their condition.
pub trait Parker: Send + Sync + 'static {
    /// Strategy name for debugging
    const NAME: &'static str;

    /// Park the calling thread on `key` while `validate` returns `true`
    fn park(key: usize, validate: &dyn Fn() -> bool, deadline: Deadline) -> ParkOutcome;

    /// Wake at most one thread parked on `key`
    fn unpark_one(key: usize) -> WakeResult;

    /// Wake every thread parked on `key`
    fn unpark_all(key: usize) -> WakeResult;
}
