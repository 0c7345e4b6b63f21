/*!
 * Futex-Based Park Strategy
 *
 * Uses parking_lot_core for futex-like operations on all platforms.
 * Waiter queues live in parking_lot_core's global hash table keyed by the
 * address of the lock word, so no per-lock allocation is ever made.
 */

use super::traits::{ParkOutcome, Parker, WakeResult};
use crate::core::types::Deadline;
use parking_lot_core::{park, unpark_all, unpark_one, ParkResult, ParkToken, UnparkToken};

/// Futex-style parking through parking_lot_core
///
/// # Performance
///
/// - Zero allocations
/// - Direct futex syscalls on Linux
/// - O(1) bucket lookup by address
pub struct FutexParker;

impl Parker for FutexParker {
    const NAME: &'static str = "futex";

    fn park(key: usize, validate: &dyn Fn() -> bool, deadline: Deadline) -> ParkOutcome {
        // SAFETY: the callbacks neither panic nor call back into the parking
        // lot, and `key` is the address of a lock word owned by the caller.
        let result = unsafe {
            park(
                key,
                validate,
                || {},
                |_key, _was_last| {},
                ParkToken(0),
                deadline.instant(),
            )
        };

        match result {
            ParkResult::Unparked(_) => ParkOutcome::Woken,
            ParkResult::TimedOut => ParkOutcome::TimedOut,
            ParkResult::Invalid => ParkOutcome::Invalid,
        }
    }

    fn unpark_one(key: usize) -> WakeResult {
        // SAFETY: the callback does not call into the parking lot
        let result = unsafe { unpark_one(key, |_| UnparkToken(0)) };
        WakeResult::from_count(result.unparked_threads)
    }

    fn unpark_all(key: usize) -> WakeResult {
        // SAFETY: no callbacks
        let unparked = unsafe { unpark_all(key, UnparkToken(0)) };
        WakeResult::from_count(unparked)
    }
}
