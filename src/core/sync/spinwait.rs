/*!
 * Spin-Wait Park Strategy
 *
 * Portable fallback that never sleeps in the kernel on a wait queue.
 * Parked threads poll their validation callback with escalating backoff
 * (spin, yield, short sleeps), so wakes are implicit in the state change.
 */

use super::traits::{ParkOutcome, Parker, WakeResult};
use crate::core::limits::{SPIN_PARK_POLL_INTERVAL, SPIN_PARK_YIELD_ROUNDS};
use crate::core::types::Deadline;
use std::hint;
use std::thread;

/// Polling park strategy
///
/// # Use Cases
///
/// Best for scenarios where:
/// - No futex-like primitive is available
/// - Waits are typically very short
/// - CPU usage during waits is an acceptable trade-off
pub struct SpinParker;

impl SpinParker {
    fn backoff(round: u32, deadline: Deadline) {
        if round < 8 {
            for _ in 0..(1u32 << round) {
                hint::spin_loop();
            }
        } else if round < SPIN_PARK_YIELD_ROUNDS {
            thread::yield_now();
        } else {
            let nap = deadline
                .remaining()
                .map_or(SPIN_PARK_POLL_INTERVAL, |left| left.min(SPIN_PARK_POLL_INTERVAL));
            thread::sleep(nap);
        }
    }
}

impl Parker for SpinParker {
    const NAME: &'static str = "spinwait";

    fn park(_key: usize, validate: &dyn Fn() -> bool, deadline: Deadline) -> ParkOutcome {
        if !validate() {
            return ParkOutcome::Invalid;
        }

        let mut round = 0u32;
        loop {
            if deadline.has_expired() {
                return ParkOutcome::TimedOut;
            }
            Self::backoff(round, deadline);
            round = round.saturating_add(1);
            if !validate() {
                return ParkOutcome::Woken;
            }
        }
    }

    fn unpark_one(_key: usize) -> WakeResult {
        // Waiters observe the state change on their next poll
        WakeResult::NoWaiters
    }

    fn unpark_all(_key: usize) -> WakeResult {
        WakeResult::NoWaiters
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    #[test]
    fn test_spinwait_timeout() {
        let start = Instant::now();
        let result = SpinParker::park(0, &|| true, Deadline::after(Duration::from_millis(50)));
        let elapsed = start.elapsed();

        assert_eq!(result, ParkOutcome::TimedOut);
        assert!(elapsed >= Duration::from_millis(50));
    }

    #[test]
    fn test_spinwait_observes_state_change() {
        let flag = Arc::new(AtomicBool::new(true));
        let flag_clone = flag.clone();

        let handle = thread::spawn(move || {
            SpinParker::park(
                0,
                &|| flag_clone.load(Ordering::Acquire),
                Deadline::after(Duration::from_secs(5)),
            )
        });

        thread::sleep(Duration::from_millis(20));
        flag.store(false, Ordering::Release);

        assert_eq!(handle.join().unwrap(), ParkOutcome::Woken);
    }
}
