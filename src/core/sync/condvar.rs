/*!
 * Wait Condition
 *
 * Condition variable paired with [`Guarded`] values. A sequence word is
 * bumped on every wake; a waiter parks only while the word still holds the
 * value it read under the lock, so a wake between unlocking and parking is
 * never lost.
 */

use super::mutex::GuardedGuard;
use super::traits::{ParkOutcome, Parker, WakeResult};
use super::ActiveParker;
use crate::core::types::Deadline;
use std::sync::atomic::{AtomicU32, Ordering};

/// Condition variable for [`Guarded`](super::Guarded) values
///
/// Spurious wakeups are possible; callers re-check their predicate.
#[derive(Debug, Default)]
pub struct WaitCondition {
    seq: AtomicU32,
}

impl WaitCondition {
    pub const fn new() -> Self {
        Self {
            seq: AtomicU32::new(0),
        }
    }

    /// Release `guard`, block until woken or `deadline`, then relock
    ///
    /// Returns `false` only if the deadline elapsed without a wake.
    pub fn wait<T>(&self, guard: &mut GuardedGuard<'_, T>, deadline: Deadline) -> bool {
        let observed = self.seq.load(Ordering::Acquire);
        let key = self.key();

        let outcome = GuardedGuard::unlocked(guard, || {
            ActiveParker::park(
                key,
                &|| self.seq.load(Ordering::Acquire) == observed,
                deadline,
            )
        });

        outcome != ParkOutcome::TimedOut
    }

    /// Wait until `condition` returns `false` or `deadline` passes
    ///
    /// Returns `true` if the condition was cleared in time.
    pub fn wait_while<T, F>(
        &self,
        guard: &mut GuardedGuard<'_, T>,
        deadline: Deadline,
        mut condition: F,
    ) -> bool
    where
        F: FnMut(&mut T) -> bool,
    {
        while condition(&mut **guard) {
            if deadline.has_expired() || !self.wait(guard, deadline) {
                return !condition(&mut **guard);
            }
        }
        true
    }

    pub fn wake_one(&self) -> WakeResult {
        self.seq.fetch_add(1, Ordering::Release);
        ActiveParker::unpark_one(self.key())
    }

    pub fn wake_all(&self) -> WakeResult {
        self.seq.fetch_add(1, Ordering::Release);
        ActiveParker::unpark_all(self.key())
    }

    #[inline]
    fn key(&self) -> usize {
        &self.seq as *const AtomicU32 as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::sync::Guarded;
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    #[test]
    fn test_wait_timeout() {
        let value = Guarded::new(());
        let cond = WaitCondition::new();
        let mut guard = value.lock();

        let start = Instant::now();
        let woken = cond.wait(&mut guard, Deadline::after(Duration::from_millis(50)));
        assert!(!woken);
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_wait_while_predicate() {
        let shared = Arc::new((Guarded::new(0u32), WaitCondition::new()));
        let shared_clone = shared.clone();

        let handle = thread::spawn(move || {
            let (value, cond) = &*shared_clone;
            let mut guard = value.lock();
            cond.wait_while(&mut guard, Deadline::after(Duration::from_secs(5)), |v| *v < 5)
        });

        thread::sleep(Duration::from_millis(50));
        {
            let (value, cond) = &*shared;
            *value.lock() = 10;
            cond.wake_all();
        }

        assert!(handle.join().unwrap());
    }

    #[test]
    fn test_wake_all_releases_every_waiter() {
        let shared = Arc::new((Guarded::new(false), WaitCondition::new()));

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let shared = shared.clone();
                thread::spawn(move || {
                    let (flag, cond) = &*shared;
                    let mut guard = flag.lock();
                    cond.wait_while(&mut guard, Deadline::after(Duration::from_secs(5)), |f| !*f)
                })
            })
            .collect();

        thread::sleep(Duration::from_millis(50));
        {
            let (flag, cond) = &*shared;
            *flag.lock() = true;
            cond.wake_all();
        }

        for handle in handles {
            assert!(handle.join().unwrap());
        }
    }
}
