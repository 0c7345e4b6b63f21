/*!
 * End-to-End Scenario
 *
 * Several threads repeatedly take a recursive mutex three levels deep and
 * bump a shared counter once per level.
 */

use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thread_core::core::sync::OwnerState;
use thread_core::core::types::Deadline;
use thread_core::{RecursiveMutex, ScopedLock, Thread};

const THREADS: usize = 4;
const ITERATIONS: usize = 100;

#[test]
fn test_nested_recursive_locking_across_threads() {
    let mutex = Arc::new(RecursiveMutex::new());
    let counter = Arc::new(AtomicU64::new(0));

    let threads: Vec<Thread> = (0..THREADS)
        .map(|_| {
            let mutex = mutex.clone();
            let counter = counter.clone();
            Thread::with_body(move || {
                for _ in 0..ITERATIONS {
                    let _first = ScopedLock::locked(&*mutex);
                    counter.fetch_add(1, Ordering::Relaxed);
                    let _second = ScopedLock::locked(&*mutex);
                    counter.fetch_add(1, Ordering::Relaxed);
                    let _third = ScopedLock::locked(&*mutex);
                    assert_eq!(mutex.count(), 3);
                    counter.fetch_add(1, Ordering::Relaxed);
                }
            })
        })
        .collect();

    for thread in &threads {
        thread.start().unwrap();
    }
    for thread in &threads {
        assert!(thread.wait(Deadline::Forever));
        assert!(thread.is_finished());
    }

    assert_eq!(counter.load(Ordering::SeqCst), (THREADS * ITERATIONS * 3) as u64);
    assert_eq!(mutex.owner(), None);
    assert_eq!(mutex.count(), 0);
    assert!(!mutex.is_locked());
    assert_eq!(mutex.state(), OwnerState::Unlocked);
}
