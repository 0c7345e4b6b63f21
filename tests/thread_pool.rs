/*!
 * Thread Pool Integration Tests
 *
 * Capacity invariant, backpressure, reservations, expiry, and failure
 * isolation
 */

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use rand::Rng;
use serial_test::serial;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thread_core::core::sync::Guarded;
use thread_core::core::types::Deadline;
use thread_core::pool::{PoolConfig, ThreadPool};

fn pool_with(max: usize) -> ThreadPool {
    ThreadPool::with_config(PoolConfig::default().with_max_thread_count(max)).unwrap()
}

fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let start = Instant::now();
    while !condition() {
        assert!(start.elapsed() < Duration::from_secs(5), "timed out waiting for {what}");
        std::thread::sleep(Duration::from_millis(1));
    }
}

/// Counts tasks running at the same time and remembers the peak
#[derive(Default)]
struct Concurrency {
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl Concurrency {
    fn task(self: &Arc<Self>, hold: Duration) -> impl FnOnce() + Send + 'static {
        let this = Arc::clone(self);
        move || {
            let now = this.running.fetch_add(1, Ordering::SeqCst) + 1;
            this.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(hold);
            this.running.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

/// Blocks tasks until opened
#[derive(Default)]
struct Gate(AtomicBool);

impl Gate {
    fn blocker(self: &Arc<Self>) -> impl FnOnce() + Send + 'static {
        let this = Arc::clone(self);
        move || {
            while !this.0.load(Ordering::Acquire) {
                std::thread::sleep(Duration::from_millis(1));
            }
        }
    }

    fn open(&self) {
        self.0.store(true, Ordering::Release);
    }
}

#[test]
fn test_try_start_refuses_when_saturated() {
    let pool = pool_with(2);
    let gate = Arc::new(Gate::default());

    assert!(pool.try_start(gate.blocker()));
    assert!(pool.try_start(gate.blocker()));
    assert!(!pool.try_start(|| {}), "third task must be refused at capacity");
    assert_eq!(pool.queued_count(), 0);
    assert_eq!(pool.active_thread_count(), 2);

    gate.open();
    assert!(pool.wait_for_done(Deadline::after(Duration::from_secs(5))));
    assert!(pool.try_start(|| {}));
    assert!(pool.wait_for_done(Deadline::Forever));
}

#[test]
fn test_start_queues_beyond_capacity() {
    let pool = pool_with(1);
    let gate = Arc::new(Gate::default());
    let done = Arc::new(AtomicUsize::new(0));

    pool.start(gate.blocker());
    for _ in 0..5 {
        let done = done.clone();
        pool.start(move || {
            done.fetch_add(1, Ordering::SeqCst);
        });
    }
    assert_eq!(pool.queued_count(), 5);

    gate.open();
    assert!(pool.wait_for_done(Deadline::after(Duration::from_secs(5))));
    assert_eq!(done.load(Ordering::SeqCst), 5);
}

#[test]
fn test_queued_work_runs_by_priority() {
    let pool = pool_with(1);
    let gate = Arc::new(Gate::default());
    let order = Arc::new(Guarded::new(Vec::new()));

    pool.start(gate.blocker());
    for (tag, priority) in [(0, 0), (1, 3), (2, 1), (3, 3)] {
        let order = order.clone();
        pool.start_with_priority(move || order.lock().push(tag), priority);
    }

    gate.open();
    assert!(pool.wait_for_done(Deadline::after(Duration::from_secs(5))));
    assert_eq!(*order.lock(), vec![1, 3, 2, 0]);
}

#[test]
fn test_reserved_thread_bypasses_saturation() {
    let pool = pool_with(1);
    let gate = Arc::new(Gate::default());
    let ran = Arc::new(AtomicBool::new(false));

    pool.start(gate.blocker());
    assert!(!pool.try_start(|| {}));

    pool.reserve_thread();
    {
        let ran = ran.clone();
        pool.start_on_reserved_thread(move || ran.store(true, Ordering::SeqCst));
    }
    wait_until("reserved work", || ran.load(Ordering::SeqCst));

    gate.open();
    assert!(pool.wait_for_done(Deadline::after(Duration::from_secs(5))));
}

#[test]
fn test_raising_cap_starts_queued_work() {
    let pool = pool_with(1);
    let gate = Arc::new(Gate::default());
    let ran = Arc::new(AtomicBool::new(false));

    pool.start(gate.blocker());
    {
        let ran = ran.clone();
        pool.start(move || ran.store(true, Ordering::SeqCst));
    }
    assert_eq!(pool.queued_count(), 1);

    pool.set_max_thread_count(2);
    wait_until("queued work on new worker", || ran.load(Ordering::SeqCst));

    gate.open();
    assert!(pool.wait_for_done(Deadline::after(Duration::from_secs(5))));
}

#[test]
fn test_clear_drops_queued_work() {
    let pool = pool_with(1);
    let gate = Arc::new(Gate::default());
    let ran = Arc::new(AtomicUsize::new(0));

    pool.start(gate.blocker());
    for _ in 0..3 {
        let ran = ran.clone();
        pool.start(move || {
            ran.fetch_add(1, Ordering::SeqCst);
        });
    }
    assert_eq!(pool.clear(), 3);

    gate.open();
    assert!(pool.wait_for_done(Deadline::after(Duration::from_secs(5))));
    assert_eq!(ran.load(Ordering::SeqCst), 0);
}

#[test]
fn test_wait_for_done_times_out() {
    let pool = pool_with(1);
    let gate = Arc::new(Gate::default());
    pool.start(gate.blocker());

    assert!(!pool.wait_for_done(Deadline::after(Duration::from_millis(30))));
    gate.open();
    assert!(pool.wait_for_done(Deadline::Forever));
}

#[test]
fn test_idle_workers_expire() {
    let config = PoolConfig::default()
        .with_max_thread_count(2)
        .with_expiry_timeout(Some(Duration::from_millis(20)));
    let pool = ThreadPool::with_config(config).unwrap();

    let done = Arc::new(AtomicUsize::new(0));
    for _ in 0..4 {
        let done = done.clone();
        pool.start(move || {
            done.fetch_add(1, Ordering::SeqCst);
        });
    }
    assert!(pool.wait_for_done(Deadline::Forever));
    std::thread::sleep(Duration::from_millis(100));

    // Expired workers are replaced on demand
    let again = Arc::new(AtomicBool::new(false));
    {
        let again = again.clone();
        pool.start(move || again.store(true, Ordering::SeqCst));
    }
    assert!(pool.wait_for_done(Deadline::Forever));
    assert!(again.load(Ordering::SeqCst));
    assert_eq!(done.load(Ordering::SeqCst), 4);
}

#[test]
fn test_panicking_task_does_not_kill_pool() {
    let pool = pool_with(1);
    pool.start(|| panic!("task failure"));

    let ran = Arc::new(AtomicBool::new(false));
    {
        let ran = ran.clone();
        pool.start(move || ran.store(true, Ordering::SeqCst));
    }
    assert!(pool.wait_for_done(Deadline::after(Duration::from_secs(5))));
    assert!(ran.load(Ordering::SeqCst));
}

#[test]
fn test_drop_waits_for_work() {
    let done = Arc::new(AtomicUsize::new(0));
    {
        let pool = pool_with(2);
        for _ in 0..10 {
            let done = done.clone();
            pool.start(move || {
                std::thread::sleep(Duration::from_millis(2));
                done.fetch_add(1, Ordering::SeqCst);
            });
        }
    }
    assert_eq!(done.load(Ordering::SeqCst), 10);
}

#[test]
fn test_random_load_respects_capacity() {
    let pool = pool_with(3);
    let concurrency = Arc::new(Concurrency::default());
    let mut rng = rand::thread_rng();

    for _ in 0..60 {
        let hold = Duration::from_micros(rng.gen_range(0..2_000));
        if rng.gen_bool(0.5) {
            pool.start(concurrency.task(hold));
        } else {
            let _ = pool.try_start(concurrency.task(hold));
        }
    }

    assert!(pool.wait_for_done(Deadline::Forever));
    assert!(concurrency.peak.load(Ordering::SeqCst) <= 3);
}

#[test]
#[serial]
fn test_global_instance_is_shared() {
    let first = ThreadPool::global_instance();
    let second = ThreadPool::global_instance();
    assert!(std::ptr::eq(first, second));

    let ran = Arc::new(AtomicBool::new(false));
    {
        let ran = ran.clone();
        first.start(move || ran.store(true, Ordering::SeqCst));
    }
    wait_until("global pool work", || ran.load(Ordering::SeqCst));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_capacity_never_exceeded(
        max in 1usize..4,
        ops in proptest::collection::vec((any::<bool>(), 0u64..500), 1..40),
    ) {
        let pool = pool_with(max);
        let concurrency = Arc::new(Concurrency::default());

        for (queue, micros) in ops {
            let task = concurrency.task(Duration::from_micros(micros));
            if queue {
                pool.start(task);
            } else {
                let _ = pool.try_start(task);
            }
            prop_assert!(pool.active_thread_count() <= max);
        }

        prop_assert!(pool.wait_for_done(Deadline::Forever));
        prop_assert!(concurrency.peak.load(Ordering::SeqCst) <= max);
    }
}
