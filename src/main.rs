/*!
 * Thread Core - Demo Entry Point
 *
 * Exercises the library end to end:
 * - Recursive locking from several threads
 * - Event loop round trip with exit codes
 * - Thread pool dispatch with priorities
 */

use std::error::Error;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::info;

use thread_core::{
    init_tracing, Deadline, PoolConfig, RecursiveMutex, ScopedLock, Thread, ThreadPool,
};

const WORKERS: usize = 4;
const ITERATIONS: usize = 100;
const DEPTH: usize = 3;

fn main() -> Result<(), Box<dyn Error>> {
    init_tracing();

    info!("Thread core demo starting...");
    info!("================================================");
    info!(
        ideal_thread_count = Thread::ideal_thread_count(),
        main = Thread::is_main_thread(),
        "Host parallelism detected"
    );

    // Recursive locking
    info!("Running recursive mutex scenario...");
    let mutex = Arc::new(RecursiveMutex::new());
    let counter = Arc::new(AtomicUsize::new(0));
    let threads: Vec<Thread> = (0..WORKERS)
        .map(|_| {
            let mutex = mutex.clone();
            let counter = counter.clone();
            Thread::with_body(move || {
                for _ in 0..ITERATIONS {
                    let _outer = ScopedLock::locked(&*mutex);
                    let _middle = ScopedLock::locked(&*mutex);
                    let _inner = ScopedLock::locked(&*mutex);
                    for _ in 0..DEPTH {
                        counter.fetch_add(1, Ordering::Relaxed);
                    }
                }
            })
        })
        .collect();
    for thread in &threads {
        thread.start()?;
    }
    for thread in &threads {
        thread.wait(Deadline::Forever);
    }
    info!(
        counter = counter.load(Ordering::Relaxed),
        locked = mutex.is_locked(),
        "Recursive mutex scenario finished"
    );

    // Event loop round trip
    info!("Running event loop round trip...");
    let looper = Thread::new();
    looper.set_name("demo-loop");
    looper.start()?;
    let handled = Arc::new(AtomicUsize::new(0));
    for priority in [0, 5, 1] {
        let handled = handled.clone();
        looper.post(
            move || {
                handled.fetch_add(1, Ordering::SeqCst);
            },
            priority,
        );
    }
    let stopper = looper.handle();
    looper.post(move || stopper.exit(42), i32::MIN);
    looper.wait(Deadline::Forever);
    info!(handled = handled.load(Ordering::SeqCst), "Event loop finished");

    // Thread pool
    info!("Running thread pool...");
    let pool = ThreadPool::with_config(PoolConfig::from_env().with_max_thread_count(WORKERS))?;
    let done = Arc::new(AtomicUsize::new(0));
    for i in 0..64 {
        let done = done.clone();
        pool.start_with_priority(
            move || {
                done.fetch_add(1, Ordering::Relaxed);
            },
            i % 4,
        );
    }
    pool.wait_for_done(Deadline::Forever);
    info!(
        completed = done.load(Ordering::Relaxed),
        active = pool.active_thread_count(),
        "Thread pool drained"
    );

    info!("================================================");
    info!("Thread core demo finished");
    Ok(())
}
