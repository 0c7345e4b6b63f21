/*!
 * Thread Pool
 *
 * Reusable worker threads with a priority-ordered queue of pending work.
 *
 * # Accounting
 *
 * `active_thread_count = workers - expired - waiting + reserved`. New work
 * is dispatched directly only while that count is below
 * `max_thread_count`; otherwise it is queued. A worker stops taking queued
 * work once the count exceeds the cap, unless it is the last non-reserved
 * worker.
 */

use super::config::PoolConfig;
use super::worker::{worker_main, PoolWorker, WorkerSlot};
use crate::core::errors::PoolResult;
use crate::core::sync::{Guarded, WaitCondition};
use crate::core::types::{Deadline, Priority};
use crate::thread::{PostQueue, Thread, WorkItem};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Struct-based unit of work for [`ThreadPool::start_runnable`]
pub trait Runnable: Send {
    fn run(&mut self);
}

pub(super) struct PoolState {
    pub(super) workers: Vec<PoolWorker>,
    pub(super) waiting: VecDeque<Arc<WorkerSlot>>,
    pub(super) expired: Vec<usize>,
    pub(super) queue: PostQueue,
    /// Workers running or about to run work
    pub(super) active_threads: usize,
    pub(super) reserved: usize,
    pub(super) max_thread_count: usize,
    pub(super) expiry_timeout: Option<Duration>,
    pub(super) stack_size: usize,
    pub(super) thread_priority: Priority,
    pub(super) name_prefix: String,
    pub(super) next_worker_id: usize,
    pub(super) exiting: bool,
}

impl PoolState {
    fn new(config: PoolConfig) -> Self {
        Self {
            workers: Vec::new(),
            waiting: VecDeque::new(),
            expired: Vec::new(),
            queue: PostQueue::new(),
            active_threads: 0,
            reserved: 0,
            max_thread_count: config.max_thread_count,
            expiry_timeout: config.expiry_timeout,
            stack_size: config.stack_size,
            thread_priority: config.thread_priority,
            name_prefix: config.thread_name_prefix,
            next_worker_id: 0,
            exiting: false,
        }
    }

    pub(super) fn active_thread_count(&self) -> usize {
        self.workers
            .len()
            .saturating_sub(self.expired.len())
            .saturating_sub(self.waiting.len())
            + self.reserved
    }

    pub(super) fn too_many_threads_active(&self) -> bool {
        let active = self.active_thread_count();
        active > self.max_thread_count && active - self.reserved > 1
    }

    /// Detach expired workers so they can be joined outside the lock
    fn take_expired(&mut self) -> Vec<PoolWorker> {
        if self.expired.is_empty() {
            return Vec::new();
        }
        let ids = std::mem::take(&mut self.expired);
        let (gone, kept): (Vec<PoolWorker>, Vec<PoolWorker>) = std::mem::take(&mut self.workers)
            .into_iter()
            .partition(|w| ids.contains(&w.slot.id));
        self.workers = kept;
        gone
    }
}

pub(super) struct PoolShared {
    pub(super) state: Guarded<PoolState>,
    no_active_threads: WaitCondition,
}

impl PoolShared {
    pub(super) fn register_thread_inactive(&self, state: &mut PoolState) {
        state.active_threads -= 1;
        if state.active_threads == 0 {
            self.no_active_threads.wake_all();
        }
    }

    /// Dispatch `item` now if capacity allows, handing it back otherwise
    fn try_start(self: &Arc<Self>, state: &mut PoolState, item: WorkItem) -> Result<(), WorkItem> {
        if state.workers.is_empty() {
            return self.start_thread(state, item);
        }

        if state.active_thread_count() >= state.max_thread_count {
            return Err(item);
        }

        if let Some(slot) = state.waiting.pop_front() {
            state.queue.enqueue(item);
            slot.ready.wake_one();
            return Ok(());
        }

        self.start_thread(state, item)
    }

    fn start_thread(self: &Arc<Self>, state: &mut PoolState, item: WorkItem) -> Result<(), WorkItem> {
        let id = state.next_worker_id;
        state.next_worker_id += 1;

        let slot = WorkerSlot::new(id, item);
        let shared = Arc::clone(self);
        let worker_slot = Arc::clone(&slot);
        let thread = Thread::with_body(move || worker_main(shared, worker_slot));
        thread.set_name(format!("{}-{}", state.name_prefix, id));
        if state.stack_size > 0 {
            if let Err(err) = thread.set_stack_size(state.stack_size) {
                warn!(worker = id, error = %err, "Could not apply worker stack size");
            }
        }

        state.active_threads += 1;
        match thread.start_with_priority(state.thread_priority) {
            Ok(()) => {
                state.workers.push(PoolWorker { slot, thread });
                trace!(worker = id, "Pool worker started");
                Ok(())
            }
            Err(err) => {
                state.active_threads -= 1;
                warn!(worker = id, error = %err, "Failed to start pool worker");
                slot.take_initial().map_or(Ok(()), Err)
            }
        }
    }

    /// Hand queued work to idle or new workers while under the cap
    fn try_to_start_more_threads(self: &Arc<Self>, state: &mut PoolState) {
        let mut unclaimed = state.queue.len();
        while unclaimed > 0 && state.active_thread_count() < state.max_thread_count {
            if let Some(slot) = state.waiting.pop_front() {
                slot.ready.wake_one();
                unclaimed -= 1;
                continue;
            }

            let Some(item) = state.queue.dequeue() else {
                break;
            };
            if let Err(item) = self.start_thread(state, item) {
                state.queue.requeue(item);
                break;
            }
            unclaimed -= 1;
        }
    }
}

fn join_workers(workers: Vec<PoolWorker>) {
    for worker in workers {
        worker.join();
    }
}

/// Pool of reusable worker threads
///
/// Work never blocks the submitter: it runs on an idle or new worker, or
/// waits in a queue ordered by priority (FIFO within a priority).
///
/// Dropping the pool waits for all queued and running work, then joins
/// every worker. Dropping or calling [`wait_for_done`](Self::wait_for_done)
/// from inside one of the pool's own tasks deadlocks.
///
/// # Example
///
/// ```
/// use thread_core::pool::ThreadPool;
/// use thread_core::core::types::Deadline;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// let pool = ThreadPool::new();
/// let done = Arc::new(AtomicUsize::new(0));
/// for _ in 0..8 {
///     let done = done.clone();
///     pool.start(move || {
///         done.fetch_add(1, Ordering::SeqCst);
///     });
/// }
/// assert!(pool.wait_for_done(Deadline::Forever));
/// assert_eq!(done.load(Ordering::SeqCst), 8);
/// ```
pub struct ThreadPool {
    shared: Arc<PoolShared>,
}

impl ThreadPool {
    /// Pool with default configuration
    pub fn new() -> Self {
        Self::from_valid_config(PoolConfig::default())
    }

    pub fn with_config(config: PoolConfig) -> PoolResult<Self> {
        config.validate()?;
        Ok(Self::from_valid_config(config))
    }

    fn from_valid_config(config: PoolConfig) -> Self {
        debug!(
            max_thread_count = config.max_thread_count,
            expiry_timeout = ?config.expiry_timeout,
            "Thread pool created"
        );
        Self {
            shared: Arc::new(PoolShared {
                state: Guarded::new(PoolState::new(config)),
                no_active_threads: WaitCondition::new(),
            }),
        }
    }

    /// Lazily created process-wide pool, configured from the environment
    pub fn global_instance() -> &'static ThreadPool {
        static GLOBAL: OnceLock<ThreadPool> = OnceLock::new();
        GLOBAL.get_or_init(|| {
            ThreadPool::with_config(PoolConfig::from_env()).unwrap_or_else(|err| {
                warn!(error = %err, "Invalid pool configuration in environment, using defaults");
                ThreadPool::new()
            })
        })
    }

    /// Run `f` at priority 0
    pub fn start<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.start_with_priority(f, 0);
    }

    /// Run `f` now if a worker is available, otherwise queue it by `priority`
    pub fn start_with_priority<F>(&self, f: F, priority: i32)
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit(WorkItem::new(priority, f));
    }

    pub fn start_runnable(&self, runnable: Box<dyn Runnable>, priority: i32) {
        let mut runnable = runnable;
        self.start_with_priority(move || runnable.run(), priority);
    }

    fn submit(&self, item: WorkItem) {
        let reaped = {
            let mut state = self.shared.state.lock();
            let reaped = state.take_expired();
            if let Err(item) = self.shared.try_start(&mut state, item) {
                state.queue.enqueue(item);
                if let Some(slot) = state.waiting.pop_front() {
                    slot.ready.wake_one();
                }
            }
            reaped
        };
        join_workers(reaped);
    }

    /// Run `f` only if a worker is available right now
    ///
    /// Returns `false`, dropping `f`, when the pool is at capacity or no
    /// worker could be started. Never queues.
    pub fn try_start<F>(&self, f: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let item = WorkItem::new(0, f);
        let (accepted, reaped) = {
            let mut state = self.shared.state.lock();
            let reaped = state.take_expired();
            (self.shared.try_start(&mut state, item).is_ok(), reaped)
        };
        join_workers(reaped);
        accepted
    }

    /// Exempt one thread from the capacity cap
    pub fn reserve_thread(&self) {
        self.shared.state.lock().reserved += 1;
    }

    /// Give back a reservation made with [`reserve_thread`](Self::reserve_thread)
    pub fn release_thread(&self) {
        let mut state = self.shared.state.lock();
        if state.reserved == 0 {
            warn!("ThreadPool::release_thread called without a reservation");
            return;
        }
        state.reserved -= 1;
        self.shared.try_to_start_more_threads(&mut state);
    }

    /// Run `f` on a previously reserved thread, consuming the reservation
    ///
    /// Starts a thread beyond the cap if no worker is free, so the caller
    /// is never starved by saturation.
    pub fn start_on_reserved_thread<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.shared.state.lock();
        if state.reserved == 0 {
            warn!("ThreadPool::start_on_reserved_thread called without a reservation");
        } else {
            state.reserved -= 1;
        }

        let item = WorkItem::new(0, f);
        if let Err(item) = self.shared.try_start(&mut state, item) {
            if let Err(item) = self.shared.start_thread(&mut state, item) {
                warn!("No thread available for reserved work, queueing");
                state.queue.enqueue(item);
            }
        }
    }

    /// Wait until the queue is empty and no worker is busy
    pub fn wait_for_done(&self, deadline: Deadline) -> bool {
        let (done, reaped) = {
            let mut state = self.shared.state.lock();
            let done = self
                .shared
                .no_active_threads
                .wait_while(&mut state, deadline, |s| {
                    !(s.queue.is_empty() && s.active_threads == 0)
                });
            (done, state.take_expired())
        };
        join_workers(reaped);
        done
    }

    /// Drop all queued work that has not started, returning how much
    pub fn clear(&self) -> usize {
        let dropped = self.shared.state.lock().queue.clear();
        self.shared.no_active_threads.wake_all();
        if dropped > 0 {
            debug!(dropped, "Cleared queued pool work");
        }
        dropped
    }

    pub fn active_thread_count(&self) -> usize {
        self.shared.state.lock().active_thread_count()
    }

    pub fn max_thread_count(&self) -> usize {
        self.shared.state.lock().max_thread_count
    }

    /// Change the cap; raising it starts queued work at once
    ///
    /// A count of 0 is raised to 1.
    pub fn set_max_thread_count(&self, count: usize) {
        if count == 0 {
            warn!("ThreadPool::set_max_thread_count: using 1 instead of 0");
        }
        let count = count.max(1);
        let mut state = self.shared.state.lock();
        if state.max_thread_count == count {
            return;
        }
        state.max_thread_count = count;
        self.shared.try_to_start_more_threads(&mut state);
    }

    pub fn queued_count(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    pub fn expiry_timeout(&self) -> Option<Duration> {
        self.shared.state.lock().expiry_timeout
    }

    /// Idle time before a worker exits; affects workers that go idle later
    pub fn set_expiry_timeout(&self, timeout: Option<Duration>) {
        self.shared.state.lock().expiry_timeout = timeout;
    }

    pub fn stack_size(&self) -> usize {
        self.shared.state.lock().stack_size
    }

    /// Stack size for workers started from now on
    pub fn set_stack_size(&self, bytes: usize) {
        self.shared.state.lock().stack_size = bytes;
    }

    pub fn thread_priority(&self) -> Priority {
        self.shared.state.lock().thread_priority
    }

    /// Priority for workers started from now on
    pub fn set_thread_priority(&self, priority: Priority) {
        self.shared.state.lock().thread_priority = priority;
    }
}

impl Default for ThreadPool {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("ThreadPool")
            .field("workers", &state.workers.len())
            .field("waiting", &state.waiting.len())
            .field("active", &state.active_thread_count())
            .field("reserved", &state.reserved)
            .field("queued", &state.queue.len())
            .field("max_thread_count", &state.max_thread_count)
            .finish()
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.wait_for_done(Deadline::Forever);

        let workers = {
            let mut state = self.shared.state.lock();
            state.exiting = true;
            for slot in state.waiting.drain(..) {
                slot.ready.wake_one();
            }
            std::mem::take(&mut state.workers)
        };

        debug!(workers = workers.len(), "Thread pool shutting down");
        join_workers(workers);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn small_pool(max: usize) -> ThreadPool {
        ThreadPool::with_config(PoolConfig::default().with_max_thread_count(max)).unwrap()
    }

    #[test]
    fn test_runs_all_work() {
        let pool = small_pool(3);
        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..50 {
            let done = done.clone();
            pool.start(move || {
                done.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert!(pool.wait_for_done(Deadline::Forever));
        assert_eq!(done.load(Ordering::SeqCst), 50);
        assert!(pool.active_thread_count() <= 3);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = ThreadPool::with_config(PoolConfig::default().with_max_thread_count(0));
        assert!(result.is_err());
    }

    #[test]
    fn test_reservation_accounting() {
        let pool = small_pool(2);
        pool.reserve_thread();
        assert_eq!(pool.active_thread_count(), 1);
        pool.release_thread();
        assert_eq!(pool.active_thread_count(), 0);
    }

    #[test]
    fn test_runnable_struct() {
        struct Count(Arc<AtomicUsize>);
        impl Runnable for Count {
            fn run(&mut self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let pool = small_pool(1);
        let hits = Arc::new(AtomicUsize::new(0));
        pool.start_runnable(Box::new(Count(hits.clone())), 0);
        assert!(pool.wait_for_done(Deadline::Forever));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_zero_max_clamped() {
        let pool = small_pool(2);
        pool.set_max_thread_count(0);
        assert_eq!(pool.max_thread_count(), 1);
    }
}
