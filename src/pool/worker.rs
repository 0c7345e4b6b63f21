/*!
 * Pool Workers
 *
 * Each worker runs its first task, then drains the shared queue. With
 * nothing left it parks on its own wait condition until handed more work
 * or until the expiry timeout passes, at which point it retires.
 */

use super::pool::{PoolShared, PoolState};
use crate::core::sync::{Guarded, GuardedGuard, WaitCondition};
use crate::core::types::Deadline;
use crate::monitoring::TaskSpan;
use crate::thread::{panic_message, Thread, WorkItem};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{error, trace};

/// Per-worker wake-up channel
pub(super) struct WorkerSlot {
    pub(super) id: usize,
    pub(super) ready: WaitCondition,
    initial: Guarded<Option<WorkItem>>,
}

impl WorkerSlot {
    pub(super) fn new(id: usize, first: WorkItem) -> Arc<Self> {
        Arc::new(Self {
            id,
            ready: WaitCondition::new(),
            initial: Guarded::new(Some(first)),
        })
    }

    /// First task, if the worker has not picked it up yet
    pub(super) fn take_initial(&self) -> Option<WorkItem> {
        self.initial.lock().take()
    }
}

/// A worker's OS thread and its wake-up channel
pub(super) struct PoolWorker {
    pub(super) slot: Arc<WorkerSlot>,
    pub(super) thread: Thread,
}

impl PoolWorker {
    /// Block until the worker's thread has exited, then release it
    pub(super) fn join(self) {
        self.thread.wait(Deadline::Forever);
    }
}

/// Body of every pool thread
pub(super) fn worker_main(shared: Arc<PoolShared>, slot: Arc<WorkerSlot>) {
    let mut state = shared.state.lock();
    let mut task = slot.take_initial();

    loop {
        loop {
            if let Some(item) = task.take() {
                GuardedGuard::unlocked(&mut state, || run_task(slot.id, item));
            }
            if state.too_many_threads_active() {
                break;
            }
            match state.queue.dequeue() {
                Some(next) => task = Some(next),
                None => break,
            }
        }

        let mut expired = state.too_many_threads_active();
        if !expired {
            if state.exiting {
                shared.register_thread_inactive(&mut state);
                break;
            }

            state.waiting.push_back(Arc::clone(&slot));
            shared.register_thread_inactive(&mut state);

            let deadline = state
                .expiry_timeout
                .map_or(Deadline::Forever, Deadline::after);
            slot.ready.wait(&mut state, deadline);
            state.active_threads += 1;

            // Still listed as waiting: nobody handed us work before the timeout
            if remove_waiting(&mut state, &slot) {
                expired = true;
            }
            if state.exiting {
                shared.register_thread_inactive(&mut state);
                break;
            }
        }

        if expired {
            state.expired.push(slot.id);
            shared.register_thread_inactive(&mut state);
            trace!(worker = slot.id, "Pool worker expired");
            break;
        }
    }
}

fn remove_waiting(state: &mut PoolState, slot: &Arc<WorkerSlot>) -> bool {
    match state.waiting.iter().position(|w| Arc::ptr_eq(w, slot)) {
        Some(at) => {
            state.waiting.remove(at);
            true
        }
        None => false,
    }
}

fn run_task(worker: usize, item: WorkItem) {
    let priority = item.priority();
    let span = TaskSpan::new("pool", worker, priority);
    let _entered = span.enter();
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| item.run())) {
        error!(
            worker,
            priority,
            panic = %panic_message(&*payload),
            "Pool task panicked"
        );
    }
}
