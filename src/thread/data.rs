/*!
 * Thread Data
 *
 * Per-thread context shared between the `Thread` wrapper, the running OS
 * thread, and any event loop nested inside it. Shared through `Arc`; the
 * context holds only a weak back-reference to its thread, nulled when the
 * owning `Thread` goes away.
 */

use super::adopted;
use super::event_loop::LoopState;
use super::post::{PostQueue, WorkItem};
use super::thread::{ThreadHandle, ThreadInner};
use crate::core::sync::{Guarded, WaitCondition};
use crate::core::types::{Deadline, ThreadId};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

/// Queue and active event loops, guarded together so that a wake can
/// never slip between a loop's exit check and its wait
#[derive(Default)]
struct Inbox {
    queue: PostQueue,
    loops: Vec<Arc<LoopState>>,
    /// Set once the thread finished; later posts are refused
    closed: bool,
}

/// Context of one thread of execution
pub struct ThreadData {
    thread: Guarded<Weak<ThreadInner>>,
    thread_id: AtomicUsize,
    adopted: bool,
    interruption_requested: AtomicBool,
    quit_now: AtomicBool,
    loop_level: AtomicUsize,
    inbox: Guarded<Inbox>,
    inbox_cond: WaitCondition,
}

impl ThreadData {
    pub(crate) fn new(adopted: bool) -> Self {
        Self {
            thread: Guarded::new(Weak::new()),
            thread_id: AtomicUsize::new(0),
            adopted,
            interruption_requested: AtomicBool::new(false),
            quit_now: AtomicBool::new(false),
            loop_level: AtomicUsize::new(0),
            inbox: Guarded::new(Inbox::default()),
            inbox_cond: WaitCondition::new(),
        }
    }

    /// Context of the calling thread, adopting it if necessary
    pub fn current() -> Arc<ThreadData> {
        Arc::clone(adopted::current().data())
    }

    /// Number of live references (wrappers, handles, the OS thread itself)
    pub fn ref_count(this: &Arc<Self>) -> usize {
        Arc::strong_count(this)
    }

    /// The thread this context describes, while its wrapper is alive
    pub fn thread(&self) -> Option<ThreadHandle> {
        self.thread.lock().upgrade().map(ThreadHandle::from_inner)
    }

    pub(crate) fn set_thread(&self, thread: Weak<ThreadInner>) {
        *self.thread.lock() = thread;
    }

    pub(crate) fn clear_thread(&self) {
        *self.thread.lock() = Weak::new();
    }

    /// OS identity of the thread running this context, once it has run
    pub fn thread_id(&self) -> Option<ThreadId> {
        ThreadId::from_usize(self.thread_id.load(Ordering::Acquire))
    }

    pub(crate) fn bind_to_current(&self) {
        self.thread_id
            .store(ThreadId::current().as_usize(), Ordering::Release);
    }

    pub fn is_adopted(&self) -> bool {
        self.adopted
    }

    /// Set the advisory interruption flag
    pub fn request_interruption(&self) {
        self.interruption_requested.store(true, Ordering::Relaxed);
    }

    /// Raw flag read; meaningful only from the described thread while it runs
    pub fn is_interruption_requested(&self) -> bool {
        self.interruption_requested.load(Ordering::Relaxed)
    }

    pub(crate) fn clear_interruption(&self) {
        self.interruption_requested.store(false, Ordering::Relaxed);
    }

    pub(crate) fn quit_now(&self) -> bool {
        self.quit_now.load(Ordering::Acquire)
    }

    pub(crate) fn set_quit_now(&self, quit: bool) {
        self.quit_now.store(quit, Ordering::Release);
    }

    /// Depth of nested `exec()` calls currently running on this thread
    pub fn loop_level(&self) -> usize {
        self.loop_level.load(Ordering::Acquire)
    }

    /// Queue `item` for the thread's event loop
    ///
    /// Returns `false`, dropping the item, once the thread has finished.
    pub fn post(&self, item: WorkItem) -> bool {
        {
            let mut inbox = self.inbox.lock();
            if inbox.closed {
                return false;
            }
            inbox.queue.enqueue(item);
        }
        self.inbox_cond.wake_all();
        true
    }

    /// Items waiting to be processed
    pub fn pending_count(&self) -> usize {
        self.inbox.lock().queue.len()
    }

    /// Refuse further posts and drop whatever is still queued
    pub(crate) fn close(&self) -> usize {
        let mut inbox = self.inbox.lock();
        inbox.closed = true;
        inbox.queue.clear()
    }

    /// Register a loop as running and bump the nesting level
    ///
    /// A thread exit that arrived before registration stops the loop at
    /// once; `exit` sets `quit_now` before taking the inbox lock.
    pub(crate) fn enter_loop(&self, state: &Arc<LoopState>) {
        {
            let mut inbox = self.inbox.lock();
            inbox.loops.push(Arc::clone(state));
            if self.quit_now() {
                state.request_exit(-1);
            }
        }
        self.loop_level.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn leave_loop(&self, state: &Arc<LoopState>) {
        self.inbox
            .lock()
            .loops
            .retain(|registered| !Arc::ptr_eq(registered, state));
        self.loop_level.fetch_sub(1, Ordering::AcqRel);
    }

    /// Ask one loop to return `code`
    pub(crate) fn exit_loop(&self, state: &LoopState, code: i32) {
        {
            let _inbox = self.inbox.lock();
            state.request_exit(code);
        }
        self.inbox_cond.wake_all();
    }

    /// Ask every running loop on this thread to return `code`
    pub(crate) fn exit_all_loops(&self, code: i32) {
        {
            let inbox = self.inbox.lock();
            for state in &inbox.loops {
                state.request_exit(code);
            }
        }
        self.inbox_cond.wake_all();
    }

    /// Interrupt a blocked loop so it re-checks its state
    pub(crate) fn wake_up(&self) {
        self.inbox_cond.wake_all();
    }

    /// Next item for the loop owning `state`
    ///
    /// Returns `None` once the loop has been asked to exit, or when nothing
    /// is queued and `block` is false.
    pub(crate) fn next_item(&self, state: &LoopState, block: bool) -> Option<WorkItem> {
        let mut inbox = self.inbox.lock();
        loop {
            if state.exit_requested() {
                return None;
            }
            if let Some(item) = inbox.queue.dequeue() {
                return Some(item);
            }
            if !block {
                return None;
            }
            self.inbox_cond.wait(&mut inbox, Deadline::Forever);
        }
    }
}

impl fmt::Debug for ThreadData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadData")
            .field("thread_id", &self.thread_id())
            .field("adopted", &self.adopted)
            .field("loop_level", &self.loop_level())
            .field("interruption_requested", &self.is_interruption_requested())
            .finish_non_exhaustive()
    }
}
