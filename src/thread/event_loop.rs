/*!
 * Event Loop
 *
 * Drains a thread's posted work in priority order until asked to exit.
 * Loops nest: a work item may run its own loop, and `Thread::exit` stops
 * every loop currently running on that thread.
 */

use super::data::ThreadData;
use crate::core::types::ThreadId;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;
use tracing::{trace, warn};

/// Exit request shared between a running loop and its thread's context
#[derive(Debug, Default)]
pub(crate) struct LoopState {
    exit: AtomicBool,
    return_code: AtomicI32,
}

impl LoopState {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn request_exit(&self, code: i32) {
        self.return_code.store(code, Ordering::Relaxed);
        self.exit.store(true, Ordering::Release);
    }

    pub(crate) fn exit_requested(&self) -> bool {
        self.exit.load(Ordering::Acquire)
    }

    pub(crate) fn return_code(&self) -> i32 {
        self.return_code.load(Ordering::Relaxed)
    }

    fn reset(&self) {
        self.exit.store(false, Ordering::Release);
        self.return_code.store(0, Ordering::Relaxed);
    }
}

/// Registration of a running loop; undone on return or unwind
struct Nesting<'a> {
    data: &'a ThreadData,
    state: &'a Arc<LoopState>,
    running: &'a AtomicBool,
}

impl<'a> Nesting<'a> {
    fn enter(data: &'a ThreadData, state: &'a Arc<LoopState>, running: &'a AtomicBool) -> Self {
        data.enter_loop(state);
        Self {
            data,
            state,
            running,
        }
    }
}

impl Drop for Nesting<'_> {
    fn drop(&mut self) {
        self.data.leave_loop(self.state);
        self.running.store(false, Ordering::Release);
    }
}

/// Event loop bound to the thread that created it
///
/// `exec` runs only on that thread; `exit`, `quit`, and `wake_up` may be
/// called from anywhere.
#[derive(Debug)]
pub struct EventLoop {
    data: Arc<ThreadData>,
    state: Arc<LoopState>,
    running: AtomicBool,
}

impl EventLoop {
    /// Loop for the calling thread
    pub fn new() -> Self {
        Self::for_data(ThreadData::current())
    }

    pub(crate) fn for_data(data: Arc<ThreadData>) -> Self {
        Self {
            data,
            state: Arc::new(LoopState::new()),
            running: AtomicBool::new(false),
        }
    }

    /// Process posted work until [`exit`](Self::exit) is called
    ///
    /// Returns the exit code, or -1 when called from a foreign thread, when
    /// the loop is already running, or when the thread has been told to quit.
    pub fn exec(&self) -> i32 {
        if self.data.thread_id() != Some(ThreadId::current()) {
            warn!("EventLoop::exec: loop was not created on this thread");
            return -1;
        }
        if self.running.swap(true, Ordering::AcqRel) {
            warn!("EventLoop::exec: loop is already running");
            return -1;
        }
        if self.data.quit_now() {
            self.running.store(false, Ordering::Release);
            return -1;
        }

        self.state.reset();
        #[cfg(test)]
        run_before_enter_hook();
        let _nesting = Nesting::enter(&self.data, &self.state, &self.running);
        trace!(level = self.data.loop_level(), "event loop entered");

        while let Some(item) = self.data.next_item(&self.state, true) {
            item.run();
        }

        let code = self.state.return_code();
        trace!(level = self.data.loop_level(), code, "event loop exited");
        code
    }

    /// Run the work that is already queued without blocking
    ///
    /// Returns the number of items run.
    pub fn process_events(&self) -> usize {
        if self.data.thread_id() != Some(ThreadId::current()) {
            warn!("EventLoop::process_events: loop was not created on this thread");
            return 0;
        }

        let budget = self.data.pending_count();
        let mut processed = 0;
        while processed < budget {
            match self.data.next_item(&self.state, false) {
                Some(item) => {
                    item.run();
                    processed += 1;
                }
                None => break,
            }
        }
        processed
    }

    /// Make `exec` return `code`
    pub fn exit(&self, code: i32) {
        self.data.exit_loop(&self.state, code);
    }

    pub fn quit(&self) {
        self.exit(0);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Wake a blocked `exec` so it re-checks for work
    pub fn wake_up(&self) {
        self.data.wake_up();
    }
}

#[cfg(test)]
thread_local! {
    static BEFORE_ENTER: std::cell::RefCell<Option<Box<dyn FnOnce()>>> =
        const { std::cell::RefCell::new(None) };
}

/// Run `hook` on this thread between the next `exec`'s quit check and its
/// loop registration
#[cfg(test)]
pub(crate) fn set_before_enter_hook(hook: impl FnOnce() + 'static) {
    BEFORE_ENTER.with(|slot| *slot.borrow_mut() = Some(Box::new(hook)));
}

#[cfg(test)]
fn run_before_enter_hook() {
    if let Some(hook) = BEFORE_ENTER.with(|slot| slot.borrow_mut().take()) {
        hook();
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}
