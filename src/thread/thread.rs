/*!
 * Thread
 *
 * OS thread wrapper with a lifecycle state machine:
 * `NotStarted -> Running -> ExitRequested -> Finished`.
 *
 * # Ownership
 *
 * `Thread` is the owning wrapper; dropping it while the thread still runs
 * aborts the process unless it was built with [`Thread::create`], which
 * shuts down cooperatively instead. `ThreadHandle` is a cheap clonable
 * reference for querying and controlling a thread from anywhere, and is
 * what [`Thread::current_thread`] returns.
 */

use super::adopted;
use super::data::ThreadData;
use super::event_loop::EventLoop;
use super::post::{Job, WorkItem};
use crate::core::errors::{ThreadError, ThreadResult};
use crate::core::sync::{Guarded, WaitCondition};
use crate::core::types::{Deadline, Priority, ThreadId};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::ops::Deref;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, trace, warn};

/// Lifecycle state of a thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadState {
    NotStarted,
    Running,
    /// `exit()` was called and not yet consumed by `exec()`
    ExitRequested,
    Finished,
}

impl ThreadState {
    #[inline]
    pub fn is_live(self) -> bool {
        matches!(self, ThreadState::Running | ThreadState::ExitRequested)
    }
}

enum Body {
    EventLoop,
    Custom(Job),
}

struct Lifecycle {
    state: ThreadState,
    in_finish: bool,
    exited: bool,
    return_code: i32,
    priority: Priority,
    stack_size: usize,
    name: Option<String>,
    native: Option<JoinHandle<()>>,
}

impl Lifecycle {
    fn new(state: ThreadState) -> Self {
        Self {
            state,
            in_finish: false,
            exited: false,
            return_code: 0,
            priority: Priority::Inherit,
            stack_size: 0,
            name: None,
            native: None,
        }
    }

    #[inline]
    fn is_running(&self) -> bool {
        self.state.is_live() && !self.in_finish
    }

    #[inline]
    fn is_finished(&self) -> bool {
        self.state == ThreadState::Finished || self.in_finish
    }
}

pub(crate) struct ThreadInner {
    lifecycle: Guarded<Lifecycle>,
    finished: WaitCondition,
    data: Arc<ThreadData>,
    adopted: bool,
    cooperative_drop: bool,
    body: Guarded<Option<Body>>,
    on_finished: Guarded<Vec<Job>>,
}

impl ThreadInner {
    fn new(body: Body, cooperative_drop: bool) -> Arc<Self> {
        Arc::new_cyclic(|weak| {
            let data = Arc::new(ThreadData::new(false));
            data.set_thread(weak.clone());
            Self {
                lifecycle: Guarded::new(Lifecycle::new(ThreadState::NotStarted)),
                finished: WaitCondition::new(),
                data,
                adopted: false,
                cooperative_drop,
                body: Guarded::new(Some(body)),
                on_finished: Guarded::new(Vec::new()),
            }
        })
    }

    /// Wrapper for the calling OS thread, which is already running
    pub(crate) fn adopted() -> Arc<Self> {
        Arc::new_cyclic(|weak| {
            let data = Arc::new(ThreadData::new(true));
            data.set_thread(weak.clone());
            data.bind_to_current();
            Self {
                lifecycle: Guarded::new(Lifecycle::new(ThreadState::Running)),
                finished: WaitCondition::new(),
                data,
                adopted: true,
                cooperative_drop: false,
                body: Guarded::new(None),
                on_finished: Guarded::new(Vec::new()),
            }
        })
    }
}

/// Shared reference to a thread
#[derive(Clone)]
pub struct ThreadHandle {
    inner: Arc<ThreadInner>,
}

impl ThreadHandle {
    pub(crate) fn from_inner(inner: Arc<ThreadInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn inner(&self) -> &Arc<ThreadInner> {
        &self.inner
    }

    /// Start with inherited priority
    pub fn start(&self) -> ThreadResult<()> {
        self.start_with_priority(Priority::Inherit)
    }

    /// Spawn the OS thread and run the body on it
    ///
    /// A no-op unless the thread is in `NotStarted`. Fails with
    /// [`ThreadError::SpawnFailed`] when the OS refuses to create the thread;
    /// the wrapper then stays in `NotStarted` and may be started again.
    pub fn start_with_priority(&self, priority: Priority) -> ThreadResult<()> {
        let inner = &self.inner;
        let mut lifecycle = inner.lifecycle.lock();

        if lifecycle.in_finish {
            drop(lifecycle);
            self.wait(Deadline::Forever);
            lifecycle = inner.lifecycle.lock();
        }

        if lifecycle.state != ThreadState::NotStarted {
            trace!(state = ?lifecycle.state, "start ignored, thread already started");
            return Ok(());
        }

        if priority != Priority::Inherit {
            lifecycle.priority = priority;
        }

        let mut builder = std::thread::Builder::new();
        if let Some(name) = &lifecycle.name {
            builder = builder.name(name.clone());
        }
        if lifecycle.stack_size > 0 {
            builder = builder.stack_size(lifecycle.stack_size);
        }

        lifecycle.state = ThreadState::Running;
        lifecycle.exited = false;
        lifecycle.return_code = 0;

        let thread = Arc::clone(inner);
        match builder.spawn(move || thread_main(thread)) {
            Ok(native) => {
                lifecycle.native = Some(native);
                debug!(
                    name = ?lifecycle.name,
                    priority = ?lifecycle.priority,
                    stack_size = lifecycle.stack_size,
                    "Thread started"
                );
                Ok(())
            }
            Err(err) => {
                lifecycle.state = ThreadState::NotStarted;
                warn!(name = ?lifecycle.name, error = %err, "Failed to spawn thread");
                Err(ThreadError::SpawnFailed(err.to_string()))
            }
        }
    }

    /// Run the thread's event loop until [`exit`](Self::exit)
    ///
    /// Must be called on this thread; returns -1 otherwise. If `exit` was
    /// called before this, returns that code immediately.
    pub fn exec(&self) -> i32 {
        if !self.is_current() {
            warn!("Thread::exec called from another thread");
            return -1;
        }

        let data = &self.inner.data;
        {
            let mut lifecycle = self.inner.lifecycle.lock();
            data.set_quit_now(false);
            if lifecycle.exited {
                lifecycle.exited = false;
                if lifecycle.state == ThreadState::ExitRequested {
                    lifecycle.state = ThreadState::Running;
                }
                return lifecycle.return_code;
            }
        }

        let code = EventLoop::for_data(Arc::clone(data)).exec();

        let mut lifecycle = self.inner.lifecycle.lock();
        // An exit racing with loop entry is still honoured
        let code = if lifecycle.exited {
            lifecycle.return_code
        } else {
            code
        };
        lifecycle.exited = false;
        lifecycle.return_code = -1;
        if lifecycle.state == ThreadState::ExitRequested {
            lifecycle.state = ThreadState::Running;
        }
        code
    }

    /// Make every running `exec()` on this thread return `code`
    ///
    /// Thread-safe. Loops started afterwards return -1 until `exec()` is
    /// entered again.
    pub fn exit(&self, code: i32) {
        let mut lifecycle = self.inner.lifecycle.lock();
        lifecycle.exited = true;
        lifecycle.return_code = code;
        if lifecycle.state == ThreadState::Running {
            lifecycle.state = ThreadState::ExitRequested;
        }
        self.inner.data.set_quit_now(true);
        self.inner.data.exit_all_loops(code);
        trace!(code, "Thread exit requested");
    }

    /// `exit(0)`
    pub fn quit(&self) {
        self.exit(0);
    }

    /// Block until the thread finishes or `deadline` passes
    ///
    /// Returns `true` if the thread finished (or never started). Waiting on
    /// the calling thread itself is refused with a warning and returns
    /// `false`.
    pub fn wait(&self, deadline: Deadline) -> bool {
        if self.is_current() {
            warn!("Thread tried to wait on itself");
            return false;
        }

        let mut lifecycle = self.inner.lifecycle.lock();
        if lifecycle.state == ThreadState::NotStarted && !lifecycle.in_finish {
            return true;
        }

        let finished = self
            .inner
            .finished
            .wait_while(&mut lifecycle, deadline, |l| {
                l.state != ThreadState::Finished || l.in_finish
            });
        if !finished {
            return false;
        }

        let native = lifecycle.native.take();
        drop(lifecycle);
        if let Some(native) = native {
            if native.join().is_err() {
                warn!("Finished thread reported a panic on join");
            }
        }
        true
    }

    /// Wait with a relative timeout
    pub fn wait_for(&self, timeout: Duration) -> bool {
        self.wait(Deadline::after(timeout))
    }

    pub fn is_running(&self) -> bool {
        self.inner.lifecycle.lock().is_running()
    }

    pub fn is_finished(&self) -> bool {
        self.inner.lifecycle.lock().is_finished()
    }

    pub fn state(&self) -> ThreadState {
        self.inner.lifecycle.lock().state
    }

    /// Ask the thread to stop; it must poll
    /// [`is_interruption_requested`](Self::is_interruption_requested)
    pub fn request_interruption(&self) {
        if adopted::is_main(&self.inner) {
            warn!("Thread::request_interruption has no effect on the main thread");
            return;
        }
        let lifecycle = self.inner.lifecycle.lock();
        if !lifecycle.is_running() {
            return;
        }
        self.inner.data.request_interruption();
    }

    /// Whether interruption was requested while the thread is running
    pub fn is_interruption_requested(&self) -> bool {
        if !self.inner.data.is_interruption_requested() {
            return false;
        }
        self.inner.lifecycle.lock().is_running()
    }

    /// Stack size for the next start, in bytes (0 = platform default)
    ///
    /// Fails with [`ThreadError::StackSizeWhileRunning`] once started.
    pub fn set_stack_size(&self, bytes: usize) -> ThreadResult<()> {
        let mut lifecycle = self.inner.lifecycle.lock();
        if lifecycle.is_running() {
            warn!(bytes, "Thread::set_stack_size called on a running thread");
            return Err(ThreadError::StackSizeWhileRunning);
        }
        lifecycle.stack_size = bytes;
        Ok(())
    }

    pub fn stack_size(&self) -> usize {
        self.inner.lifecycle.lock().stack_size
    }

    /// Record a new priority for a running thread
    ///
    /// Advisory: the value is stored and reported by [`priority`](Self::priority).
    pub fn set_priority(&self, priority: Priority) {
        if priority == Priority::Inherit {
            warn!("Thread::set_priority: argument cannot be Inherit");
            return;
        }
        let mut lifecycle = self.inner.lifecycle.lock();
        if !lifecycle.is_running() {
            warn!("Thread::set_priority: thread is not running");
            return;
        }
        lifecycle.priority = priority;
        debug!(?priority, "Thread priority changed");
    }

    pub fn priority(&self) -> Priority {
        self.inner.lifecycle.lock().priority
    }

    /// OS thread name, applied at start
    pub fn set_name(&self, name: impl Into<String>) {
        let mut lifecycle = self.inner.lifecycle.lock();
        if lifecycle.state != ThreadState::NotStarted {
            warn!("Thread::set_name: name only applies before start");
        }
        lifecycle.name = Some(name.into());
    }

    pub fn name(&self) -> Option<String> {
        self.inner.lifecycle.lock().name.clone()
    }

    /// Run `callback` on this thread as it finishes, before waiters wake
    pub fn on_finished<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.on_finished.lock().push(Box::new(callback));
    }

    /// Queue `job` for this thread's event loop
    ///
    /// Returns `false`, dropping the job, if the thread already finished.
    pub fn post<F>(&self, job: F, priority: i32) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let accepted = self
            .inner
            .data
            .post(WorkItem::from_job(priority, Box::new(job)));
        if !accepted {
            debug!(priority, "Dropping work posted to a finished thread");
        }
        accepted
    }

    /// Current `exec()` nesting depth
    pub fn loop_level(&self) -> usize {
        self.inner.data.loop_level()
    }

    pub fn data(&self) -> &Arc<ThreadData> {
        &self.inner.data
    }

    /// OS identity, once the thread has run
    pub fn thread_id(&self) -> Option<ThreadId> {
        self.inner.data.thread_id()
    }

    pub fn is_adopted(&self) -> bool {
        self.inner.adopted
    }

    /// Whether this handle describes the calling thread
    pub fn is_current(&self) -> bool {
        adopted::is_current(&self.inner)
    }

    pub(crate) fn mark_adopted_finished(&self) {
        {
            let mut lifecycle = self.inner.lifecycle.lock();
            lifecycle.state = ThreadState::Finished;
        }
        self.inner.finished.wake_all();
        self.inner.data.clear_thread();
    }

    fn finish(&self) {
        let inner = &self.inner;
        inner.lifecycle.lock().in_finish = true;

        let callbacks = std::mem::take(&mut *inner.on_finished.lock());
        for callback in callbacks {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(callback)) {
                error!(panic = %panic_message(&*payload), "Finished callback panicked");
            }
        }

        let dropped = inner.data.close();
        if dropped > 0 {
            debug!(dropped, "Discarding work posted to a finishing thread");
        }

        adopted::detach();

        {
            let mut lifecycle = inner.lifecycle.lock();
            lifecycle.state = ThreadState::Finished;
            lifecycle.in_finish = false;
            lifecycle.exited = false;
            inner.data.clear_interruption();
            inner.data.set_quit_now(false);
        }
        inner.finished.wake_all();
        debug!("Thread finished");
    }
}

impl PartialEq for ThreadHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for ThreadHandle {}

impl fmt::Debug for ThreadHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lifecycle = self.inner.lifecycle.lock();
        f.debug_struct("ThreadHandle")
            .field("name", &lifecycle.name)
            .field("state", &lifecycle.state)
            .field("adopted", &self.inner.adopted)
            .field("thread_id", &self.inner.data.thread_id())
            .finish()
    }
}

fn thread_main(inner: Arc<ThreadInner>) {
    let handle = ThreadHandle::from_inner(inner);
    adopted::attach(&handle);

    let body = handle.inner.body.lock().take();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| match body {
        Some(Body::Custom(job)) => job(),
        Some(Body::EventLoop) | None => {
            handle.exec();
        }
    }));

    if let Err(payload) = outcome {
        error!(
            name = ?handle.name(),
            panic = %panic_message(&*payload),
            "Thread body panicked"
        );
    }

    handle.finish();
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Owning thread wrapper
///
/// # Panics
///
/// Dropping a `Thread` whose OS thread is still running aborts the process,
/// unless it was built with [`Thread::create`].
pub struct Thread {
    handle: ThreadHandle,
}

impl Thread {
    /// Thread whose body runs the event loop
    pub fn new() -> Self {
        Self {
            handle: ThreadHandle::from_inner(ThreadInner::new(Body::EventLoop, false)),
        }
    }

    /// Thread running `body` instead of the event loop
    pub fn with_body<F>(body: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            handle: ThreadHandle::from_inner(ThreadInner::new(
                Body::Custom(Box::new(body)),
                false,
            )),
        }
    }

    /// Thread running `f`, shut down cooperatively on drop
    ///
    /// Dropping it requests interruption, quits its loop, and waits.
    pub fn create<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            handle: ThreadHandle::from_inner(ThreadInner::new(Body::Custom(Box::new(f)), true)),
        }
    }

    pub fn handle(&self) -> ThreadHandle {
        self.handle.clone()
    }

    /// Handle for the calling thread, adopting it on first contact
    pub fn current_thread() -> ThreadHandle {
        adopted::current()
    }

    pub fn current_thread_id() -> ThreadId {
        ThreadId::current()
    }

    /// Whether the calling thread is the process's main thread
    pub fn is_main_thread() -> bool {
        adopted::is_main(Self::current_thread().inner())
    }

    /// Available hardware parallelism, 1 if unknown
    pub fn ideal_thread_count() -> usize {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }

    pub fn yield_current_thread() {
        std::thread::yield_now();
    }

    pub fn sleep(duration: Duration) {
        std::thread::sleep(duration);
    }

    pub fn msleep(millis: u64) {
        Self::sleep(Duration::from_millis(millis));
    }

    pub fn usleep(micros: u64) {
        Self::sleep(Duration::from_micros(micros));
    }
}

impl Default for Thread {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for Thread {
    type Target = ThreadHandle;

    fn deref(&self) -> &ThreadHandle {
        &self.handle
    }
}

impl fmt::Debug for Thread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Thread").field(&self.handle).finish()
    }
}

impl Drop for Thread {
    fn drop(&mut self) {
        let handle = &self.handle;
        let inner = &handle.inner;

        if inner.cooperative_drop && handle.is_running() {
            handle.request_interruption();
            handle.quit();
            handle.wait(Deadline::Forever);
        }

        let mut lifecycle = inner.lifecycle.lock();
        if lifecycle.in_finish {
            drop(lifecycle);
            handle.wait(Deadline::Forever);
            lifecycle = inner.lifecycle.lock();
        }

        if lifecycle.state.is_live() && !inner.adopted {
            let name = lifecycle.name.clone();
            drop(lifecycle);
            error!(name = ?name, "Thread destroyed while it is still running");
            std::process::abort();
        }

        let native = lifecycle.native.take();
        drop(lifecycle);
        if let Some(native) = native {
            let _ = native.join();
        }
        inner.data.clear_thread();
    }
}
