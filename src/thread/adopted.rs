/*!
 * Current-Thread Registry and Adopted Threads
 *
 * Every OS thread that touches this crate gets a `ThreadHandle`: threads
 * started through `Thread::start` register themselves on entry, and any
 * other thread is adopted on first contact. The first adopted thread
 * becomes the main thread for the life of the process, even after it exits.
 *
 * # Teardown
 *
 * The registry slot of an adopted thread is released by the thread-local
 * destructor when the OS thread exits. It only touches the thread's own
 * state, which outlives any thread-local, so it is safe even while the
 * process is shutting down.
 */

use super::thread::{ThreadHandle, ThreadInner};
use crate::core::sync::{Guarded, Mutex};
use crate::core::types::ThreadId;
use std::cell::RefCell;
use std::sync::{Arc, Weak};
use tracing::debug;

/// Registry entry for the calling OS thread
struct CurrentThread {
    handle: ThreadHandle,
}

impl Drop for CurrentThread {
    fn drop(&mut self) {
        if self.handle.is_adopted() {
            self.handle.mark_adopted_finished();
        }
    }
}

thread_local! {
    static CURRENT: RefCell<Option<CurrentThread>> = const { RefCell::new(None) };
}

/// Main-thread election: the first candidate wins and is never replaced
///
/// The weak reference keeps the winner's allocation reserved, so no later
/// thread can share its address and be mistaken for it.
struct MainSlot(Guarded<Option<Weak<ThreadInner>>>);

impl MainSlot {
    const fn new() -> Self {
        Self(Guarded::const_new(Mutex::new(), None))
    }

    /// Make `inner` the main thread unless one was already chosen
    fn elect(&self, inner: &Arc<ThreadInner>) -> bool {
        let mut main = self.0.lock();
        if main.is_some() {
            return false;
        }
        *main = Some(Arc::downgrade(inner));
        true
    }

    fn get(&self) -> Option<ThreadHandle> {
        self.0
            .lock()
            .as_ref()
            .and_then(Weak::upgrade)
            .map(ThreadHandle::from_inner)
    }

    fn is(&self, inner: &Arc<ThreadInner>) -> bool {
        self.0
            .lock()
            .as_ref()
            .is_some_and(|main| std::ptr::eq(main.as_ptr(), Arc::as_ptr(inner)))
    }
}

static MAIN_THREAD: MainSlot = MainSlot::new();

/// Register a started thread as current on the calling OS thread
pub(crate) fn attach(handle: &ThreadHandle) {
    handle.data().bind_to_current();
    let previous = CURRENT
        .try_with(|slot| {
            slot.borrow_mut().replace(CurrentThread {
                handle: handle.clone(),
            })
        })
        .ok()
        .flatten();
    drop(previous);
}

/// Drop the calling OS thread's registry entry
pub(crate) fn detach() {
    let previous = CURRENT.try_with(|slot| slot.borrow_mut().take()).ok().flatten();
    drop(previous);
}

/// Handle for the calling thread, adopting it if it has none
pub(crate) fn current() -> ThreadHandle {
    match CURRENT.try_with(|slot| slot.borrow().as_ref().map(|c| c.handle.clone())) {
        Ok(Some(handle)) => handle,
        Ok(None) => adopt(),
        // Thread-locals already destroyed: hand out an unregistered wrapper
        Err(_) => ThreadHandle::from_inner(ThreadInner::adopted()),
    }
}

pub(crate) fn is_current(inner: &Arc<ThreadInner>) -> bool {
    CURRENT
        .try_with(|slot| {
            slot.borrow()
                .as_ref()
                .is_some_and(|c| Arc::ptr_eq(c.handle.inner(), inner))
        })
        .unwrap_or(false)
}

fn adopt() -> ThreadHandle {
    let handle = ThreadHandle::from_inner(ThreadInner::adopted());
    let registered = CURRENT
        .try_with(|slot| {
            *slot.borrow_mut() = Some(CurrentThread {
                handle: handle.clone(),
            });
        })
        .is_ok();

    let became_main = registered && MAIN_THREAD.elect(handle.inner());

    debug!(
        thread_id = %ThreadId::current(),
        main = became_main,
        "Adopted foreign thread"
    );
    handle
}

/// The process's main thread, while it is still alive
pub fn main_thread() -> Option<ThreadHandle> {
    MAIN_THREAD.get()
}

pub(crate) fn is_main(inner: &Arc<ThreadInner>) -> bool {
    MAIN_THREAD.is(inner)
}
