/*!
 * Threads
 *
 * Thread lifecycle, per-thread context, posted work, and event loops.
 *
 * ## Components
 *
 * - **Thread / ThreadHandle**: owning wrapper and shared handle over an OS
 *   thread with a `NotStarted -> Running -> ExitRequested -> Finished`
 *   lifecycle
 * - **ThreadData**: per-thread context (interruption flag, loop nesting,
 *   posted work), reference counted and outliving either side
 * - **EventLoop**: drains posted work in priority order until exited
 * - **Adopted threads**: foreign OS threads get a handle on first contact
 *
 * ## Example
 *
 * ```rust
 * use thread_core::thread::Thread;
 * use thread_core::core::types::Deadline;
 *
 * let thread = Thread::new();
 * thread.start().unwrap();
 * thread.post(|| println!("hello from the worker"), 0);
 * thread.quit();
 * assert!(thread.wait(Deadline::Forever));
 * ```
 */

mod adopted;
mod data;
mod event_loop;
mod post;
#[allow(clippy::module_inception)]
mod thread;

pub use adopted::main_thread;
pub use data::ThreadData;
pub use event_loop::EventLoop;
pub use post::{Job, PostQueue, WorkItem};
pub use thread::{Thread, ThreadHandle, ThreadState};

pub(crate) use thread::panic_message;
