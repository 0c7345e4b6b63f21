/*!
 * Thread Core Library
 * Mutexes, threads, event loops, and thread pools
 */

pub mod core;
pub mod monitoring;
pub mod pool;
pub mod thread;

// Re-exports
pub use crate::core::errors::{PoolError, PoolResult, ThreadError, ThreadResult};
pub use crate::core::guard::ScopedLock;
pub use crate::core::sync::{Guarded, Mutex, ReadWriteLock, RecursiveMutex, SyncConfig, WaitCondition};
pub use crate::core::types::{Deadline, Priority, ThreadId};
pub use monitoring::init_tracing;
pub use pool::{PoolConfig, Runnable, ThreadPool};
pub use thread::{EventLoop, Thread, ThreadData, ThreadHandle, ThreadState};
