/*!
 * RAII Resource Guards
 *
 * Scoped acquisition of the crate's raw locks with automatic release.
 *
 * ## Guard Types
 *
 * - **ScopedLock**: holds a `Mutex` or `RecursiveMutex` for a scope,
 *   supports early unlock and relock
 *
 * ## Example
 *
 * ```rust
 * use thread_core::core::guard::ScopedLock;
 * use thread_core::core::sync::RecursiveMutex;
 *
 * let mutex = RecursiveMutex::new();
 * let _guard = ScopedLock::locked(&mutex);
 * // Released automatically on drop
 * ```
 */

mod lock;
mod traits;

pub use lock::{Lockable, ScopedLock};
pub use traits::{Guard, GuardDrop};

/// Result type for guard operations
pub type GuardResult<T> = Result<T, GuardError>;

/// Errors that can occur during guard operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GuardError {
    #[error("Resource already released")]
    AlreadyReleased,

    #[error("Guard manages no lock")]
    NullLock,
}
