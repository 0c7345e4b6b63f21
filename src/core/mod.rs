/*!
 * Core Module
 * Shared types, error handling, limits, locks, and guards
 */

pub mod errors;
pub mod guard;
pub mod limits;
pub mod sync;
pub mod types;

// Re-export for convenience
pub use errors::*;
pub use guard::{Guard, GuardDrop, GuardError, GuardResult, Lockable, ScopedLock};
pub use types::*;
