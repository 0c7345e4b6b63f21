/*!
 * Synchronization Primitives
 *
 * Locks with a lock-free fast path and a parking slow path:
 * - `Mutex`: one atomic word, CAS fast path, parks under contention
 * - `RecursiveMutex`: owner identity plus reentrancy count over `Mutex`
 * - `ReadWriteLock`: shared/exclusive locking with writer preference
 * - `WaitCondition`: condition variable for `Guarded` values
 *
 * # Architecture
 *
 * Every blocking operation goes through one `Parker` strategy chosen at
 * compile time: `FutexParker` (parking_lot_core, futex on Linux) by
 * default, `SpinParker` with the `spin-park` feature. Call sites never
 * branch on the strategy.
 */

mod condvar;
mod config;
mod futex;
mod mutex;
mod remutex;
mod rwlock;
mod slot;
mod spinwait;
mod traits;

pub use condvar::WaitCondition;
pub use config::{StrategyType, SyncConfig};
pub use mutex::{Guarded, GuardedGuard, Mutex};
pub use remutex::RecursiveMutex;
pub use rwlock::ReadWriteLock;
pub use slot::{AtomicOwnerSlot, OwnerState, Release, WaiterHandle};
pub use traits::{ParkOutcome, Parker, WakeResult};

// Re-export specific strategies for advanced users
pub use futex::FutexParker;
pub use spinwait::SpinParker;

/// Park strategy compiled into this build
#[cfg(not(feature = "spin-park"))]
pub(crate) type ActiveParker = FutexParker;

/// Park strategy compiled into this build
#[cfg(feature = "spin-park")]
pub(crate) type ActiveParker = SpinParker;
