/*!
 * Thread Pool
 *
 * Worker threads reused across submitted callables.
 *
 * ## Features
 *
 * - **Capacity cap**: at most `max_thread_count` non-reserved workers busy
 * - **Priority queue**: excess work waits ordered by priority, FIFO within one
 * - **Backpressure**: `try_start` refuses instead of queueing
 * - **Reservations**: `reserve_thread` / `start_on_reserved_thread` bypass
 *   the cap for callers that must not starve
 * - **Expiry**: idle workers retire after `expiry_timeout`
 */

mod config;
#[allow(clippy::module_inception)]
mod pool;
mod worker;

pub use config::PoolConfig;
pub use pool::{Runnable, ThreadPool};
