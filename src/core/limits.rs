/*!
 * Limits and Constants
 *
 * Centralized location for thresholds and defaults used by the lock,
 * thread, and pool layers.
 * - Performance-critical constants are marked with [PERF]
 */

use std::time::Duration;

// =============================================================================
// LOCKING
// =============================================================================

/// Spin iterations on the mutex slow path before parking
/// [PERF] Short critical sections usually finish within this window
pub const MUTEX_SPIN_LIMIT: u32 = 40;

/// Spin iterations for the low-latency sync preset
pub const LOW_LATENCY_SPIN_LIMIT: u32 = 400;

/// Spin iterations for the long-wait sync preset
pub const LONG_WAIT_SPIN_LIMIT: u32 = 4;

/// Poll interval of the portable spin park strategy once it stops yielding
pub const SPIN_PARK_POLL_INTERVAL: Duration = Duration::from_micros(50);

/// Yield rounds of the spin park strategy before it starts sleeping
pub const SPIN_PARK_YIELD_ROUNDS: u32 = 64;

// =============================================================================
// THREAD POOL
// =============================================================================

/// Idle time after which a pool worker exits (30s)
pub const DEFAULT_EXPIRY_TIMEOUT: Duration = Duration::from_secs(30);

/// Name prefix of pool worker threads
pub const DEFAULT_WORKER_NAME_PREFIX: &str = "pool-worker";

/// Environment variable overriding the pool's maximum thread count
pub const ENV_MAX_THREADS: &str = "THREAD_CORE_MAX_THREADS";

/// Environment variable overriding the pool's expiry timeout (milliseconds)
pub const ENV_EXPIRY_MS: &str = "THREAD_CORE_EXPIRY_MS";

// =============================================================================
// TRACING
// =============================================================================

/// Environment variable selecting JSON trace output
pub const ENV_TRACE_JSON: &str = "THREAD_CORE_TRACE_JSON";

/// Pool tasks running longer than this are logged as slow (100ms)
pub const SLOW_TASK_THRESHOLD: Duration = Duration::from_millis(100);
