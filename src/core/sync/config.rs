/*!
 * Synchronization Configuration
 *
 * Process-wide tuning of the lock slow paths and the compile-time
 * park strategy selection
 */

use crate::core::limits::{LONG_WAIT_SPIN_LIMIT, LOW_LATENCY_SPIN_LIMIT, MUTEX_SPIN_LIMIT};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};

static SPIN_LIMIT: AtomicU32 = AtomicU32::new(MUTEX_SPIN_LIMIT);

/// Park strategy type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyType {
    /// parking_lot_core wait queues (futex on Linux)
    Futex,
    /// Portable polling with backoff
    Spin,
}

impl StrategyType {
    /// Strategy compiled into this build
    pub const fn active() -> Self {
        #[cfg(feature = "spin-park")]
        {
            StrategyType::Spin
        }
        #[cfg(not(feature = "spin-park"))]
        {
            StrategyType::Futex
        }
    }
}

/// Synchronization configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Spin iterations on a contended lock before parking
    pub spin_limit: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            spin_limit: MUTEX_SPIN_LIMIT,
        }
    }
}

impl SyncConfig {
    /// Configuration optimized for low-latency (critical sections < 1µs)
    pub const fn low_latency() -> Self {
        Self {
            spin_limit: LOW_LATENCY_SPIN_LIMIT,
        }
    }

    /// Configuration optimized for long critical sections
    pub const fn long_wait() -> Self {
        Self {
            spin_limit: LONG_WAIT_SPIN_LIMIT,
        }
    }

    /// Install this configuration for every lock in the process
    pub fn apply(&self) {
        SPIN_LIMIT.store(self.spin_limit, Ordering::Relaxed);
        tracing::debug!(
            spin_limit = self.spin_limit,
            strategy = ?StrategyType::active(),
            "sync configuration applied"
        );
    }

    /// Configuration currently in effect
    pub fn current() -> Self {
        Self {
            spin_limit: spin_limit(),
        }
    }
}

#[inline]
pub(crate) fn spin_limit() -> u32 {
    SPIN_LIMIT.load(Ordering::Relaxed)
}
