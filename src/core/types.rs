/*!
 * Core Types
 * Common types shared by the lock, thread, and pool layers
 */

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

/// Opaque identity of an OS thread
///
/// Derived from the address of a thread-local, which is unique among all
/// live threads and never zero. Identities may be reused once a thread exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(NonZeroUsize);

impl ThreadId {
    /// Identity of the calling OS thread
    #[inline]
    pub fn current() -> Self {
        thread_local!(static KEY: u8 = const { 0 });
        KEY.with(|key| {
            let addr = key as *const u8 as usize;
            // A thread-local with non-zero size always has a non-null address
            Self(NonZeroUsize::new(addr).unwrap_or(NonZeroUsize::MIN))
        })
    }

    /// Raw non-zero value, usable as an atomic owner word
    #[inline]
    pub fn as_usize(self) -> usize {
        self.0.get()
    }

    /// Rebuild an identity from a raw owner word (0 means "no thread")
    #[inline]
    pub fn from_usize(raw: usize) -> Option<Self> {
        NonZeroUsize::new(raw).map(Self)
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Advisory scheduling priority of a thread
///
/// The effect depends on the operating system; on many platforms
/// it is only recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Scheduled only when no other threads are running
    Idle,
    Lowest,
    Low,
    Normal,
    High,
    Highest,
    /// Scheduled as often as possible
    TimeCritical,
    /// Use the priority of the creating thread
    #[default]
    Inherit,
}

/// Point in time after which a blocking operation gives up
///
/// `Forever` never expires. Deadlines are measured on the monotonic clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Deadline {
    #[default]
    Forever,
    At(Instant),
}

impl Deadline {
    /// Deadline `timeout` from now; saturates to `Forever` on overflow
    pub fn after(timeout: Duration) -> Self {
        Instant::now()
            .checked_add(timeout)
            .map_or(Deadline::Forever, Deadline::At)
    }

    /// Deadline that has already passed
    pub fn expired() -> Self {
        Deadline::At(Instant::now())
    }

    #[inline]
    pub fn is_forever(&self) -> bool {
        matches!(self, Deadline::Forever)
    }

    pub fn has_expired(&self) -> bool {
        match self {
            Deadline::Forever => false,
            Deadline::At(at) => Instant::now() >= *at,
        }
    }

    /// Time left before expiry (`None` for `Forever`)
    pub fn remaining(&self) -> Option<Duration> {
        match self {
            Deadline::Forever => None,
            Deadline::At(at) => Some(at.saturating_duration_since(Instant::now())),
        }
    }

    /// Absolute expiry instant (`None` for `Forever`)
    #[inline]
    pub fn instant(&self) -> Option<Instant> {
        match self {
            Deadline::Forever => None,
            Deadline::At(at) => Some(*at),
        }
    }
}

impl From<Duration> for Deadline {
    fn from(timeout: Duration) -> Self {
        Deadline::after(timeout)
    }
}

impl From<Instant> for Deadline {
    fn from(at: Instant) -> Self {
        Deadline::At(at)
    }
}

impl From<Option<Duration>> for Deadline {
    fn from(timeout: Option<Duration>) -> Self {
        timeout.map_or(Deadline::Forever, Deadline::after)
    }
}
