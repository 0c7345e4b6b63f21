/*!
 * Pool Configuration
 */

use crate::core::errors::{PoolError, PoolResult};
use crate::core::limits::{
    DEFAULT_EXPIRY_TIMEOUT, DEFAULT_WORKER_NAME_PREFIX, ENV_EXPIRY_MS, ENV_MAX_THREADS,
};
use crate::core::types::Priority;
use crate::thread::Thread;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// Thread pool configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Upper bound on non-reserved active workers
    pub max_thread_count: usize,
    /// Idle time before a worker exits; `None` keeps idle workers forever
    pub expiry_timeout: Option<Duration>,
    /// Worker stack size in bytes (0 = platform default)
    pub stack_size: usize,
    pub thread_priority: Priority,
    /// Workers are named `<prefix>-<n>`
    pub thread_name_prefix: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_thread_count: Thread::ideal_thread_count(),
            expiry_timeout: Some(DEFAULT_EXPIRY_TIMEOUT),
            stack_size: 0,
            thread_priority: Priority::Inherit,
            thread_name_prefix: DEFAULT_WORKER_NAME_PREFIX.to_string(),
        }
    }
}

impl PoolConfig {
    /// Defaults overlaid with `THREAD_CORE_MAX_THREADS` and
    /// `THREAD_CORE_EXPIRY_MS` (a negative expiry disables expiry)
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(raw) = std::env::var(ENV_MAX_THREADS) {
            match raw.trim().parse::<usize>() {
                Ok(value) => config.max_thread_count = value,
                Err(_) => warn!(var = ENV_MAX_THREADS, value = %raw, "Ignoring unparsable value"),
            }
        }

        if let Ok(raw) = std::env::var(ENV_EXPIRY_MS) {
            match raw.trim().parse::<i64>() {
                Ok(ms) if ms < 0 => config.expiry_timeout = None,
                Ok(ms) => config.expiry_timeout = Some(Duration::from_millis(ms as u64)),
                Err(_) => warn!(var = ENV_EXPIRY_MS, value = %raw, "Ignoring unparsable value"),
            }
        }

        config
    }

    pub fn validate(&self) -> PoolResult<()> {
        if self.max_thread_count == 0 {
            return Err(PoolError::InvalidConfig(
                "max_thread_count must be at least 1".into(),
            ));
        }
        if self.thread_name_prefix.contains('\0') {
            return Err(PoolError::InvalidConfig(
                "thread_name_prefix must not contain NUL".into(),
            ));
        }
        Ok(())
    }

    pub fn with_max_thread_count(mut self, count: usize) -> Self {
        self.max_thread_count = count;
        self
    }

    pub fn with_expiry_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.expiry_timeout = timeout;
        self
    }

    pub fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = bytes;
        self
    }

    pub fn with_thread_priority(mut self, priority: Priority) -> Self {
        self.thread_priority = priority;
        self
    }

    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serial_test::serial;

    #[test]
    fn test_defaults_are_valid() {
        let config = PoolConfig::default();
        assert!(config.max_thread_count >= 1);
        assert_eq!(config.expiry_timeout, Some(DEFAULT_EXPIRY_TIMEOUT));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_threads_rejected() {
        let config = PoolConfig::default().with_max_thread_count(0);
        assert!(matches!(
            config.validate(),
            Err(PoolError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: PoolConfig =
            serde_json::from_str(r#"{"max_thread_count": 3, "thread_priority": "high"}"#).unwrap();
        assert_eq!(config.max_thread_count, 3);
        assert_eq!(config.thread_priority, Priority::High);
        assert_eq!(config.thread_name_prefix, DEFAULT_WORKER_NAME_PREFIX);
        assert_eq!(config.expiry_timeout, Some(DEFAULT_EXPIRY_TIMEOUT));
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        std::env::set_var(ENV_MAX_THREADS, "5");
        std::env::set_var(ENV_EXPIRY_MS, "-1");
        let config = PoolConfig::from_env();
        std::env::remove_var(ENV_MAX_THREADS);
        std::env::remove_var(ENV_EXPIRY_MS);

        assert_eq!(config.max_thread_count, 5);
        assert_eq!(config.expiry_timeout, None);
    }

    #[test]
    #[serial]
    fn test_env_garbage_ignored() {
        std::env::set_var(ENV_MAX_THREADS, "many");
        let config = PoolConfig::from_env();
        std::env::remove_var(ENV_MAX_THREADS);

        assert_eq!(config.max_thread_count, Thread::ideal_thread_count());
    }
}
