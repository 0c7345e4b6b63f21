/*!
 * Error Types
 * Centralized error handling with thiserror, miette, and serde support
 */

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Thread lifecycle errors with serialization support
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum ThreadError {
    #[error("Failed to spawn thread: {0}")]
    #[diagnostic(
        code(thread::spawn_failed),
        help("The OS refused to create a thread. Check the stack size and the process thread limit.")
    )]
    SpawnFailed(String),

    #[error("Cannot change stack size while the thread is running")]
    #[diagnostic(
        code(thread::stack_size_while_running),
        help("Call set_stack_size() before start().")
    )]
    StackSizeWhileRunning,
}

/// Thread pool errors with serialization support
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum PoolError {
    #[error("Invalid pool configuration: {0}")]
    #[diagnostic(
        code(pool::invalid_config),
        help("max_thread_count must be at least 1 and thread_name_prefix must not contain NUL bytes.")
    )]
    InvalidConfig(String),
}

/// Result type for thread operations
pub type ThreadResult<T> = Result<T, ThreadError>;

/// Result type for pool operations
pub type PoolResult<T> = Result<T, PoolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ThreadError::SpawnFailed("too many threads".into());
        assert_eq!(err.to_string(), "Failed to spawn thread: too many threads");

        let err = PoolError::InvalidConfig("max_thread_count must be at least 1".into());
        assert!(err.to_string().contains("max_thread_count"));
    }

    #[test]
    fn test_error_serialization() {
        let err = ThreadError::StackSizeWhileRunning;
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("stack_size_while_running"));
        let back: ThreadError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, err);
    }

    #[test]
    fn test_diagnostic_codes() {
        let err = PoolError::InvalidConfig("zero".into());
        let code = err.code().map(|c| c.to_string());
        assert_eq!(code.as_deref(), Some("pool::invalid_config"));
    }
}
