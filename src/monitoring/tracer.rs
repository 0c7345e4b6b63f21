/*!
 * Tracing
 * Structured logging setup and task spans using the tracing crate
 */

use crate::core::limits::{ENV_TRACE_JSON, SLOW_TASK_THRESHOLD};
use std::time::Instant;
use tracing::{debug, info, span, warn, Level, Span};
use tracing_subscriber::{fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize structured tracing
///
/// Environment variables:
/// - RUST_LOG: Set log level (default: info)
/// - THREAD_CORE_TRACE_JSON: Enable JSON output (default: false)
///
/// Returns `false` if a global subscriber was already installed, in which
/// case nothing changes.
pub fn init_tracing() -> bool {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let use_json = std::env::var(ENV_TRACE_JSON)
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = if use_json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_thread_names(true)
                    .with_current_span(true)
                    .with_span_list(true),
            )
            .try_init()
            .is_ok()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_thread_names(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .compact(),
            )
            .try_init()
            .is_ok()
    };

    if installed {
        info!(json = use_json, "Structured tracing initialized");
    }
    installed
}

/// Span around one unit of work run by a thread or pool worker
///
/// Logs the duration on drop, at `warn!` when the work ran longer than
/// [`SLOW_TASK_THRESHOLD`].
pub struct TaskSpan {
    span: Span,
    start: Instant,
    kind: &'static str,
}

impl TaskSpan {
    pub fn new(kind: &'static str, worker: usize, priority: i32) -> Self {
        let span = span!(
            Level::TRACE,
            "task",
            kind = kind,
            worker = worker,
            priority = priority,
            duration_us = tracing::field::Empty,
        );
        Self {
            span,
            start: Instant::now(),
            kind,
        }
    }

    /// Enter the span for the duration of the work
    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }
}

impl Drop for TaskSpan {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        self.span.record("duration_us", duration.as_micros() as u64);
        let _entered = self.span.enter();

        if duration > SLOW_TASK_THRESHOLD {
            warn!(
                kind = self.kind,
                duration_ms = duration.as_millis() as u64,
                slow = true,
                "Slow task detected"
            );
        } else {
            debug!(
                kind = self.kind,
                duration_us = duration.as_micros() as u64,
                "Task completed"
            );
        }
    }
}
