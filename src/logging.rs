//! Structured logging setup.
//!
//! Business events live in [`crate::events`] and are durable/replayable; this module is purely
//! operational and may be dropped without affecting run semantics. Run id and step are attached
//! as `tracing` span fields rather than thread-local context, since spans compose correctly across
//! the per-URL fan-out tasks in async mode.

use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber.
///
/// Safe to call once per process; a second call is a no-op (errors from `try_init` are ignored).
pub fn init(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

/// Build the span under which all work for one run should execute.
///
/// Fan-out tasks spawned inside a search step should `.instrument(run_span.clone())` (or enter a
/// child span naming the step) so log lines remain attributable to their run even when interleaved.
pub fn run_span(run_id: &str) -> tracing::Span {
    tracing::info_span!("run", run_id = %run_id, step = tracing::field::Empty)
}
