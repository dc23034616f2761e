//! Structured observability hooks for the generation lifecycle.
//!
//! This module provides:
//! - Generation-scoped tracing spans via [`GenerationSpan`]
//! - Emission functions for lifecycle events: start, stage completion,
//!   retry, scoring degradation, finish, cancellation
//!
//! Events are emitted at `info!` level (warnings for retries and
//! degradation). Filter with `RUST_LOG`; pass `--json` to the CLI for JSON
//! lines.

use std::future::Future;
use std::time::Duration;

use codecat_state::{GenerationId, GenerationStatus};
use tracing::instrument::Instrumented;
use tracing::{info, warn, Instrument};

/// Span tagged with a generation id.
///
/// Drive async work inside it with [`GenerationSpan::instrument`]; use
/// [`GenerationSpan::enter`] only around synchronous code.
#[derive(Debug, Clone)]
pub struct GenerationSpan {
    span: tracing::Span,
}

impl GenerationSpan {
    pub fn new(generation_id: &GenerationId) -> Self {
        Self {
            span: tracing::info_span!("codecat.generation", generation_id = %generation_id),
        }
    }

    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }

    pub fn instrument<F: Future>(&self, fut: F) -> Instrumented<F> {
        fut.instrument(self.span.clone())
    }
}

/// Emit event: generation created.
///
/// ```ignore
/// emit_generation_started(&id, "octo/cat");
/// // logs: event=generation.started generation_id=... repo=octo/cat
/// ```
pub fn emit_generation_started(generation_id: &GenerationId, repo: &str) {
    info!(event = "generation.started", generation_id = %generation_id, repo = %repo);
}

/// Emit event: a stage's output was persisted.
pub fn emit_stage_completed(
    generation_id: &GenerationId,
    stage: GenerationStatus,
    revision: u64,
    duration_ms: u64,
) {
    info!(
        event = "generation.stage_completed",
        generation_id = %generation_id,
        stage = %stage,
        revision = revision,
        duration_ms = duration_ms,
    );
}

/// Emit event: a transient collaborator failure will be retried.
pub fn emit_retry_scheduled(
    generation_id: &GenerationId,
    stage: GenerationStatus,
    attempt: u32,
    delay: Duration,
    error: &dyn std::fmt::Display,
) {
    warn!(
        event = "generation.retry_scheduled",
        generation_id = %generation_id,
        stage = %stage,
        attempt = attempt,
        delay_ms = delay.as_millis() as u64,
        error = %error,
    );
}

/// Emit event: scoring fell back to heuristics only.
pub fn emit_scoring_degraded(generation_id: &GenerationId, reason: &str) {
    warn!(event = "generation.scoring_degraded", generation_id = %generation_id, reason = %reason);
}

/// Emit event: generation reached `completed` or `failed`.
pub fn emit_generation_finished(
    generation_id: &GenerationId,
    status: GenerationStatus,
    quality_score: Option<f64>,
    failure: Option<&str>,
) {
    info!(
        event = "generation.finished",
        generation_id = %generation_id,
        status = %status,
        quality_score = quality_score,
        failure = failure,
    );
}

pub fn emit_generation_cancelled(generation_id: &GenerationId, at_stage: GenerationStatus) {
    info!(event = "generation.cancelled", generation_id = %generation_id, at_stage = %at_stage);
}

/// Emit event: a driver stopped on an unexpected error (warning level).
pub fn emit_driver_error(generation_id: &GenerationId, error: &dyn std::fmt::Display) {
    warn!(event = "generation.driver_error", generation_id = %generation_id, error = %error);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_span_create() {
        let span = GenerationSpan::new(&GenerationId::new());
        let _entered = span.enter();
        emit_stage_completed(&GenerationId::new(), GenerationStatus::Fetching, 1, 3);
    }

    #[tokio::test]
    async fn instrumented_future_runs() {
        let span = GenerationSpan::new(&GenerationId::new());
        let value = GenerationSpan::instrument(&span, async { 7 }).await;
        assert_eq!(value, 7);
    }
}
