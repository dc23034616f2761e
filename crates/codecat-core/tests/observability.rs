//! Observability tests for the generation lifecycle.
//!
//! Each test installs a capturing subscriber and checks that the lifecycle
//! hooks emit the expected structured fields.

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use codecat_core::obs::{
    emit_generation_cancelled, emit_generation_finished, emit_generation_started,
    emit_retry_scheduled, emit_scoring_degraded, emit_stage_completed, GenerationSpan,
};
use codecat_core::{GenerationId, GenerationStatus};
use tracing_subscriber::fmt::MakeWriter;

#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for Captured {
    type Writer = Captured;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn capture(f: impl FnOnce()) -> String {
    let captured = Captured::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(captured.clone())
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .finish();
    tracing::subscriber::with_default(subscriber, f);
    captured.text()
}

#[test]
fn started_event_names_the_repository() {
    let id = GenerationId::new();
    let logs = capture(|| emit_generation_started(&id, "octo/cat"));
    assert!(logs.contains("generation.started"));
    assert!(logs.contains("repo=octo/cat"));
    assert!(logs.contains(&id.to_string()));
}

#[test]
fn stage_completion_carries_stage_and_revision() {
    let id = GenerationId::new();
    let logs = capture(|| emit_stage_completed(&id, GenerationStatus::Scoring, 5, 42));
    assert!(logs.contains("generation.stage_completed"));
    assert!(logs.contains("stage=scoring"));
    assert!(logs.contains("revision=5"));
    assert!(logs.contains("duration_ms=42"));
}

#[test]
fn retries_and_degradation_are_warnings() {
    let id = GenerationId::new();
    let logs = capture(|| {
        emit_retry_scheduled(
            &id,
            GenerationStatus::Fetching,
            2,
            Duration::from_millis(1500),
            &"rate limited",
        );
        emit_scoring_degraded(&id, "scorer unavailable");
    });
    assert_eq!(logs.matches("WARN").count(), 2);
    assert!(logs.contains("attempt=2"));
    assert!(logs.contains("delay_ms=1500"));
    assert!(logs.contains("reason=scorer unavailable"));
}

#[test]
fn terminal_events_report_outcome() {
    let id = GenerationId::new();
    let logs = capture(|| {
        emit_generation_finished(&id, GenerationStatus::Completed, Some(7.5), None);
        emit_generation_cancelled(&id, GenerationStatus::Analyzing);
    });
    assert!(logs.contains("status=completed"));
    assert!(logs.contains("quality_score=7.5"));
    assert!(logs.contains("generation.cancelled"));
    assert!(logs.contains("at_stage=analyzing"));
}

#[test]
fn events_inside_a_generation_span_carry_its_id() {
    let id = GenerationId::new();
    let logs = capture(|| {
        let span = GenerationSpan::new(&id);
        let _entered = span.enter();
        tracing::info!("inside");
    });
    assert!(logs.contains("codecat.generation"));
    assert!(logs.contains(&format!("generation_id={id}")));
}
