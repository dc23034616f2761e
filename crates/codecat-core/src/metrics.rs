//! Global atomic counters for codecat observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. when the CLI exits).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters, no allocations and no locking.
pub struct Metrics {
    generations_started: AtomicU64,
    generations_completed: AtomicU64,
    generations_failed: AtomicU64,
    generations_cancelled: AtomicU64,
    stages_completed: AtomicU64,
    retries: AtomicU64,
    degraded_scores: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            generations_started: AtomicU64::new(0),
            generations_completed: AtomicU64::new(0),
            generations_failed: AtomicU64::new(0),
            generations_cancelled: AtomicU64::new(0),
            stages_completed: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            degraded_scores: AtomicU64::new(0),
        }
    }

    pub fn inc_started(&self) {
        self.generations_started.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "generations_started", "counter incremented");
    }

    pub fn inc_completed(&self) {
        self.generations_completed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "generations_completed", "counter incremented");
    }

    pub fn inc_failed(&self) {
        self.generations_failed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "generations_failed", "counter incremented");
    }

    pub fn inc_cancelled(&self) {
        self.generations_cancelled.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "generations_cancelled", "counter incremented");
    }

    pub fn inc_stages(&self) {
        self.stages_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment the retry counter by one.
    pub fn inc_retries(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "retries", "counter incremented");
    }

    pub fn inc_degraded(&self) {
        self.degraded_scores.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "degraded_scores", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            generations_started = self.generations_started(),
            generations_completed = self.generations_completed(),
            generations_failed = self.generations_failed(),
            generations_cancelled = self.generations_cancelled(),
            stages_completed = self.stages_completed(),
            retries = self.retries(),
            degraded_scores = self.degraded_scores(),
        );
    }

    pub fn generations_started(&self) -> u64 {
        self.generations_started.load(Ordering::Relaxed)
    }

    pub fn generations_completed(&self) -> u64 {
        self.generations_completed.load(Ordering::Relaxed)
    }

    pub fn generations_failed(&self) -> u64 {
        self.generations_failed.load(Ordering::Relaxed)
    }

    pub fn generations_cancelled(&self) -> u64 {
        self.generations_cancelled.load(Ordering::Relaxed)
    }

    pub fn stages_completed(&self) -> u64 {
        self.stages_completed.load(Ordering::Relaxed)
    }

    pub fn retries(&self) -> u64 {
        self.retries.load(Ordering::Relaxed)
    }

    pub fn degraded_scores(&self) -> u64 {
        self.degraded_scores.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        for counter in [
            &self.generations_started,
            &self.generations_completed,
            &self.generations_failed,
            &self.generations_cancelled,
            &self.stages_completed,
            &self.retries,
            &self.degraded_scores,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
