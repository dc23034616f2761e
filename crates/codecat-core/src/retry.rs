//! Per-call deadline and exponential backoff for collaborator calls.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CollaboratorError, ConfigError};

/// Which collaborator a call goes to. Each has its own deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    Content,
    Scoring,
    Imaging,
}

/// Retry policy applied to every external call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay after the first failed attempt (milliseconds); doubles after
    /// each further failure.
    pub base_delay_ms: u64,
    /// Upper bound for a single backoff delay (milliseconds).
    pub max_delay_ms: u64,
    /// Deadline for one content fetch (milliseconds).
    pub call_timeout_ms: u64,
    /// Deadline for one qualitative scoring call (milliseconds).
    pub scoring_timeout_ms: u64,
    /// Deadline for one image synthesis call (milliseconds).
    pub imaging_timeout_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
            call_timeout_ms: 30_000,
            scoring_timeout_ms: 60_000,
            imaging_timeout_ms: 120_000,
        }
    }
}

/// Why a retried call gave up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryFailure {
    /// The last error observed.
    pub error: CollaboratorError,
    pub attempts: u32,
    /// `true` when every attempt failed transiently.
    pub exhausted: bool,
}

impl RetryPolicy {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::InvalidRetry("max_attempts must be at least 1".into()));
        }
        for (name, ms) in [
            ("call_timeout_ms", self.call_timeout_ms),
            ("scoring_timeout_ms", self.scoring_timeout_ms),
            ("imaging_timeout_ms", self.imaging_timeout_ms),
        ] {
            if ms == 0 {
                return Err(ConfigError::InvalidRetry(format!("{name} must be positive")));
            }
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(ConfigError::InvalidRetry(
                "max_delay_ms must not be below base_delay_ms".into(),
            ));
        }
        Ok(())
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// Deadline for one call to `kind`.
    pub fn timeout_for(&self, kind: CallKind) -> Duration {
        Duration::from_millis(match kind {
            CallKind::Content => self.call_timeout_ms,
            CallKind::Scoring => self.scoring_timeout_ms,
            CallKind::Imaging => self.imaging_timeout_ms,
        })
    }

    /// This policy with the per-attempt deadline of `kind`.
    pub fn for_call(&self, kind: CallKind) -> RetryPolicy {
        RetryPolicy {
            call_timeout_ms: self.timeout_for(kind).as_millis() as u64,
            ..*self
        }
    }

    /// Set every per-call deadline at once.
    pub fn with_all_timeouts(mut self, ms: u64) -> Self {
        self.call_timeout_ms = ms;
        self.scoring_timeout_ms = ms;
        self.imaging_timeout_ms = ms;
        self
    }

    /// Delay after failed attempt `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u64::MAX);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms))
    }

    /// Run `op` until it succeeds, fails non-transiently, or runs out of
    /// attempts. A missed deadline counts as a transient failure.
    ///
    /// `on_retry(attempt, delay, error)` is called before each backoff sleep.
    pub async fn run<T, F, Fut, R>(&self, mut op: F, mut on_retry: R) -> Result<T, RetryFailure>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, CollaboratorError>>,
        R: FnMut(u32, Duration, &CollaboratorError),
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let error = match tokio::time::timeout(self.call_timeout(), op(attempt)).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(err)) => err,
                Err(_elapsed) => CollaboratorError::Transient(format!(
                    "call timed out after {} ms",
                    self.call_timeout_ms
                )),
            };

            if !error.is_transient() {
                return Err(RetryFailure {
                    error,
                    attempts: attempt,
                    exhausted: false,
                });
            }
            if attempt >= max_attempts {
                return Err(RetryFailure {
                    error,
                    attempts: attempt,
                    exhausted: true,
                });
            }

            let delay = self.backoff(attempt);
            on_retry(attempt, delay, &error);
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
