//! Retry orchestration around a single backend.
//!
//! The orchestrator owns the attempt loop: bounded attempts, exponential
//! backoff with jitter, a floor from rate-limit hints, an overall deadline
//! and cancellation. Backends never retry on their own.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fastpy_core::{Prompt, RetryPolicy};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::{Backend, BackendFailure, BackendResponse, FailureKind};

/// Waits between attempts.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real-time sleeper backed by tokio.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Terminal outcome of a retried call that did not produce a response.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CallError {
    /// A non-retryable failure, or the last failure after the attempts or
    /// the deadline ran out.
    #[error("{failure} (after {attempts} attempt(s))")]
    Fatal { failure: BackendFailure, attempts: u32 },

    #[error("Cancelled after {attempts} attempt(s)")]
    Cancelled { attempts: u32 },
}

impl CallError {
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Fatal { attempts, .. } | Self::Cancelled { attempts } => *attempts,
        }
    }

    pub fn failure(&self) -> Option<&BackendFailure> {
        match self {
            Self::Fatal { failure, .. } => Some(failure),
            Self::Cancelled { .. } => None,
        }
    }
}

/// Drives one logical generation call through a [`Backend`].
pub struct RetryOrchestrator {
    sleeper: Arc<dyn Sleeper>,
    rng: Mutex<StdRng>,
}

impl Default for RetryOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryOrchestrator {
    pub fn new() -> Self {
        Self {
            sleeper: Arc::new(TokioSleeper),
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Use a deterministic jitter source.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    /// Call `backend` until it succeeds, fails fatally, runs out of attempts
    /// or budget, or `cancel` fires.
    ///
    /// The returned response carries the 1-based attempt that produced it.
    pub async fn call(
        &self,
        backend: &dyn Backend,
        prompt: &Prompt,
        policy: &RetryPolicy,
        cancel: &CancellationToken,
    ) -> Result<BackendResponse, CallError> {
        let max_attempts = policy.max_attempts.max(1);
        let started = Instant::now();
        let mut slept = Duration::ZERO;
        let mut attempt = 0u32;

        loop {
            if cancel.is_cancelled() {
                info!("Generation cancelled before attempt {}", attempt + 1);
                return Err(CallError::Cancelled { attempts: attempt });
            }

            let remaining = policy.deadline.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                return Err(deadline_exceeded(attempt));
            }

            attempt += 1;
            debug!("Backend attempt {}/{}", attempt, max_attempts);

            let outcome = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Generation cancelled during attempt {}", attempt);
                    return Err(CallError::Cancelled { attempts: attempt });
                }
                result = tokio::time::timeout(remaining, backend.generate(prompt)) => result,
            };

            let failure = match outcome {
                Ok(Ok(mut response)) => {
                    response.attempt = attempt;
                    return Ok(response);
                }
                Ok(Err(failure)) => failure,
                Err(_) => BackendFailure::new(FailureKind::Timeout, "overall deadline exceeded"),
            };

            if !failure.kind.is_retryable() {
                warn!("Non-retryable backend failure: {}", failure);
                return Err(CallError::Fatal {
                    failure,
                    attempts: attempt,
                });
            }
            if attempt >= max_attempts {
                warn!("Backend failed after {} attempt(s): {}", attempt, failure);
                return Err(CallError::Fatal {
                    failure,
                    attempts: attempt,
                });
            }

            let budget = policy
                .deadline
                .saturating_sub(slept)
                .min(policy.deadline.saturating_sub(started.elapsed()));
            let delay = self.delay_for(policy, attempt + 1, &failure).min(budget);
            if budget.is_zero() {
                return Err(deadline_exceeded(attempt));
            }

            warn!(
                "Attempt {} failed ({}), retrying in {:?}",
                attempt, failure, delay
            );
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Generation cancelled while waiting to retry");
                    return Err(CallError::Cancelled { attempts: attempt });
                }
                _ = self.sleeper.sleep(delay) => {}
            }
            slept += delay;
        }
    }

    /// Delay before `next_attempt`: jittered exponential backoff, capped,
    /// then raised to any rate-limit hint.
    fn delay_for(&self, policy: &RetryPolicy, next_attempt: u32, failure: &BackendFailure) -> Duration {
        let nominal = policy.nominal_delay(next_attempt).as_secs_f64();
        let jitter = if policy.jitter.is_finite() {
            policy.jitter.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let factor = if jitter > 0.0 {
            self.rng.lock().gen_range(1.0 - jitter..=1.0 + jitter)
        } else {
            1.0
        };
        let mut delay = Duration::try_from_secs_f64((nominal * factor).max(0.0))
            .unwrap_or(policy.max_delay)
            .min(policy.max_delay);

        if failure.kind == FailureKind::RateLimited {
            if let Some(hint) = failure.retry_after {
                delay = delay.max(hint);
            }
        }
        delay
    }
}

fn deadline_exceeded(attempts: u32) -> CallError {
    CallError::Fatal {
        failure: BackendFailure::new(FailureKind::Timeout, "overall deadline exceeded"),
        attempts,
    }
}
