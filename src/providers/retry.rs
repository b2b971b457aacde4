// Resilient caller: bounded retry with exponential backoff and jitter for
// outbound provider calls.
//
// Responses are classified by status (429 and 5xx retry, other failures
// return to the caller untouched) and faults by kind (connect/timeout retry,
// everything else is raised at once). Cancellation always wins.

use log::warn;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
    /// Base delay. The wait after failed attempt `n` (0-indexed) is `base * 2^n + jitter`.
    pub base_delay: Duration,
    /// Jitter is drawn uniformly from `[0, max_jitter)`.
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(5000),
            max_jitter: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    /// Exponential part of the delay after the given failed attempt (0-indexed).
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        // Saturate instead of overflowing for absurd attempt counts
        let multiplier = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(multiplier)
            .unwrap_or(Duration::MAX)
    }

    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let backoff = self.backoff_for_attempt(attempt);
        let jitter_ms = u64::try_from(self.max_jitter.as_millis()).unwrap_or(u64::MAX);
        if jitter_ms == 0 {
            return backoff;
        }
        backoff.saturating_add(Duration::from_millis(rand::rng().random_range(0..jitter_ms)))
    }
}

/// Response status as seen by the retry loop.
pub trait HttpStatus {
    fn status_code(&self) -> u16;

    fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code())
    }

    fn is_retryable(&self) -> bool {
        let code = self.status_code();
        code == 429 || (500..600).contains(&code)
    }
}

impl HttpStatus for reqwest::Response {
    fn status_code(&self) -> u16 {
        self.status().as_u16()
    }
}

/// Fault raised by the call itself (no response was received).
pub trait TransientFault {
    fn is_transient(&self) -> bool;
}

impl TransientFault for reqwest::Error {
    fn is_transient(&self) -> bool {
        self.is_connect() || self.is_timeout() || self.is_request()
    }
}

/// Why the retry loop gave up without a response.
#[derive(Debug)]
pub enum CallError<E> {
    /// The caller requested cancellation.
    Cancelled,
    /// A non-transient fault, or the last transient fault after exhaustion.
    Fault(E),
}

/// Execute `operation` with retry-and-backoff.
///
/// Returns the first successful or non-retryable response. When every
/// attempt is used up, the last transient fault is raised if one was seen,
/// otherwise the last (retryable) response is returned as-is.
pub async fn send_with_retry<F, Fut, R, E>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<R, CallError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<R, E>>,
    R: HttpStatus,
    E: TransientFault + std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut last_fault: Option<E> = None;
    let mut last_response: Option<R> = None;

    for attempt in 0..max_attempts {
        if cancel.is_cancelled() {
            return Err(CallError::Cancelled);
        }

        let result = tokio::select! {
            _ = cancel.cancelled() => return Err(CallError::Cancelled),
            result = operation() => result,
        };

        let reason = match result {
            Ok(response) if !response.is_retryable() => return Ok(response),
            Ok(response) => {
                let reason = format!("status {}", response.status_code());
                last_response = Some(response);
                reason
            }
            Err(fault) if fault.is_transient() => {
                let reason = fault.to_string();
                last_fault = Some(fault);
                reason
            }
            Err(fault) => return Err(CallError::Fault(fault)),
        };

        if attempt + 1 >= max_attempts {
            break;
        }

        let delay = policy.delay_for_attempt(attempt);
        warn!(
            "Retrying provider call after {} (attempt {}/{}, waiting {} ms)",
            reason,
            attempt + 1,
            max_attempts,
            delay.as_millis()
        );
        tokio::select! {
            _ = cancel.cancelled() => return Err(CallError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
    }

    match (last_fault, last_response) {
        (Some(fault), _) => Err(CallError::Fault(fault)),
        (None, Some(response)) => Ok(response),
        // The loop runs at least once and every path either returns or records
        (None, None) => Err(CallError::Cancelled),
    }
}
