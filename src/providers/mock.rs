/*!
 * Mock provider implementations for testing.
 *
 * This module provides a mock provider that simulates different behaviors:
 * - `MockProvider::working("[FR] ")` - Always succeeds, prefixing the input
 * - `MockProvider::intermittent(n)` - Fails with a 503 on every nth call
 * - `MockProvider::failing()` - Always fails with a 500
 * - `MockProvider::misconfigured()` - Always fails with a configuration error
 * - `MockProvider::hanging()` - Never answers until cancelled
 */

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;

use crate::errors::ProviderError;
use crate::providers::TranslationProvider;

/// Behavior mode for the mock provider
#[derive(Debug, Clone, PartialEq)]
pub enum MockBehavior {
    /// Always succeeds with `prefix + text`
    Working { prefix: String },
    /// Fails with a 503 on every `fail_every`th request
    Intermittent { fail_every: usize },
    /// Always fails with the given API status
    Failing { status_code: u16 },
    /// Always fails with a configuration error
    Misconfigured,
    /// Returns an empty translation
    Empty,
    /// Waits until the caller cancels
    Hanging,
}

/// Mock provider for testing translation behavior
#[derive(Debug, Clone)]
pub struct MockProvider {
    behavior: MockBehavior,
    /// Shared between clones
    request_count: Arc<AtomicUsize>,
    /// Token fired once `request_count` reaches the threshold
    cancel_after: Option<(usize, CancellationToken)>,
}

impl MockProvider {
    /// Create a new mock provider with the specified behavior
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            request_count: Arc::new(AtomicUsize::new(0)),
            cancel_after: None,
        }
    }

    pub fn working(prefix: impl Into<String>) -> Self {
        Self::new(MockBehavior::Working { prefix: prefix.into() })
    }

    pub fn intermittent(fail_every: usize) -> Self {
        Self::new(MockBehavior::Intermittent { fail_every: fail_every.max(1) })
    }

    pub fn failing() -> Self {
        Self::new(MockBehavior::Failing { status_code: 500 })
    }

    pub fn misconfigured() -> Self {
        Self::new(MockBehavior::Misconfigured)
    }

    pub fn empty() -> Self {
        Self::new(MockBehavior::Empty)
    }

    pub fn hanging() -> Self {
        Self::new(MockBehavior::Hanging)
    }

    /// Cancel `token` right after the `calls`th request completes
    pub fn cancel_after(mut self, calls: usize, token: CancellationToken) -> Self {
        self.cancel_after = Some((calls, token));
        self
    }

    /// Number of translate calls received so far
    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TranslationProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn translate(
        &self,
        text: &str,
        _source_language: &str,
        _target_language: &str,
        cancel: &CancellationToken,
    ) -> Result<String, ProviderError> {
        let count = self.request_count.fetch_add(1, Ordering::SeqCst) + 1;

        let result = match &self.behavior {
            MockBehavior::Working { prefix } => Ok(format!("{}{}", prefix, text)),

            MockBehavior::Intermittent { fail_every } => {
                if count % fail_every == 0 {
                    Err(ProviderError::ApiError {
                        status_code: 503,
                        message: format!("Simulated intermittent failure (request #{})", count),
                    })
                } else {
                    Ok(format!("[TRANSLATED] {}", text))
                }
            }

            MockBehavior::Failing { status_code } => Err(ProviderError::ApiError {
                status_code: *status_code,
                message: "Simulated provider failure".to_string(),
            }),

            MockBehavior::Misconfigured => Err(ProviderError::Configuration(
                "Simulated missing setting".to_string(),
            )),

            MockBehavior::Empty => Err(ProviderError::InvalidResponse(
                "Invalid or empty response from translation API".to_string(),
            )),

            MockBehavior::Hanging => {
                cancel.cancelled().await;
                Err(ProviderError::Cancelled)
            }
        };

        if let Some((calls, token)) = &self.cancel_after {
            if count >= *calls {
                token.cancel();
            }
        }

        result
    }
}
