/*!
 * Provider implementations for different translation services.
 *
 * This module contains adapters for the supported translation backends:
 * - LibreTranslate (default)
 * - DeepL
 * - OpenAI
 * - Anthropic
 * - LocalAI (any OpenAI-compatible endpoint)
 * - Custom endpoint speaking the generic `{text}` / `{translatedText}` contract
 *
 * Every adapter sends its request through the resilient caller in `retry`
 * and loads its settings lazily, once, on first use.
 */

use async_trait::async_trait;
use log::error;
use reqwest::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::str::FromStr;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::errors::ProviderError;
use retry::{CallError, RetryPolicy, TransientFault, send_with_retry};

pub mod anthropic;
pub mod custom;
pub mod deepl;
pub mod factory;
pub mod libretranslate;
pub mod local_ai;
pub mod mock;
pub mod openai;
pub mod retry;

/// Common trait for all translation providers
///
/// Implementations must be safe to share between concurrently running
/// translation jobs; the only state they may mutate is their own lazily
/// loaded configuration.
#[async_trait]
pub trait TranslationProvider: Send + Sync + Debug {
    /// Service-type key this provider is registered under
    fn name(&self) -> &str;

    /// Translate a single piece of text
    ///
    /// # Returns
    /// * `Ok(String)` - The translated text, never empty
    /// * `Err(ProviderError::Cancelled)` - `cancel` fired while the call was in flight
    /// * `Err(_)` - Configuration, transport or API failure
    async fn translate(
        &self,
        text: &str,
        source_language: &str,
        target_language: &str,
        cancel: &CancellationToken,
    ) -> Result<String, ProviderError>;
}

/// Result of a single translation call, as the orchestrator sees it
#[derive(Debug)]
pub enum TranslationOutcome {
    /// Translated text
    Success(String),
    /// Failure that may resolve on a later attempt
    Transient(ProviderError),
    /// Failure that will not resolve by retrying the same call
    Fatal(ProviderError),
    /// The caller asked to stop
    Cancelled,
}

impl From<Result<String, ProviderError>> for TranslationOutcome {
    fn from(result: Result<String, ProviderError>) -> Self {
        match result {
            Ok(text) => Self::Success(text),
            Err(ProviderError::Cancelled) => Self::Cancelled,
            Err(e) if e.is_transient() => Self::Transient(e),
            Err(e) => Self::Fatal(e),
        }
    }
}

/// Supported provider service types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProviderKind {
    #[default]
    LibreTranslate,
    DeepL,
    OpenAI,
    Anthropic,
    LocalAI,
    Custom,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 6] = [
        Self::LibreTranslate,
        Self::DeepL,
        Self::OpenAI,
        Self::Anthropic,
        Self::LocalAI,
        Self::Custom,
    ];

    /// Settings key value for this provider
    pub fn key(&self) -> &'static str {
        match self {
            Self::LibreTranslate => "libretranslate",
            Self::DeepL => "deepl",
            Self::OpenAI => "openai",
            Self::Anthropic => "anthropic",
            Self::LocalAI => "localai",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

impl FromStr for ProviderKind {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.key() == key)
            .ok_or_else(|| ProviderError::Unsupported(s.to_string()))
    }
}

/// Shared HTTP client plus the retry policy every adapter sends through
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    policy: RetryPolicy,
}

impl HttpTransport {
    /// Fails when the HTTP client cannot be built, e.g. no TLS backend
    pub fn new(timeout: Duration, policy: RetryPolicy) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Configuration(format!("Cannot build HTTP client: {}", e)))?;
        Ok(Self { client, policy })
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// POST a JSON body and decode a JSON response
    ///
    /// Transient failures are retried per the policy; a non-success status
    /// that survives the retries becomes `ProviderError::ApiError` carrying
    /// the response body.
    pub async fn post_json<B, T>(
        &self,
        url: &str,
        headers: &[(&str, String)],
        body: &B,
        cancel: &CancellationToken,
    ) -> Result<T, ProviderError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = send_with_retry(&self.policy, cancel, || {
            let mut request = self
                .client
                .post(url)
                .header(reqwest::header::ACCEPT, "application/json")
                .json(body);
            for (name, value) in headers {
                request = request.header(*name, value.as_str());
            }
            request.send()
        })
        .await
        .map_err(|e| match e {
            CallError::Cancelled => ProviderError::Cancelled,
            CallError::Fault(e) if e.is_builder() => {
                ProviderError::Configuration(format!("Invalid request to {}: {}", url, e))
            }
            CallError::Fault(e) if e.is_transient() => ProviderError::Transient(e.to_string()),
            CallError::Fault(e) => ProviderError::InvalidResponse(e.to_string()),
        })?;

        let status = response.status();
        let text = tokio::select! {
            _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
            text = response.text() => text.map_err(|e| ProviderError::Transient(e.to_string()))?,
        };

        if !status.is_success() {
            error!("Provider API error ({}) from {}: {}", status, url, text);
            return Err(ProviderError::ApiError {
                status_code: status.as_u16(),
                message: text,
            });
        }

        serde_json::from_str(&text)
            .map_err(|e| ProviderError::InvalidResponse(format!("{}: {}", e, text)))
    }
}

/// System prompt used by LLM-backed providers when `ai_prompt` is unset
pub const DEFAULT_AI_PROMPT: &str = "You are a professional subtitle translator. Translate the user's \
message from {sourceLanguage} to {targetLanguage}. Reply with the translation only, keeping \
line breaks, tone and formatting tags intact.";

/// Fill the language placeholders of a prompt template
pub(crate) fn render_prompt(
    template: Option<&str>,
    source_language: &str,
    target_language: &str,
) -> String {
    let name = |code: &str| {
        crate::language_utils::get_language_name(code).unwrap_or_else(|_| code.to_string())
    };
    template
        .unwrap_or(DEFAULT_AI_PROMPT)
        .replace("{sourceLanguage}", &name(source_language))
        .replace("{targetLanguage}", &name(target_language))
}

/// Reject missing or blank translated text
pub(crate) fn require_text(text: Option<String>) -> Result<String, ProviderError> {
    match text {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => Err(ProviderError::InvalidResponse(
            "Invalid or empty response from translation API".to_string(),
        )),
    }
}

/// Fetch a setting that must be present and non-blank
pub(crate) fn required_setting(
    values: &HashMap<String, String>,
    key: &str,
) -> Result<String, ProviderError> {
    values
        .get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ProviderError::Configuration(format!("Setting '{}' is not configured", key)))
}

/// Fetch a setting that must be a valid absolute URL
pub(crate) fn required_url(
    values: &HashMap<String, String>,
    key: &str,
) -> Result<String, ProviderError> {
    let value = required_setting(values, key)?;
    url::Url::parse(&value)
        .map_err(|e| ProviderError::Configuration(format!("Setting '{}' is not a valid URL: {}", key, e)))?;
    Ok(value)
}

/// Fetch an optional setting, treating blank values as unset
pub(crate) fn optional_setting(values: &HashMap<String, String>, key: &str) -> Option<String> {
    values
        .get(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
