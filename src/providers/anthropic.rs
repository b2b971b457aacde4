use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

use super::{HttpTransport, TranslationProvider, optional_setting, render_prompt, require_text, required_setting};
use crate::errors::ProviderError;
use crate::settings::{SettingsStore, keys};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com";
const DEFAULT_ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Anthropic client for interacting with Anthropic API
pub struct Anthropic {
    settings: Arc<dyn SettingsStore>,
    transport: HttpTransport,
    /// API base URL, defaults to the public API
    base_url: String,
    config: OnceCell<AnthropicConfig>,
}

#[derive(Debug, Clone)]
struct AnthropicConfig {
    api_key: String,
    model: String,
    version: String,
    prompt: Option<String>,
}

/// Anthropic message request
#[derive(Debug, Serialize)]
pub struct AnthropicRequest {
    /// The model to use
    model: String,

    /// The messages for the conversation
    messages: Vec<AnthropicMessage>,

    /// System prompt to guide the AI
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,

    /// Maximum number of tokens to generate
    max_tokens: u32,
}

/// Anthropic message format
#[derive(Debug, Serialize, Deserialize)]
pub struct AnthropicMessage {
    /// Role of the message sender (user, assistant)
    pub role: String,

    /// Content of the message
    pub content: String,
}

/// Anthropic response
#[derive(Debug, Deserialize)]
pub struct AnthropicResponse {
    /// The content of the response
    #[serde(default)]
    pub content: Vec<AnthropicContent>,
}

/// Individual content block in an Anthropic response
#[derive(Debug, Deserialize)]
pub struct AnthropicContent {
    /// The type of content
    #[serde(rename = "type")]
    pub content_type: String,

    /// The actual text content, absent for non-text blocks
    #[serde(default)]
    pub text: Option<String>,
}

impl AnthropicRequest {
    /// Create a new Anthropic request
    pub fn new(model: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            model: model.into(),
            messages: Vec::new(),
            system: None,
            max_tokens,
        }
    }

    /// Add a message to the request
    pub fn add_message(mut self, role: impl Into<String>, content: impl Into<String>) -> Self {
        self.messages.push(AnthropicMessage {
            role: role.into(),
            content: content.into(),
        });
        self
    }

    /// Set the system prompt
    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

impl AnthropicResponse {
    /// Concatenate every text block of the response
    pub fn extract_text(self) -> Option<String> {
        let text: String = self
            .content
            .into_iter()
            .filter(|c| c.content_type == "text")
            .filter_map(|c| c.text)
            .collect();
        Some(text.trim().to_string()).filter(|t| !t.is_empty())
    }
}

impl Anthropic {
    pub fn new(settings: Arc<dyn SettingsStore>, transport: HttpTransport) -> Self {
        Self {
            settings,
            transport,
            base_url: ANTHROPIC_API_URL.to_string(),
            config: OnceCell::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn config(&self) -> Result<&AnthropicConfig, ProviderError> {
        self.config
            .get_or_try_init(|| async {
                let values = self
                    .settings
                    .get_settings(&[
                        keys::ANTHROPIC_API_KEY,
                        keys::ANTHROPIC_MODEL,
                        keys::ANTHROPIC_VERSION,
                        keys::AI_PROMPT,
                    ])
                    .await
                    .map_err(|e| ProviderError::Configuration(e.to_string()))?;

                let config = AnthropicConfig {
                    api_key: required_setting(&values, keys::ANTHROPIC_API_KEY)?,
                    model: required_setting(&values, keys::ANTHROPIC_MODEL)?,
                    version: optional_setting(&values, keys::ANTHROPIC_VERSION)
                        .unwrap_or_else(|| DEFAULT_ANTHROPIC_VERSION.to_string()),
                    prompt: optional_setting(&values, keys::AI_PROMPT),
                };
                debug!("Anthropic initialized with model {}", config.model);
                Ok::<_, ProviderError>(config)
            })
            .await
    }
}

impl fmt::Debug for Anthropic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Anthropic")
            .field("base_url", &self.base_url)
            .field("initialized", &self.config.initialized())
            .finish()
    }
}

#[async_trait]
impl TranslationProvider for Anthropic {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn translate(
        &self,
        text: &str,
        source_language: &str,
        target_language: &str,
        cancel: &CancellationToken,
    ) -> Result<String, ProviderError> {
        let config = self.config().await?;

        let request = AnthropicRequest::new(config.model.clone(), DEFAULT_MAX_TOKENS)
            .system(render_prompt(config.prompt.as_deref(), source_language, target_language))
            .add_message("user", text);

        let headers = [
            ("x-api-key", config.api_key.clone()),
            ("anthropic-version", config.version.clone()),
        ];
        let url = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));

        let response: AnthropicResponse = self
            .transport
            .post_json(&url, &headers, &request, cancel)
            .await?;

        require_text(response.extract_text())
    }
}
