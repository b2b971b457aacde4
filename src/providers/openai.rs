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

const OPENAI_API_URL: &str = "https://api.openai.com/v1";

/// OpenAI chat completion request, also spoken by LocalAI
#[derive(Debug, Serialize)]
pub struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<ChatMessage>,
}

/// OpenAI message format
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the message sender (system, user, assistant)
    pub role: String,
    /// Content of the message
    pub content: Option<String>,
}

impl ChatMessage {
    pub fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.into()),
        }
    }
}

/// OpenAI chat completion response
#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    pub message: ChatMessage,
}

impl ChatResponse {
    /// Text of the first choice, if any
    pub fn into_text(self) -> Option<String> {
        self.choices.into_iter().next().and_then(|c| c.message.content)
    }
}

/// Resolved settings for an OpenAI-style chat endpoint
#[derive(Debug, Clone)]
pub(crate) struct ChatConfig {
    pub url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub prompt: Option<String>,
}

/// Send one translation through an OpenAI-compatible chat endpoint
pub(crate) async fn chat_translate(
    transport: &HttpTransport,
    config: &ChatConfig,
    text: &str,
    source_language: &str,
    target_language: &str,
    cancel: &CancellationToken,
) -> Result<String, ProviderError> {
    let request = ChatRequest {
        model: &config.model,
        messages: vec![
            ChatMessage::new(
                "system",
                render_prompt(config.prompt.as_deref(), source_language, target_language),
            ),
            ChatMessage::new("user", text),
        ],
    };

    let headers: Vec<(&str, String)> = config
        .api_key
        .iter()
        .map(|key| ("Authorization", format!("Bearer {}", key)))
        .collect();

    let response: ChatResponse = transport
        .post_json(&config.url, &headers, &request, cancel)
        .await?;

    require_text(response.into_text().map(|t| t.trim().to_string()))
}

/// OpenAI client
pub struct OpenAI {
    settings: Arc<dyn SettingsStore>,
    transport: HttpTransport,
    base_url: String,
    config: OnceCell<ChatConfig>,
}

impl OpenAI {
    pub fn new(settings: Arc<dyn SettingsStore>, transport: HttpTransport) -> Self {
        Self {
            settings,
            transport,
            base_url: OPENAI_API_URL.to_string(),
            config: OnceCell::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn config(&self) -> Result<&ChatConfig, ProviderError> {
        self.config
            .get_or_try_init(|| async {
                let values = self
                    .settings
                    .get_settings(&[keys::OPENAI_API_KEY, keys::OPENAI_MODEL, keys::AI_PROMPT])
                    .await
                    .map_err(|e| ProviderError::Configuration(e.to_string()))?;

                let config = ChatConfig {
                    url: format!("{}/chat/completions", self.base_url.trim_end_matches('/')),
                    model: required_setting(&values, keys::OPENAI_MODEL)?,
                    api_key: Some(required_setting(&values, keys::OPENAI_API_KEY)?),
                    prompt: optional_setting(&values, keys::AI_PROMPT),
                };
                debug!("OpenAI initialized with model {}", config.model);
                Ok::<_, ProviderError>(config)
            })
            .await
    }
}

impl fmt::Debug for OpenAI {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAI")
            .field("base_url", &self.base_url)
            .field("initialized", &self.config.initialized())
            .finish()
    }
}

#[async_trait]
impl TranslationProvider for OpenAI {
    fn name(&self) -> &str {
        "openai"
    }

    async fn translate(
        &self,
        text: &str,
        source_language: &str,
        target_language: &str,
        cancel: &CancellationToken,
    ) -> Result<String, ProviderError> {
        let config = self.config().await?;
        chat_translate(&self.transport, config, text, source_language, target_language, cancel).await
    }
}
