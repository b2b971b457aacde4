use async_trait::async_trait;
use log::debug;
use std::fmt;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

use super::openai::{ChatConfig, chat_translate};
use super::{HttpTransport, TranslationProvider, optional_setting, required_setting, required_url};
use crate::errors::ProviderError;
use crate::settings::{SettingsStore, keys};

/// LocalAI (or any OpenAI-compatible server) client.
///
/// `local_ai_endpoint` is the full chat-completions URL; the API key is
/// optional since most local servers run without auth.
pub struct LocalAI {
    settings: Arc<dyn SettingsStore>,
    transport: HttpTransport,
    config: OnceCell<ChatConfig>,
}

impl LocalAI {
    pub fn new(settings: Arc<dyn SettingsStore>, transport: HttpTransport) -> Self {
        Self {
            settings,
            transport,
            config: OnceCell::new(),
        }
    }

    async fn config(&self) -> Result<&ChatConfig, ProviderError> {
        self.config
            .get_or_try_init(|| async {
                let values = self
                    .settings
                    .get_settings(&[
                        keys::LOCAL_AI_ENDPOINT,
                        keys::LOCAL_AI_MODEL,
                        keys::LOCAL_AI_API_KEY,
                        keys::AI_PROMPT,
                    ])
                    .await
                    .map_err(|e| ProviderError::Configuration(e.to_string()))?;

                let config = ChatConfig {
                    url: required_url(&values, keys::LOCAL_AI_ENDPOINT)?,
                    model: required_setting(&values, keys::LOCAL_AI_MODEL)?,
                    api_key: optional_setting(&values, keys::LOCAL_AI_API_KEY),
                    prompt: optional_setting(&values, keys::AI_PROMPT),
                };
                debug!("LocalAI initialized at {} with model {}", config.url, config.model);
                Ok::<_, ProviderError>(config)
            })
            .await
    }
}

impl fmt::Debug for LocalAI {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalAI")
            .field("initialized", &self.config.initialized())
            .finish()
    }
}

#[async_trait]
impl TranslationProvider for LocalAI {
    fn name(&self) -> &str {
        "localai"
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
