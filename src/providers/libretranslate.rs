use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

use super::{HttpTransport, TranslationProvider, optional_setting, require_text, required_url};
use crate::errors::ProviderError;
use crate::language_utils;
use crate::settings::{SettingsStore, keys};

/// LibreTranslate client, the default provider
pub struct LibreTranslate {
    settings: Arc<dyn SettingsStore>,
    transport: HttpTransport,
    config: OnceCell<LibreTranslateConfig>,
}

#[derive(Debug, Clone)]
struct LibreTranslateConfig {
    /// Full URL of the `/translate` route
    translate_url: String,
    api_key: Option<String>,
}

/// LibreTranslate translate request
#[derive(Debug, Serialize)]
pub struct LibreTranslateRequest<'a> {
    q: &'a str,
    source: String,
    target: String,
    format: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<&'a str>,
}

/// LibreTranslate translate response
#[derive(Debug, Deserialize)]
pub struct LibreTranslateResponse {
    #[serde(rename = "translatedText")]
    pub translated_text: Option<String>,
}

impl LibreTranslate {
    pub fn new(settings: Arc<dyn SettingsStore>, transport: HttpTransport) -> Self {
        Self {
            settings,
            transport,
            config: OnceCell::new(),
        }
    }

    async fn config(&self) -> Result<&LibreTranslateConfig, ProviderError> {
        self.config
            .get_or_try_init(|| async {
                let values = self
                    .settings
                    .get_settings(&[keys::LIBRETRANSLATE_URL, keys::LIBRETRANSLATE_API_KEY])
                    .await
                    .map_err(|e| ProviderError::Configuration(e.to_string()))?;

                let base = required_url(&values, keys::LIBRETRANSLATE_URL)?;
                let translate_url = format!("{}/translate", base.trim_end_matches('/'));
                debug!("LibreTranslate initialized at {}", translate_url);

                Ok::<_, ProviderError>(LibreTranslateConfig {
                    translate_url,
                    api_key: optional_setting(&values, keys::LIBRETRANSLATE_API_KEY),
                })
            })
            .await
    }
}

impl fmt::Debug for LibreTranslate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LibreTranslate")
            .field("initialized", &self.config.initialized())
            .finish()
    }
}

#[async_trait]
impl TranslationProvider for LibreTranslate {
    fn name(&self) -> &str {
        "libretranslate"
    }

    async fn translate(
        &self,
        text: &str,
        source_language: &str,
        target_language: &str,
        cancel: &CancellationToken,
    ) -> Result<String, ProviderError> {
        let config = self.config().await?;

        let request = LibreTranslateRequest {
            q: text,
            source: language_utils::normalize_to_part1_or_part2t(source_language)
                .unwrap_or_else(|_| source_language.to_string()),
            target: language_utils::normalize_to_part1_or_part2t(target_language)
                .unwrap_or_else(|_| target_language.to_string()),
            format: "text",
            api_key: config.api_key.as_deref(),
        };

        let response: LibreTranslateResponse = self
            .transport
            .post_json(&config.translate_url, &[], &request, cancel)
            .await?;

        require_text(response.translated_text)
    }
}
