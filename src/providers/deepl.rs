use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

use super::{HttpTransport, TranslationProvider, require_text, required_setting};
use crate::errors::ProviderError;
use crate::language_utils;
use crate::settings::{SettingsStore, keys};

const DEEPL_FREE_URL: &str = "https://api-free.deepl.com";
const DEEPL_PRO_URL: &str = "https://api.deepl.com";

/// DeepL client
pub struct DeepL {
    settings: Arc<dyn SettingsStore>,
    transport: HttpTransport,
    /// Overrides the free/pro host picked from the key (tests, proxies)
    base_url: Option<String>,
    config: OnceCell<DeepLConfig>,
}

#[derive(Debug, Clone)]
struct DeepLConfig {
    translate_url: String,
    auth_header: String,
}

/// DeepL translate request
#[derive(Debug, Serialize)]
pub struct DeepLRequest<'a> {
    text: [&'a str; 1],
    source_lang: String,
    target_lang: String,
}

/// DeepL translate response
#[derive(Debug, Deserialize)]
pub struct DeepLResponse {
    #[serde(default)]
    pub translations: Vec<DeepLTranslation>,
}

#[derive(Debug, Deserialize)]
pub struct DeepLTranslation {
    pub text: Option<String>,
}

impl DeepL {
    pub fn new(settings: Arc<dyn SettingsStore>, transport: HttpTransport) -> Self {
        Self {
            settings,
            transport,
            base_url: None,
            config: OnceCell::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    async fn config(&self) -> Result<&DeepLConfig, ProviderError> {
        self.config
            .get_or_try_init(|| async {
                let values = self
                    .settings
                    .get_settings(&[keys::DEEPL_API_KEY])
                    .await
                    .map_err(|e| ProviderError::Configuration(e.to_string()))?;
                let api_key = required_setting(&values, keys::DEEPL_API_KEY)?;

                // Free-tier keys carry a ":fx" suffix and live on a separate host
                let base = match &self.base_url {
                    Some(url) => url.trim_end_matches('/').to_string(),
                    None if api_key.ends_with(":fx") => DEEPL_FREE_URL.to_string(),
                    None => DEEPL_PRO_URL.to_string(),
                };
                let translate_url = format!("{}/v2/translate", base);
                debug!("DeepL initialized at {}", translate_url);

                Ok::<_, ProviderError>(DeepLConfig {
                    translate_url,
                    auth_header: format!("DeepL-Auth-Key {}", api_key),
                })
            })
            .await
    }
}

impl fmt::Debug for DeepL {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeepL")
            .field("base_url", &self.base_url)
            .field("initialized", &self.config.initialized())
            .finish()
    }
}

#[async_trait]
impl TranslationProvider for DeepL {
    fn name(&self) -> &str {
        "deepl"
    }

    async fn translate(
        &self,
        text: &str,
        source_language: &str,
        target_language: &str,
        cancel: &CancellationToken,
    ) -> Result<String, ProviderError> {
        let config = self.config().await?;

        let request = DeepLRequest {
            text: [text],
            source_lang: language_utils::to_deepl_code(source_language),
            target_lang: language_utils::to_deepl_code(target_language),
        };
        let headers = [("Authorization", config.auth_header.clone())];

        let response: DeepLResponse = self
            .transport
            .post_json(&config.translate_url, &headers, &request, cancel)
            .await?;

        require_text(response.translations.into_iter().next().and_then(|t| t.text))
    }
}
