use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

use super::{HttpTransport, TranslationProvider, require_text, required_url};
use crate::errors::ProviderError;
use crate::settings::{SettingsStore, keys};

/// Client for a user-supplied endpoint speaking the generic JSON contract:
/// request `{"text": ...}`, response `{"translatedText": ...}`.
pub struct CustomEndpoint {
    settings: Arc<dyn SettingsStore>,
    transport: HttpTransport,
    endpoint: OnceCell<String>,
}

#[derive(Debug, Serialize)]
pub struct CustomRequest<'a> {
    pub text: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct CustomResponse {
    #[serde(rename = "translatedText")]
    pub translated_text: Option<String>,
}

impl CustomEndpoint {
    pub fn new(settings: Arc<dyn SettingsStore>, transport: HttpTransport) -> Self {
        Self {
            settings,
            transport,
            endpoint: OnceCell::new(),
        }
    }

    async fn endpoint(&self) -> Result<&str, ProviderError> {
        let endpoint = self
            .endpoint
            .get_or_try_init(|| async {
                let values = self
                    .settings
                    .get_settings(&[keys::CUSTOM_ENDPOINT])
                    .await
                    .map_err(|e| ProviderError::Configuration(e.to_string()))?;
                let endpoint = required_url(&values, keys::CUSTOM_ENDPOINT)?;
                debug!("Custom translation endpoint initialized at {}", endpoint);
                Ok::<_, ProviderError>(endpoint)
            })
            .await?;
        Ok(endpoint.as_str())
    }
}

impl fmt::Debug for CustomEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomEndpoint")
            .field("endpoint", &self.endpoint.get())
            .finish()
    }
}

#[async_trait]
impl TranslationProvider for CustomEndpoint {
    fn name(&self) -> &str {
        "custom"
    }

    // The generic contract carries no language fields; the endpoint is
    // expected to be configured for a fixed language pair.
    async fn translate(
        &self,
        text: &str,
        _source_language: &str,
        _target_language: &str,
        cancel: &CancellationToken,
    ) -> Result<String, ProviderError> {
        let endpoint = self.endpoint().await?;

        let response: CustomResponse = self
            .transport
            .post_json(endpoint, &[], &CustomRequest { text }, cancel)
            .await?;

        require_text(response.translated_text)
    }
}
