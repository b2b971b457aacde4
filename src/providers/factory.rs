use log::{debug, info};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use super::anthropic::Anthropic;
use super::custom::CustomEndpoint;
use super::deepl::DeepL;
use super::libretranslate::LibreTranslate;
use super::local_ai::LocalAI;
use super::openai::OpenAI;
use super::{HttpTransport, ProviderKind, TranslationProvider};
use crate::errors::ProviderError;
use crate::settings::{SettingsStore, keys};

/// Maps service-type keys to provider instances
///
/// One instance is built per provider kind and reused for the lifetime of
/// the factory, so each adapter's lazily loaded configuration is shared by
/// every job that uses it.
pub struct ProviderFactory {
    settings: Arc<dyn SettingsStore>,
    transport: HttpTransport,
    cache: Mutex<HashMap<ProviderKind, Arc<dyn TranslationProvider>>>,
}

impl ProviderFactory {
    pub fn new(settings: Arc<dyn SettingsStore>, transport: HttpTransport) -> Self {
        Self {
            settings,
            transport,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Register a ready-made instance for a provider kind, replacing any cached one
    pub fn insert(&self, kind: ProviderKind, provider: Arc<dyn TranslationProvider>) {
        self.cache.lock().insert(kind, provider);
    }

    /// Get the provider registered under `name`
    pub fn create_provider(&self, name: &str) -> Result<Arc<dyn TranslationProvider>, ProviderError> {
        let kind: ProviderKind = name.parse()?;
        Ok(self.provider_for(kind))
    }

    /// Get the provider selected by the `service_type` setting
    pub async fn resolve_provider(&self) -> Result<Arc<dyn TranslationProvider>, ProviderError> {
        let service_type = self
            .settings
            .get_setting(keys::SERVICE_TYPE)
            .await
            .map_err(|e| ProviderError::Configuration(e.to_string()))?;

        match service_type.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => self.create_provider(name),
            _ => {
                debug!("No service type configured, using {}", ProviderKind::default());
                Ok(self.provider_for(ProviderKind::default()))
            }
        }
    }

    fn provider_for(&self, kind: ProviderKind) -> Arc<dyn TranslationProvider> {
        let mut cache = self.cache.lock();
        cache
            .entry(kind)
            .or_insert_with(|| {
                info!("Creating {} translation provider", kind);
                self.build(kind)
            })
            .clone()
    }

    fn build(&self, kind: ProviderKind) -> Arc<dyn TranslationProvider> {
        let settings = Arc::clone(&self.settings);
        let transport = self.transport.clone();
        match kind {
            ProviderKind::LibreTranslate => Arc::new(LibreTranslate::new(settings, transport)),
            ProviderKind::DeepL => Arc::new(DeepL::new(settings, transport)),
            ProviderKind::OpenAI => Arc::new(OpenAI::new(settings, transport)),
            ProviderKind::Anthropic => Arc::new(Anthropic::new(settings, transport)),
            ProviderKind::LocalAI => Arc::new(LocalAI::new(settings, transport)),
            ProviderKind::Custom => Arc::new(CustomEndpoint::new(settings, transport)),
        }
    }
}
