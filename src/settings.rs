/*!
 * Settings store used to resolve the active provider and its credentials.
 */

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

use crate::database::Repository;
use crate::errors::StoreError;
use crate::language_utils;

/// Well-known setting keys
pub mod keys {
    pub const SERVICE_TYPE: &str = "service_type";
    pub const SOURCE_LANGUAGES: &str = "source_languages";
    pub const AI_PROMPT: &str = "ai_prompt";

    pub const DEEPL_API_KEY: &str = "deepl_api_key";

    pub const LIBRETRANSLATE_URL: &str = "libretranslate_url";
    pub const LIBRETRANSLATE_API_KEY: &str = "libretranslate_api_key";

    pub const OPENAI_MODEL: &str = "openai_model";
    pub const OPENAI_API_KEY: &str = "openai_api_key";

    pub const ANTHROPIC_MODEL: &str = "anthropic_model";
    pub const ANTHROPIC_API_KEY: &str = "anthropic_api_key";
    pub const ANTHROPIC_VERSION: &str = "anthropic_version";

    pub const LOCAL_AI_MODEL: &str = "local_ai_model";
    pub const LOCAL_AI_ENDPOINT: &str = "local_ai_endpoint";
    pub const LOCAL_AI_API_KEY: &str = "local_ai_api_key";

    pub const CUSTOM_ENDPOINT: &str = "custom_endpoint";
}

/// Parse the `source_languages` setting: a JSON array or a comma-separated list.
///
/// Codes are normalized so `eng` and `en` compare equal; unknown codes are
/// kept lowercased.
pub fn parse_language_list(raw: &str) -> Vec<String> {
    let codes: Vec<String> = serde_json::from_str(raw)
        .unwrap_or_else(|_| raw.split(',').map(str::to_string).collect());

    codes
        .iter()
        .map(|code| code.trim())
        .filter(|code| !code.is_empty())
        .map(|code| {
            language_utils::normalize_to_part1_or_part2t(code).unwrap_or_else(|_| code.to_lowercase())
        })
        .collect()
}

/// Read access to persisted settings
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Get one setting, `None` when it was never set
    async fn get_setting(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Get several settings; keys that are not set are absent from the map
    async fn get_settings(&self, keys: &[&str]) -> Result<HashMap<String, String>, StoreError>;
}

/// Settings backed by the `settings` table
#[derive(Clone)]
pub struct SqliteSettings {
    repo: Repository,
}

impl SqliteSettings {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    pub async fn set_setting(&self, key: &str, value: &str) -> Result<(), StoreError> {
        Ok(self.repo.set_setting(key, value).await?)
    }
}

#[async_trait]
impl SettingsStore for SqliteSettings {
    async fn get_setting(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.repo.get_setting(key).await?)
    }

    async fn get_settings(&self, keys: &[&str]) -> Result<HashMap<String, String>, StoreError> {
        Ok(self.repo.get_settings(keys).await?)
    }
}

/// In-memory settings, for tests and embedding
#[derive(Debug, Default)]
pub struct MemorySettings {
    values: RwLock<HashMap<String, String>>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a list of key/value pairs
    pub fn with(pairs: &[(&str, &str)]) -> Self {
        let values = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self { values: RwLock::new(values) }
    }

    pub fn set(&self, key: &str, value: &str) {
        self.values.write().insert(key.to_string(), value.to_string());
    }
}

#[async_trait]
impl SettingsStore for MemorySettings {
    async fn get_setting(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.values.read().get(key).cloned())
    }

    async fn get_settings(&self, keys: &[&str]) -> Result<HashMap<String, String>, StoreError> {
        let values = self.values.read();
        Ok(keys
            .iter()
            .filter_map(|k| values.get(*k).map(|v| (k.to_string(), v.clone())))
            .collect())
    }
}
