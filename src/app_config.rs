use anyhow::{Context, Result, anyhow};
use log::warn;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::jobs::{DEFAULT_MAX_RETRIES, DispatcherConfig};
use crate::providers::retry::RetryPolicy;

/// Application configuration module
/// This module handles the application configuration including loading,
/// validating and saving configuration settings.
/// Provider credentials are not part of it: they live in the settings table.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct Config {
    /// Database file; the platform data directory when unset
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Provider call retry settings
    #[serde(default)]
    pub retry: RetryConfig,

    /// Job scheduling settings
    #[serde(default)]
    pub dispatcher: DispatcherSettings,

    /// HTTP settings shared by every provider
    #[serde(default)]
    pub provider: ProviderSettings,

    /// Where finished and failed jobs are announced
    #[serde(default)]
    pub notifications: NotificationConfig,
}

/// Retry behavior of a single provider call
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts per call, first one included
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base backoff, doubled on each retry
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound of the random jitter added to each backoff
    #[serde(default = "default_max_jitter_ms")]
    pub max_jitter_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_jitter_ms: default_max_jitter_ms(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_jitter: Duration::from_millis(self.max_jitter_ms),
        }
    }
}

/// Job scheduling
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DispatcherSettings {
    /// Requests translated at the same time
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Re-invocations of a failed job before it is marked failed
    #[serde(default = "default_max_job_retries")]
    pub max_job_retries: u32,

    /// Delay before the first re-invocation, grows linearly
    #[serde(default = "default_job_retry_delay_ms")]
    pub job_retry_delay_ms: u64,

    /// A runner silent for this long is presumed dead and its lease reclaimed
    #[serde(default = "default_runner_lease_secs")]
    pub runner_lease_secs: u64,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_job_retries: default_max_job_retries(),
            job_retry_delay_ms: default_job_retry_delay_ms(),
            runner_lease_secs: default_runner_lease_secs(),
        }
    }
}

impl DispatcherSettings {
    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            concurrency: self.concurrency,
            max_job_retries: self.max_job_retries,
            retry_delay: Duration::from_millis(self.job_retry_delay_ms),
        }
    }

    pub fn runner_lease(&self) -> Duration {
        Duration::from_secs(self.runner_lease_secs)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ProviderSettings {
    /// Timeout of a single HTTP request
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct NotificationConfig {
    /// JSON webhook; notifications only go to the log when unset
    #[serde(default)]
    pub webhook_url: Option<String>,
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    5000 // doubled on each retry
}

fn default_max_jitter_ms() -> u64 {
    100
}

fn default_concurrency() -> usize {
    2
}

fn default_max_job_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_job_retry_delay_ms() -> u64 {
    10_000
}

fn default_runner_lease_secs() -> u64 {
    60
}

fn default_timeout_secs() -> u64 {
    30
}

impl Config {
    /// Load the configuration file, writing a default one when it is missing
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            let file = File::open(path)
                .context(format!("Failed to open config file: {}", path.display()))?;
            let config: Config = serde_json::from_reader(BufReader::new(file))
                .context(format!("Failed to parse config file: {}", path.display()))?;
            return Ok(config);
        }

        warn!("Config file not found at '{}', creating default config.", path.display());
        let config = Config::default();
        config.save(path)?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let config_json = serde_json::to_string_pretty(self)
            .context("Failed to serialize config to JSON")?;
        std::fs::write(path, config_json)
            .context(format!("Failed to write config to file: {}", path.display()))
    }

    /// Validate the configuration for consistency and required values
    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(anyhow!("retry.max_attempts must be at least 1"));
        }
        if self.dispatcher.concurrency == 0 {
            return Err(anyhow!("dispatcher.concurrency must be at least 1"));
        }
        if self.dispatcher.runner_lease_secs < 3 {
            return Err(anyhow!("dispatcher.runner_lease_secs must be at least 3"));
        }
        if self.provider.timeout_secs == 0 {
            return Err(anyhow!("provider.timeout_secs must be at least 1"));
        }
        if let Some(url) = &self.notifications.webhook_url {
            url::Url::parse(url)
                .map_err(|e| anyhow!("notifications.webhook_url is not a valid URL: {}", e))?;
        }
        Ok(())
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider.timeout_secs)
    }
}
