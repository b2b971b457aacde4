/*!
 * Best-effort user notifications about finished or failed requests.
 */

use async_trait::async_trait;
use log::{info, warn};
use reqwest::Client;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Notification severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

/// A channel users hear from; failures are logged, never returned
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str, severity: Severity);
}

/// Writes notifications to the log
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, message: &str, severity: Severity) {
        match severity {
            Severity::Info => info!("{}", message),
            Severity::Warning => warn!("{}", message),
        }
    }
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    message: &'a str,
    severity: Severity,
}

/// Posts notifications as JSON to a webhook
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, message: &str, severity: Severity) {
        let payload = WebhookPayload { message, severity };
        match self.client.post(&self.url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => warn!("Notification webhook returned {}", response.status()),
            Err(e) => warn!("Failed to deliver notification to {}: {}", self.url, e),
        }
    }
}
