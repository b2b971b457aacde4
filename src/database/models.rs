/*!
 * Database entity models.
 *
 * These structures map directly to database tables and provide
 * type-safe access to persisted data.
 */

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a translation request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranslationStatus {
    /// Queued, no attempt has started yet
    Pending,
    /// Bound to a dispatcher job and being translated
    InProgress,
    /// Translated output was written
    Completed,
    /// Cancelled before the output was written
    Cancelled,
    /// The dispatcher's retry budget for the job is exhausted
    Failed,
}

impl TranslationStatus {
    /// Terminal states are absorbing: no transition leaves them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for TranslationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TranslationStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            "failed" => Ok(Self::Failed),
            _ => Err(anyhow::anyhow!("Invalid translation status: {}", s)),
        }
    }
}

/// Persisted translation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationRequest {
    /// Primary key
    pub id: i64,
    /// Display title of the media item
    pub title: String,
    /// Path of the subtitle file to translate
    pub subtitle_to_translate: String,
    /// Source language code
    pub source_language: String,
    /// Target language code
    pub target_language: String,
    /// Current lifecycle status
    pub status: TranslationStatus,
    /// Dispatcher job currently bound to this request
    pub job_id: Option<String>,
    /// Creation timestamp (RFC 3339)
    pub created_at: String,
    /// Last update timestamp (RFC 3339)
    pub updated_at: String,
    /// Set if and only if the status is terminal
    pub completed_at: Option<String>,
}

/// Fields supplied when queueing a new request
#[derive(Debug, Clone)]
pub struct NewTranslationRequest {
    pub title: String,
    pub subtitle_to_translate: String,
    pub source_language: String,
    pub target_language: String,
}

impl NewTranslationRequest {
    pub fn new(
        title: impl Into<String>,
        subtitle_to_translate: impl Into<String>,
        source_language: impl Into<String>,
        target_language: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            subtitle_to_translate: subtitle_to_translate.into(),
            source_language: source_language.into(),
            target_language: target_language.into(),
        }
    }
}
