/*!
 * Error types for the subrelay application.
 *
 * This module contains custom error types for different parts of the application,
 * using the thiserror crate for ergonomic error definitions.
 */

use thiserror::Error;

use crate::database::models::TranslationStatus;

/// Errors that can occur when working with provider APIs
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Provider settings are missing or invalid
    #[error("Provider configuration error: {0}")]
    Configuration(String),

    /// No provider is registered under the configured service type
    #[error("Unsupported translation provider: {0}")]
    Unsupported(String),

    /// Failure expected to resolve with a retry (connection, timeout, 429, 5xx)
    #[error("Transient provider failure: {0}")]
    Transient(String),

    /// Error returned by the API itself
    #[error("API responded with error: {status_code} - {message}")]
    ApiError {
        /// HTTP status code
        status_code: u16,
        /// Response body returned by the API
        message: String,
    },

    /// A successful response with an empty or malformed body
    #[error("Invalid response from provider: {0}")]
    InvalidResponse(String),

    /// The caller requested cancellation while the call was in flight
    #[error("Translation cancelled")]
    Cancelled,
}

impl ProviderError {
    /// Whether a fresh attempt might succeed without any change on our side.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transient(_) => true,
            Self::ApiError { status_code, .. } => {
                *status_code == 429 || (500..600).contains(status_code)
            }
            _ => false,
        }
    }
}

/// Errors raised by the translation request store
#[derive(Error, Debug)]
pub enum StoreError {
    /// No row exists for the request id
    #[error("Translation request {0} not found")]
    NotFound(i64),

    /// The requested status change is not allowed by the lifecycle
    #[error("Invalid status transition for request {id}: {from} -> {to}")]
    InvalidTransition {
        id: i64,
        from: TranslationStatus,
        to: TranslationStatus,
    },

    /// A new request carried invalid fields
    #[error("Invalid translation request: {0}")]
    InvalidRequest(String),

    /// Another process holds the runner lease
    #[error("Another runner ({owner}) is processing the queue")]
    RunnerActive { owner: String },

    /// The underlying database failed
    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),
}

/// Errors that can occur during subtitle processing
#[derive(Error, Debug)]
pub enum SubtitleError {
    /// The subtitle file could not be read
    #[error("Failed to read subtitle file {path}: {message}")]
    Read { path: String, message: String },

    /// The subtitle content could not be parsed
    #[error("Failed to parse subtitle file {path}: {message}")]
    Parse { path: String, message: String },

    /// The translated subtitle file could not be written
    #[error("Failed to write subtitle file {path}: {message}")]
    Write { path: String, message: String },

    /// The translated file would replace the subtitle it was made from
    #[error("Output path {path} is the source subtitle itself")]
    OutputCollision { path: String },
}

/// Classification of job failures, used for logging and retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    TransientProvider,
    NonRetryableProvider,
    Cancellation,
    Persistence,
    Subtitle,
}

/// Errors that abort a single orchestration attempt
#[derive(Error, Debug)]
pub enum JobError {
    /// Error from the provider API or its configuration
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Error from the request store
    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),

    /// Error with subtitle processing
    #[error("Subtitle error: {0}")]
    Subtitle(#[from] SubtitleError),
}

impl JobError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Provider(ProviderError::Configuration(_))
            | Self::Provider(ProviderError::Unsupported(_)) => ErrorKind::Configuration,
            Self::Provider(ProviderError::Cancelled) => ErrorKind::Cancellation,
            Self::Provider(e) if e.is_transient() => ErrorKind::TransientProvider,
            Self::Provider(_) => ErrorKind::NonRetryableProvider,
            Self::Persistence(_) => ErrorKind::Persistence,
            Self::Subtitle(_) => ErrorKind::Subtitle,
        }
    }
}

/// Main application error type that wraps all other errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from a file operation
    #[error("File error: {0}")]
    File(String),

    /// Error from a provider
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Error from the request store
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Error from a translation job
    #[error("Job error: {0}")]
    Job(#[from] JobError),

    /// Any other error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

// Utility functions for error conversion
impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::Unknown(error.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::File(error.to_string())
    }
}
