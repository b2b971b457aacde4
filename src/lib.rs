/*!
 * # subrelay - subtitle translation job orchestration
 *
 * A Rust library that takes queued subtitle translation requests and drives
 * each one through its lifecycle (pending, in progress, then completed,
 * cancelled or failed) while calling pluggable translation providers.
 *
 * ## Features
 *
 * - Persisted request lifecycle with atomic, validated transitions
 * - Translation providers:
 *   - LibreTranslate (default)
 *   - DeepL
 *   - OpenAI
 *   - Anthropic
 *   - LocalAI and other OpenAI-compatible servers
 *   - Custom endpoints speaking a generic JSON contract
 * - Bounded retry with exponential backoff and jitter for provider calls
 * - Cooperative cancellation down to in-flight HTTP requests
 * - Live progress events and best-effort notifications
 * - ISO 639-1 and ISO 639-2 language code support
 *
 * ## Architecture
 *
 * - `app_config`: Configuration management
 * - `app_controller`: Wiring used by the CLI
 * - `database`: SQLite persistence for requests and settings
 * - `request_store`: Request lifecycle state machine and active-count gauge
 * - `settings`: Provider settings access
 * - `providers`: Translation provider adapters, factory and resilient caller
 * - `subtitle_processor`: SRT reading, writing and output naming
 * - `progress`: Progress events
 * - `notifications`: User notifications
 * - `jobs`: Job orchestrator and in-process dispatcher
 * - `language_utils`: ISO language code utilities
 * - `errors`: Custom error types for the application
 */

// Global lints configuration
// These lints will be allowed but not auto-fixed
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

// Public modules
pub mod app_config;
pub mod app_controller;
pub mod database;
pub mod errors;
pub mod jobs;
pub mod language_utils;
pub mod notifications;
pub mod progress;
pub mod providers;
pub mod request_store;
pub mod settings;
pub mod subtitle_processor;

// Re-export main types for easier usage
pub use app_config::Config;
pub use app_controller::Controller;
pub use database::models::{NewTranslationRequest, TranslationRequest, TranslationStatus};
pub use errors::{AppError, ErrorKind, JobError, ProviderError, StoreError, SubtitleError};
pub use jobs::{JobContext, JobDispatcher, TranslationJob};
pub use providers::{TranslationOutcome, TranslationProvider};
pub use request_store::RequestStore;
pub use subtitle_processor::{SubtitleEntry, SubtitleIo};
