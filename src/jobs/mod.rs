/*!
 * Translation job execution.
 *
 * - `orchestrator`: runs one attempt of one translation request end to end
 * - `dispatcher`: in-process worker pool that schedules attempts with
 *   at-least-once semantics and cooperative cancellation
 */

pub mod dispatcher;
pub mod orchestrator;

pub use dispatcher::{DispatchOutcome, DispatchReport, DispatcherConfig, JobDispatcher};
pub use orchestrator::TranslationJob;

/// Attempt ceiling used when nothing else is configured
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Attempt metadata the dispatcher hands to every invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobContext {
    /// Dispatcher job bound to the request, stable across its attempts
    pub job_id: String,
    /// Zero-based index of this attempt
    pub retry_count: u32,
    /// Highest `retry_count` the dispatcher will schedule
    pub max_retries: u32,
}

impl JobContext {
    pub fn new(job_id: impl Into<String>, retry_count: u32, max_retries: u32) -> Self {
        Self {
            job_id: job_id.into(),
            retry_count,
            max_retries,
        }
    }

    /// No further attempt follows this one
    pub fn is_final_attempt(&self) -> bool {
        self.retry_count >= self.max_retries
    }
}
