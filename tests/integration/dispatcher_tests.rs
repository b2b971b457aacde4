/*!
 * Tests for dispatcher retries, concurrency and cancellation
 */

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use subrelay::database::models::TranslationStatus;
use subrelay::errors::{ErrorKind, ProviderError};
use subrelay::jobs::{DispatchOutcome, DispatcherConfig, JobDispatcher};
use subrelay::notifications::Severity;
use subrelay::providers::TranslationProvider;
use subrelay::providers::mock::MockProvider;

use crate::common::{JobHarness, create_test_file, create_test_subtitle};

const SINGLE_LINE_SRT: &str = "1\n00:00:01,000 --> 00:00:02,000\nHello there.\n";

fn config(concurrency: usize, max_job_retries: u32) -> DispatcherConfig {
    DispatcherConfig {
        concurrency,
        max_job_retries,
        retry_delay: Duration::from_millis(1),
    }
}

/// Fails the first `failures` calls with a 503, then echoes
#[derive(Debug)]
struct FlakyProvider {
    failures: usize,
    calls: AtomicUsize,
}

#[async_trait]
impl TranslationProvider for FlakyProvider {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn translate(
        &self,
        text: &str,
        _source_language: &str,
        _target_language: &str,
        _cancel: &CancellationToken,
    ) -> Result<String, ProviderError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
            return Err(ProviderError::ApiError {
                status_code: 503,
                message: "busy".to_string(),
            });
        }
        Ok(text.to_uppercase())
    }
}

/// Tracks how many translations run at the same time
#[derive(Debug, Default)]
struct ConcurrencyTracker {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl TranslationProvider for ConcurrencyTracker {
    fn name(&self) -> &str {
        "tracker"
    }

    async fn translate(
        &self,
        text: &str,
        _source_language: &str,
        _target_language: &str,
        _cancel: &CancellationToken,
    ) -> Result<String, ProviderError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(text.to_string())
    }
}

#[tokio::test]
async fn test_dispatch_withHealthyProvider_shouldFinishInOneAttempt() {
    let temp_dir = TempDir::new().unwrap();
    let source = create_test_subtitle(temp_dir.path(), "movie.srt").unwrap();
    let harness = JobHarness::new(Arc::new(MockProvider::working("[FR] ")));
    let request = harness.enqueue(&source, "fr").await;

    let dispatcher = JobDispatcher::new(harness.job.clone(), config(2, 3));
    let report = dispatcher.dispatch(request.clone()).await.unwrap();

    assert_eq!(report.request_id, request.id);
    assert_eq!(report.attempts, 1);
    assert_eq!(report.outcome, DispatchOutcome::Finished(TranslationStatus::Completed));
    assert!(temp_dir.path().join("movie.fr.srt").exists());
}

#[tokio::test]
async fn test_dispatch_withTransientFailures_shouldRecoverOnLaterAttempt() {
    let temp_dir = TempDir::new().unwrap();
    let source = create_test_file(temp_dir.path(), "clip.srt", SINGLE_LINE_SRT).unwrap();
    let provider = Arc::new(FlakyProvider {
        failures: 2,
        calls: AtomicUsize::new(0),
    });
    let harness = JobHarness::new(provider.clone());
    let request = harness.enqueue(&source, "de").await;

    let dispatcher = JobDispatcher::new(harness.job.clone(), config(1, 5));
    let report = dispatcher.dispatch(request.clone()).await.unwrap();

    assert_eq!(report.attempts, 3);
    assert_eq!(report.outcome, DispatchOutcome::Finished(TranslationStatus::Completed));
    assert_eq!(provider.calls.load(Ordering::SeqCst), 3);

    // The job binding survives completion
    let stored = harness.store.get_request(request.id).await.unwrap();
    assert!(stored.job_id.is_some());
    assert!(harness.notifier.messages().iter().all(|(_, severity)| *severity == Severity::Info));
}

#[tokio::test]
async fn test_dispatch_withPersistentFailure_shouldFailAfterLastRetry() {
    let temp_dir = TempDir::new().unwrap();
    let source = create_test_subtitle(temp_dir.path(), "movie.srt").unwrap();
    let provider = MockProvider::failing();
    let harness = JobHarness::new(Arc::new(provider.clone()));
    let request = harness.enqueue(&source, "fr").await;

    let dispatcher = JobDispatcher::new(harness.job.clone(), config(1, 2));
    let report = dispatcher.dispatch(request.clone()).await.unwrap();

    assert_eq!(report.attempts, 3);
    assert!(matches!(
        report.outcome,
        DispatchOutcome::Failed { kind: ErrorKind::TransientProvider, .. }
    ));
    assert_eq!(provider.request_count(), 3);

    let stored = harness.store.get_request(request.id).await.unwrap();
    assert_eq!(stored.status, TranslationStatus::Failed);
    assert_eq!(harness.store.active_count(), 0);

    let warnings: Vec<_> = harness
        .notifier
        .messages()
        .into_iter()
        .filter(|(_, severity)| *severity == Severity::Warning)
        .collect();
    assert_eq!(warnings.len(), 1);
}

#[tokio::test]
async fn test_cancel_withRunningRequest_shouldFinishCancelled() {
    let temp_dir = TempDir::new().unwrap();
    let source = create_test_subtitle(temp_dir.path(), "movie.srt").unwrap();
    let provider = MockProvider::hanging();
    let harness = JobHarness::new(Arc::new(provider.clone()));
    let request = harness.enqueue(&source, "fr").await;

    let dispatcher = JobDispatcher::new(harness.job.clone(), config(1, 5));
    let handle = dispatcher.dispatch(request.clone());

    // Wait until the provider is blocked on the first line
    while provider.request_count() == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(dispatcher.cancel(request.id));

    let report = handle.await.unwrap();
    assert_eq!(report.attempts, 1);
    assert_eq!(report.outcome, DispatchOutcome::Finished(TranslationStatus::Cancelled));
    assert!(!dispatcher.cancel(request.id));
    assert!(!temp_dir.path().join("movie.fr.srt").exists());
    assert_eq!(harness.store.active_count(), 0);
}

#[tokio::test]
async fn test_cancel_withUnknownRequest_shouldReturnFalse() {
    let harness = JobHarness::new(Arc::new(MockProvider::working("")));
    let dispatcher = JobDispatcher::new(harness.job.clone(), config(1, 0));
    assert!(!dispatcher.cancel(42));
}

#[tokio::test]
async fn test_runPending_shouldRespectConcurrencyLimit() {
    let temp_dir = TempDir::new().unwrap();
    let tracker = Arc::new(ConcurrencyTracker::default());
    let harness = JobHarness::new(tracker.clone());
    for i in 0..5 {
        let source = create_test_file(temp_dir.path(), &format!("clip{}.srt", i), SINGLE_LINE_SRT).unwrap();
        harness.enqueue(&source, "es").await;
    }
    let cancelled = harness.enqueue(&temp_dir.path().join("clip0.srt"), "it").await;
    harness.store.cancel_pending(cancelled.id).await.unwrap();

    let dispatcher = JobDispatcher::new(harness.job.clone(), config(2, 0));
    let reports = dispatcher.run_pending().await.unwrap();

    assert_eq!(reports.len(), 5);
    assert!(reports.iter().all(|r| r.outcome == DispatchOutcome::Finished(TranslationStatus::Completed)));
    assert!(tracker.peak.load(Ordering::SeqCst) <= 2);
    for i in 0..5 {
        assert!(temp_dir.path().join(format!("clip{}.es.srt", i)).exists());
    }
    assert_eq!(
        harness.store.list_requests(Some(TranslationStatus::Completed)).await.unwrap().len(),
        5
    );
}

#[tokio::test]
async fn test_cancelAll_shouldStopEveryRunningRequest() {
    let temp_dir = TempDir::new().unwrap();
    let provider = MockProvider::hanging();
    let harness = JobHarness::new(Arc::new(provider.clone()));
    let mut requests = Vec::new();
    for i in 0..3 {
        let source = create_test_file(temp_dir.path(), &format!("clip{}.srt", i), SINGLE_LINE_SRT).unwrap();
        requests.push(harness.enqueue(&source, "fr").await);
    }

    let dispatcher = JobDispatcher::new(harness.job.clone(), config(3, 5));
    let handles: Vec<_> = requests.into_iter().map(|r| dispatcher.dispatch(r)).collect();
    while provider.request_count() < 3 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    dispatcher.cancel_all();

    for handle in handles {
        let report = handle.await.unwrap();
        assert_eq!(report.outcome, DispatchOutcome::Finished(TranslationStatus::Cancelled));
    }
    assert_eq!(harness.store.active_count(), 0);
}
