/*!
 * End-to-end tests for a single translation attempt
 */

use std::fs;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use subrelay::database::models::TranslationStatus;
use subrelay::errors::ErrorKind;
use subrelay::jobs::JobContext;
use subrelay::notifications::Severity;
use subrelay::providers::mock::MockProvider;
use subrelay::subtitle_processor::SubtitleEntry;

use crate::common::{JobHarness, create_test_subtitle};

#[tokio::test]
async fn test_execute_shouldWriteTranslatedFileNextToSource() {
    let temp_dir = TempDir::new().unwrap();
    let source = create_test_subtitle(temp_dir.path(), "movie.srt").unwrap();
    let harness = JobHarness::new(Arc::new(MockProvider::working("[FR] ")));
    let request = harness.enqueue(&source, "fr").await;

    harness
        .job
        .execute(&JobContext::new("job-1", 0, 5), request.clone(), CancellationToken::new())
        .await
        .unwrap();

    let output = temp_dir.path().join("movie.fr.srt");
    let entries = subrelay::subtitle_processor::parse_srt_string(&fs::read_to_string(&output).unwrap()).unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].lines, vec!["[FR] This is a test subtitle."]);
    assert_eq!(entries[1].lines, vec!["[FR] It contains", "[FR] multiple lines."]);
    assert_eq!(entries[2].start_time_ms, 10_000);

    let stored = harness.store.get_request(request.id).await.unwrap();
    assert_eq!(stored.status, TranslationStatus::Completed);
    assert_eq!(stored.job_id.as_deref(), Some("job-1"));
    assert!(stored.completed_at.is_some());
    assert_eq!(harness.store.active_count(), 0);

    let events = harness.progress.events();
    assert!(events[..events.len() - 1].iter().all(|(_, percent, _)| *percent < 100));
    assert_eq!(harness.progress.last(), Some((request.id, 100, true)));

    let messages = harness.notifier.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].1, Severity::Info);
}

#[tokio::test]
async fn test_execute_whenCancelledMidway_shouldStopWithoutOutput() {
    let temp_dir = TempDir::new().unwrap();
    let source = create_test_subtitle(temp_dir.path(), "movie.srt").unwrap();
    let cancel = CancellationToken::new();
    let provider = MockProvider::working("[FR] ").cancel_after(1, cancel.clone());
    let harness = JobHarness::new(Arc::new(provider.clone()));
    let request = harness.enqueue(&source, "fr").await;

    harness
        .job
        .execute(&JobContext::new("job-1", 0, 5), request.clone(), cancel)
        .await
        .unwrap();

    assert_eq!(provider.request_count(), 1);
    assert!(!temp_dir.path().join("movie.fr.srt").exists());
    assert_eq!(
        harness.store.get_request(request.id).await.unwrap().status,
        TranslationStatus::Cancelled
    );
    assert_eq!(harness.progress.last(), Some((request.id, 0, false)));
    assert!(harness.notifier.messages().is_empty());
    assert_eq!(harness.store.active_count(), 0);
}

#[tokio::test]
async fn test_execute_whenCancelledAfterLastLine_shouldNotWriteOutput() {
    let temp_dir = TempDir::new().unwrap();
    let source = create_test_subtitle(temp_dir.path(), "movie.srt").unwrap();
    let cancel = CancellationToken::new();
    // The sample has four lines; cancellation lands after the last one
    let provider = MockProvider::working("[FR] ").cancel_after(4, cancel.clone());
    let harness = JobHarness::new(Arc::new(provider.clone()));
    let request = harness.enqueue(&source, "fr").await;

    harness
        .job
        .execute(&JobContext::new("job-1", 0, 5), request.clone(), cancel)
        .await
        .unwrap();

    assert_eq!(provider.request_count(), 4);
    assert!(!temp_dir.path().join("movie.fr.srt").exists());
    assert_eq!(
        harness.store.get_request(request.id).await.unwrap().status,
        TranslationStatus::Cancelled
    );
    assert_eq!(harness.progress.last(), Some((request.id, 0, false)));
    assert!(harness.notifier.messages().is_empty());
    assert_eq!(harness.store.active_count(), 0);
}

#[tokio::test]
async fn test_execute_whenTargetMatchesSourceMarker_shouldKeepSourceIntact() {
    let temp_dir = TempDir::new().unwrap();
    let source = create_test_subtitle(temp_dir.path(), "movie.fr.srt").unwrap();
    let provider = MockProvider::working("[FR] ");
    let harness = JobHarness::new(Arc::new(provider.clone()));
    let request = harness.enqueue(&source, "fr").await;

    let error = harness
        .job
        .execute(&JobContext::new("job-1", 0, 0), request.clone(), CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(error.kind(), ErrorKind::Subtitle);
    assert_eq!(provider.request_count(), 0);
    assert_eq!(fs::read_to_string(&source).unwrap(), crate::common::SAMPLE_SRT);
    assert_eq!(
        harness.store.get_request(request.id).await.unwrap().status,
        TranslationStatus::Failed
    );
}

#[tokio::test]
async fn test_execute_withFailureBeforeFinalAttempt_shouldStayInProgress() {
    let temp_dir = TempDir::new().unwrap();
    let source = create_test_subtitle(temp_dir.path(), "movie.srt").unwrap();
    let harness = JobHarness::new(Arc::new(MockProvider::failing()));
    let request = harness.enqueue(&source, "fr").await;

    let error = harness
        .job
        .execute(&JobContext::new("job-1", 1, 5), request.clone(), CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(error.kind(), ErrorKind::TransientProvider);
    let stored = harness.store.get_request(request.id).await.unwrap();
    assert_eq!(stored.status, TranslationStatus::InProgress);
    assert!(stored.completed_at.is_none());
    assert_eq!(harness.store.active_count(), 1);
    assert!(harness.notifier.messages().is_empty());
}

#[tokio::test]
async fn test_execute_withFailureOnFinalAttempt_shouldMarkFailedAndWarn() {
    let temp_dir = TempDir::new().unwrap();
    let source = create_test_subtitle(temp_dir.path(), "movie.srt").unwrap();
    let harness = JobHarness::new(Arc::new(MockProvider::failing()));
    let request = harness.enqueue(&source, "fr").await;

    // An earlier attempt left the request in progress under the same job
    let ctx = JobContext::new("job-1", 4, 5);
    assert!(harness.job.execute(&ctx, request.clone(), CancellationToken::new()).await.is_err());

    let ctx = JobContext::new("job-1", 5, 5);
    assert!(harness.job.execute(&ctx, request.clone(), CancellationToken::new()).await.is_err());

    let stored = harness.store.get_request(request.id).await.unwrap();
    assert_eq!(stored.status, TranslationStatus::Failed);
    assert!(stored.completed_at.is_some());
    assert_eq!(harness.store.active_count(), 0);

    let messages = harness.notifier.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].1, Severity::Warning);
    assert!(!temp_dir.path().join("movie.fr.srt").exists());
}

#[tokio::test]
async fn test_execute_onTerminalRequest_shouldBeNoOp() {
    let temp_dir = TempDir::new().unwrap();
    let source = create_test_subtitle(temp_dir.path(), "movie.srt").unwrap();
    let provider = MockProvider::working("[DE] ");
    let harness = JobHarness::new(Arc::new(provider.clone()));
    let request = harness.enqueue(&source, "de").await;

    let ctx = JobContext::new("job-1", 0, 5);
    harness.job.execute(&ctx, request.clone(), CancellationToken::new()).await.unwrap();
    let calls = provider.request_count();

    // Redelivery of the same attempt
    harness.job.execute(&ctx, request.clone(), CancellationToken::new()).await.unwrap();

    assert_eq!(provider.request_count(), calls);
    assert_eq!(harness.notifier.messages().len(), 1);
    assert_eq!(
        harness.store.get_request(request.id).await.unwrap().status,
        TranslationStatus::Completed
    );
}

#[tokio::test]
async fn test_execute_withMissingSubtitle_shouldBeSubtitleError() {
    let temp_dir = TempDir::new().unwrap();
    let harness = JobHarness::new(Arc::new(MockProvider::working("")));
    let request = harness.enqueue(&temp_dir.path().join("missing.srt"), "fr").await;

    let error = harness
        .job
        .execute(&JobContext::new("job-1", 0, 0), request.clone(), CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(error.kind(), ErrorKind::Subtitle);
    assert_eq!(
        harness.store.get_request(request.id).await.unwrap().status,
        TranslationStatus::Failed
    );
}

#[tokio::test]
async fn test_execute_withMisconfiguredProvider_shouldBeConfigurationError() {
    let temp_dir = TempDir::new().unwrap();
    let source = create_test_subtitle(temp_dir.path(), "movie.srt").unwrap();
    let harness = JobHarness::new(Arc::new(MockProvider::misconfigured()));
    let request = harness.enqueue(&source, "fr").await;

    let error = harness
        .job
        .execute(&JobContext::new("job-1", 0, 5), request, CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(error.kind(), ErrorKind::Configuration);
}

#[tokio::test]
async fn test_execute_withEmptyTranslation_shouldNotWriteOutput() {
    let temp_dir = TempDir::new().unwrap();
    let source = create_test_subtitle(temp_dir.path(), "movie.srt").unwrap();
    let harness = JobHarness::new(Arc::new(MockProvider::empty()));
    let request = harness.enqueue(&source, "fr").await;

    let error = harness
        .job
        .execute(&JobContext::new("job-1", 0, 5), request, CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(error.kind(), ErrorKind::NonRetryableProvider);
    assert!(!temp_dir.path().join("movie.fr.srt").exists());
}

#[test]
fn test_sampleSubtitle_shouldKeepMultiLineEntries() {
    let entries = subrelay::subtitle_processor::parse_srt_string(crate::common::SAMPLE_SRT).unwrap();
    assert_eq!(entries[1], SubtitleEntry::new(2, 5_000, 9_000, vec![
        "It contains".to_string(),
        "multiple lines.".to_string(),
    ]));
}
