use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::JobContext;
use crate::database::models::{TranslationRequest, TranslationStatus};
use crate::errors::{JobError, StoreError, SubtitleError};
use crate::notifications::{Notifier, Severity};
use crate::progress::ProgressEmitter;
use crate::providers::factory::ProviderFactory;
use crate::providers::{TranslationOutcome, TranslationProvider};
use crate::request_store::RequestStore;
use crate::subtitle_processor::{SubtitleEntry, SubtitleIo};

/// How a single attempt ended when it did not fail
#[derive(Debug)]
enum RunOutcome {
    Completed(PathBuf),
    Cancelled,
}

/// Translates one request end to end, once per dispatcher attempt
///
/// The job never retries on its own: a failed attempt is reported back to
/// the dispatcher, and only the final attempt marks the request `Failed`.
pub struct TranslationJob {
    store: RequestStore,
    providers: Arc<ProviderFactory>,
    subtitles: Arc<dyn SubtitleIo>,
    progress: Arc<dyn ProgressEmitter>,
    notifier: Arc<dyn Notifier>,
}

impl TranslationJob {
    pub fn new(
        store: RequestStore,
        providers: Arc<ProviderFactory>,
        subtitles: Arc<dyn SubtitleIo>,
        progress: Arc<dyn ProgressEmitter>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            providers,
            subtitles,
            progress,
            notifier,
        }
    }

    pub fn store(&self) -> &RequestStore {
        &self.store
    }

    /// Run one attempt for `request`
    pub async fn execute(
        &self,
        ctx: &JobContext,
        request: TranslationRequest,
        cancel: CancellationToken,
    ) -> Result<(), JobError> {
        let request = match self
            .store
            .update_status(&request, Some(&ctx.job_id), TranslationStatus::InProgress)
            .await
        {
            Ok(request) => request,
            Err(StoreError::InvalidTransition { from, .. }) if from.is_terminal() => {
                info!(
                    "Translation request {} is already {}, skipping duplicate delivery",
                    request.id, from
                );
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        info!(
            "Translation job {} started for '{}' (attempt {}/{}): {}",
            ctx.job_id,
            request.title,
            ctx.retry_count + 1,
            ctx.max_retries + 1,
            request.subtitle_to_translate
        );

        match self.run(&request, &cancel).await {
            Ok(RunOutcome::Completed(output_path)) => {
                self.store
                    .update_status(&request, None, TranslationStatus::Completed)
                    .await?;
                info!("Translation job completed and created subtitle: {}", output_path.display());
                self.progress.emit(&request, 100, true);
                self.notifier
                    .notify(
                        &format!("Translation of '{}' completed: {}", request.title, output_path.display()),
                        Severity::Info,
                    )
                    .await;
                Ok(())
            }
            Ok(RunOutcome::Cancelled) => {
                info!("Translation cancelled for subtitle: {}", request.subtitle_to_translate);
                self.store
                    .update_status(&request, None, TranslationStatus::Cancelled)
                    .await?;
                self.progress.emit(&request, 0, false);
                Ok(())
            }
            Err(e) => {
                error!(
                    "An error occurred during the translation job for request {} ({}): {}",
                    request.id, request.subtitle_to_translate, e
                );
                if ctx.is_final_attempt() {
                    self.mark_failed(&request, &e).await;
                } else {
                    warn!(
                        "Request {} stays in progress, {} attempt(s) left",
                        request.id,
                        ctx.max_retries - ctx.retry_count
                    );
                }
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        request: &TranslationRequest,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, JobError> {
        if cancel.is_cancelled() {
            return Ok(RunOutcome::Cancelled);
        }

        let source = Path::new(&request.subtitle_to_translate);
        let output_path = self.subtitles.create_file_path(source, &request.target_language);
        if output_path == source {
            return Err(SubtitleError::OutputCollision {
                path: output_path.display().to_string(),
            }
            .into());
        }

        let provider = self.providers.resolve_provider().await?;
        let entries = self.subtitles.read_subtitles(source).await?;

        let Some(translated) = self.translate_entries(request, provider.as_ref(), entries, cancel).await?
        else {
            return Ok(RunOutcome::Cancelled);
        };

        if cancel.is_cancelled() {
            return Ok(RunOutcome::Cancelled);
        }

        self.subtitles.write_subtitles(&output_path, &translated).await?;
        Ok(RunOutcome::Completed(output_path))
    }

    /// Translate every line of every entry; `None` when cancelled midway
    async fn translate_entries(
        &self,
        request: &TranslationRequest,
        provider: &dyn TranslationProvider,
        entries: Vec<SubtitleEntry>,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<SubtitleEntry>>, JobError> {
        let total = entries.len();
        let mut translated = Vec::with_capacity(total);

        for (index, mut entry) in entries.into_iter().enumerate() {
            if cancel.is_cancelled() {
                return Ok(None);
            }

            let mut lines = Vec::with_capacity(entry.lines.len());
            for line in &entry.lines {
                let result = provider
                    .translate(line, &request.source_language, &request.target_language, cancel)
                    .await;
                match TranslationOutcome::from(result) {
                    TranslationOutcome::Success(text) => lines.push(text),
                    TranslationOutcome::Cancelled => return Ok(None),
                    TranslationOutcome::Transient(e) | TranslationOutcome::Fatal(e) => {
                        return Err(e.into());
                    }
                }
            }
            entry.lines = lines;
            translated.push(entry);

            // 100 is reserved for the completion event
            let percent = ((index + 1) * 100 / total).min(99) as u8;
            self.progress.emit(request, percent, true);
        }

        Ok(Some(translated))
    }

    async fn mark_failed(&self, request: &TranslationRequest, cause: &JobError) {
        if let Err(e) = self
            .store
            .update_status(request, None, TranslationStatus::Failed)
            .await
        {
            error!("Failed to mark request {} as failed: {}", request.id, e);
        }
        self.notifier
            .notify(
                &format!("Translation of '{}' failed: {}", request.title, cause),
                Severity::Warning,
            )
            .await;
    }
}
