use anyhow::{Context, Result};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::app_config::Config;
use crate::database::models::{NewTranslationRequest, TranslationRequest, TranslationStatus};
use crate::database::{DatabaseConnection, Repository};
use crate::errors::{AppError, StoreError};
use crate::jobs::{DispatchOutcome, DispatchReport, JobDispatcher, TranslationJob};
use crate::language_utils;
use crate::notifications::{LogNotifier, Notifier, WebhookNotifier};
use crate::progress::{BroadcastProgress, ProgressEvent};
use crate::providers::HttpTransport;
use crate::providers::factory::ProviderFactory;
use crate::request_store::RequestStore;
use crate::settings::{SettingsStore, SqliteSettings, keys, parse_language_list};
use crate::subtitle_processor::SrtSubtitles;

// @module: Application controller wiring the store, providers and dispatcher

/// Main application controller for translation requests
pub struct Controller {
    // @field: App configuration
    config: Config,
    store: RequestStore,
    settings: Arc<SqliteSettings>,
    progress: BroadcastProgress,
    dispatcher: JobDispatcher,
}

impl Controller {
    // @method: Create a new controller with the given configuration
    pub fn with_config(config: Config) -> Result<Self> {
        let repo = match &config.database_path {
            Some(path) => Repository::new(DatabaseConnection::open(path)?),
            None => Repository::new_default()?,
        };
        Self::with_repository(config, repo)
    }

    /// Build a controller over an already opened repository
    pub fn with_repository(config: Config, repo: Repository) -> Result<Self> {
        config.validate().context("Configuration validation failed")?;

        let store = RequestStore::new(repo.clone());
        let settings = Arc::new(SqliteSettings::new(repo));
        let transport = HttpTransport::new(config.provider_timeout(), config.retry.policy())?;
        let providers = Arc::new(ProviderFactory::new(
            Arc::clone(&settings) as Arc<dyn SettingsStore>,
            transport,
        ));
        let notifier: Arc<dyn Notifier> = match &config.notifications.webhook_url {
            Some(url) => Arc::new(WebhookNotifier::new(url.clone())),
            None => Arc::new(LogNotifier),
        };
        let progress = BroadcastProgress::default();

        let job = Arc::new(TranslationJob::new(
            store.clone(),
            providers,
            Arc::new(SrtSubtitles),
            Arc::new(progress.clone()),
            notifier,
        ));
        let dispatcher = JobDispatcher::new(job, config.dispatcher.dispatcher_config());

        Ok(Self {
            config,
            store,
            settings,
            progress,
            dispatcher,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &RequestStore {
        &self.store
    }

    pub fn dispatcher(&self) -> &JobDispatcher {
        &self.dispatcher
    }

    /// Queue a request; the source language must be one of the configured
    /// `source_languages` when that setting is present
    pub async fn enqueue(&self, request: NewTranslationRequest) -> Result<TranslationRequest, AppError> {
        if let Some(raw) = self.settings.get_setting(keys::SOURCE_LANGUAGES).await? {
            let allowed = parse_language_list(&raw);
            let source = language_utils::normalize_to_part1_or_part2t(&request.source_language)
                .unwrap_or_else(|_| request.source_language.trim().to_lowercase());
            if !allowed.is_empty() && !allowed.contains(&source) {
                return Err(StoreError::InvalidRequest(format!(
                    "source language '{}' is not in {} ({})",
                    request.source_language,
                    keys::SOURCE_LANGUAGES,
                    allowed.join(", ")
                ))
                .into());
            }
        }
        Ok(self.store.create_request(&request).await?)
    }

    pub async fn list(&self, status: Option<TranslationStatus>) -> Result<Vec<TranslationRequest>, AppError> {
        Ok(self.store.list_requests(status).await?)
    }

    /// Cancel a queued request
    pub async fn cancel(&self, request_id: i64) -> Result<TranslationRequest, AppError> {
        Ok(self.store.cancel_pending(request_id).await?)
    }

    pub async fn get_setting(&self, key: &str) -> Result<Option<String>, AppError> {
        Ok(self.settings.get_setting(key).await?)
    }

    pub async fn set_setting(&self, key: &str, value: &str) -> Result<(), AppError> {
        Ok(self.settings.set_setting(key, value).await?)
    }

    /// Recover interrupted requests, then translate everything pending.
    ///
    /// Only one process runs the queue of a database at a time. It holds the
    /// runner lease and refreshes it while dispatching; a second process is
    /// refused until the lease is released or goes stale.
    pub async fn run_pending(&self, show_progress: bool) -> Result<Vec<DispatchReport>> {
        let runner_id = Uuid::new_v4().to_string();
        let lease = self.config.dispatcher.runner_lease();
        self.store.claim_runner(&runner_id, lease).await?;
        info!("Acting as queue runner {}", runner_id);

        let heartbeat = self.spawn_heartbeat(runner_id.clone(), lease / 3);
        let result = self.dispatch_pending(show_progress).await;
        heartbeat.abort();

        if let Err(e) = self.store.release_runner(&runner_id).await {
            warn!("Failed to release runner lease {}: {}", runner_id, e);
        }
        result
    }

    /// Renew the lease every `every`; cancel running work once it is lost
    fn spawn_heartbeat(&self, owner: String, every: Duration) -> JoinHandle<()> {
        let store = self.store.clone();
        let dispatcher = self.dispatcher.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match store.renew_runner(&owner).await {
                    Ok(()) => {}
                    Err(StoreError::RunnerActive { .. }) => {
                        error!("Runner lease {} was taken over, cancelling running translations", owner);
                        dispatcher.cancel_all();
                        break;
                    }
                    Err(e) => warn!("Failed to renew runner lease {}: {}", owner, e),
                }
            }
        })
    }

    async fn dispatch_pending(&self, show_progress: bool) -> Result<Vec<DispatchReport>> {
        self.store.requeue_interrupted().await?;

        let renderer = show_progress.then(|| spawn_progress_renderer(self.progress.subscribe()));
        let dispatcher = self.dispatcher.clone();
        let interrupt = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling running translations");
                dispatcher.cancel_all();
            }
        });

        let reports = self.dispatcher.run_pending().await;
        interrupt.abort();
        if let Some(renderer) = renderer {
            renderer.abort();
        }
        let reports = reports?;

        let failed = reports
            .iter()
            .filter(|r| !matches!(r.outcome, DispatchOutcome::Finished(_)))
            .count();
        if failed > 0 {
            warn!("{} of {} request(s) failed", failed, reports.len());
        } else {
            info!("Processed {} request(s)", reports.len());
        }
        Ok(reports)
    }
}

/// Render progress events as one bar per request
fn spawn_progress_renderer(mut events: broadcast::Receiver<ProgressEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let multi_progress = MultiProgress::new();
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}")
            .or_else(|_| ProgressStyle::default_bar().template("{spinner} [{elapsed_precise}] [{bar:40}] {pos}% {msg}"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        let mut bars: HashMap<i64, ProgressBar> = HashMap::new();

        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Progress display skipped {} update(s)", skipped);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };

            let bar = bars.entry(event.request_id).or_insert_with(|| {
                let bar = multi_progress.add(ProgressBar::new(100));
                bar.set_style(style.clone());
                bar.set_message(event.title.clone());
                bar
            });
            bar.set_position(u64::from(event.progress));

            if event.completed {
                bar.finish_with_message(format!("{} done", event.title));
            } else if !event.success {
                bar.abandon_with_message(format!("{} cancelled", event.title));
            }
        }
    })
}
