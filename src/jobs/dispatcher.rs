use futures::future::join_all;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{DEFAULT_MAX_RETRIES, JobContext, TranslationJob};
use crate::database::models::{TranslationRequest, TranslationStatus};
use crate::errors::{ErrorKind, StoreError};
use crate::request_store::RequestStore;

/// Scheduling knobs for the dispatcher
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Requests translated at the same time
    pub concurrency: usize,
    /// Re-invocations after the first attempt
    pub max_job_retries: u32,
    /// Delay before the first re-invocation, grows linearly
    pub retry_delay: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            concurrency: 2,
            max_job_retries: DEFAULT_MAX_RETRIES,
            retry_delay: Duration::from_secs(10),
        }
    }
}

/// Final result of dispatching one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The last attempt returned normally; the status as stored afterwards
    Finished(TranslationStatus),
    /// Every attempt failed
    Failed { kind: ErrorKind, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub request_id: i64,
    pub attempts: u32,
    pub outcome: DispatchOutcome,
}

/// In-process at-least-once dispatcher for translation jobs
#[derive(Clone)]
pub struct JobDispatcher {
    job: Arc<TranslationJob>,
    config: DispatcherConfig,
    slots: Arc<Semaphore>,
    tokens: Arc<Mutex<HashMap<i64, CancellationToken>>>,
}

impl JobDispatcher {
    pub fn new(job: Arc<TranslationJob>, config: DispatcherConfig) -> Self {
        let slots = Arc::new(Semaphore::new(config.concurrency.max(1)));
        Self {
            job,
            config,
            slots,
            tokens: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn store(&self) -> &RequestStore {
        self.job.store()
    }

    /// Schedule `request`; the handle resolves once its last attempt ends
    pub fn dispatch(&self, request: TranslationRequest) -> JoinHandle<DispatchReport> {
        let token = CancellationToken::new();
        self.tokens.lock().insert(request.id, token.clone());

        let dispatcher = self.clone();
        tokio::spawn(async move {
            let request_id = request.id;
            let report = dispatcher.run_attempts(request, token).await;
            dispatcher.tokens.lock().remove(&request_id);
            report
        })
    }

    /// Dispatch every request and wait for all of them
    pub async fn run_all(&self, requests: Vec<TranslationRequest>) -> Vec<DispatchReport> {
        let ids: Vec<i64> = requests.iter().map(|r| r.id).collect();
        let handles: Vec<_> = requests.into_iter().map(|r| self.dispatch(r)).collect();

        join_all(handles)
            .await
            .into_iter()
            .zip(ids)
            .map(|(joined, request_id)| {
                joined.unwrap_or_else(|e| {
                    error!("Dispatch task for request {} aborted: {}", request_id, e);
                    DispatchReport {
                        request_id,
                        attempts: 0,
                        outcome: DispatchOutcome::Failed {
                            kind: ErrorKind::Persistence,
                            message: e.to_string(),
                        },
                    }
                })
            })
            .collect()
    }

    /// Dispatch every pending request and wait for all of them
    pub async fn run_pending(&self) -> Result<Vec<DispatchReport>, StoreError> {
        let pending = self.store().list_requests(Some(TranslationStatus::Pending)).await?;
        info!("Dispatching {} pending translation request(s)", pending.len());
        Ok(self.run_all(pending).await)
    }

    /// Signal cancellation to a dispatched request; false if it is not running here
    pub fn cancel(&self, request_id: i64) -> bool {
        match self.tokens.lock().get(&request_id) {
            Some(token) => {
                info!("Cancelling translation request {}", request_id);
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel everything currently dispatched
    pub fn cancel_all(&self) {
        for token in self.tokens.lock().values() {
            token.cancel();
        }
    }

    async fn run_attempts(&self, request: TranslationRequest, token: CancellationToken) -> DispatchReport {
        let job_id = Uuid::new_v4().to_string();
        let max_retries = self.config.max_job_retries;
        let mut retry_count = 0;

        loop {
            let ctx = JobContext::new(job_id.clone(), retry_count, max_retries);
            let result = {
                let _permit = match self.slots.acquire().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        return self.report(&request, retry_count, DispatchOutcome::Failed {
                            kind: ErrorKind::Persistence,
                            message: e.to_string(),
                        });
                    }
                };
                self.job.execute(&ctx, request.clone(), token.clone()).await
            };

            match result {
                Ok(()) => {
                    let status = match self.store().get_request(request.id).await {
                        Ok(stored) => stored.status,
                        Err(e) => {
                            warn!("Could not reload request {}: {}", request.id, e);
                            request.status
                        }
                    };
                    return self.report(&request, retry_count + 1, DispatchOutcome::Finished(status));
                }
                Err(e) if ctx.is_final_attempt() => {
                    return self.report(&request, retry_count + 1, DispatchOutcome::Failed {
                        kind: e.kind(),
                        message: e.to_string(),
                    });
                }
                Err(e) => {
                    retry_count += 1;
                    let delay = self.config.retry_delay.saturating_mul(retry_count);
                    warn!(
                        "Attempt {} for request {} failed ({:?}), retrying in {:?}",
                        retry_count, request.id, e.kind(), delay
                    );
                    // A cancelled request still gets its next attempt, which records the cancellation
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = token.cancelled() => debug!("Retry delay for request {} cut short", request.id),
                    }
                }
            }
        }
    }

    fn report(&self, request: &TranslationRequest, attempts: u32, outcome: DispatchOutcome) -> DispatchReport {
        info!("Request {} finished after {} attempt(s): {:?}", request.id, attempts, outcome);
        DispatchReport {
            request_id: request.id,
            attempts,
            outcome,
        }
    }
}
