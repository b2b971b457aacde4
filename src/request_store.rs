/*!
 * Translation request store.
 *
 * Owns the persisted lifecycle of every translation request and the
 * process-wide count of requests currently in progress. Each status change
 * is checked against the lifecycle, written in a single transaction, and
 * reflected in the gauge before the connection lock is released.
 */

use log::{debug, info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use crate::database::Repository;
use crate::database::models::{NewTranslationRequest, TranslationRequest, TranslationStatus};
use crate::errors::StoreError;
use crate::language_utils;

/// What a requested status change amounts to for a stored row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Write the new status and move the gauge by `gauge_delta`
    Apply { gauge_delta: i64 },
    /// Already in the requested terminal state
    Unchanged,
    /// Not allowed by the lifecycle
    Reject,
}

impl Transition {
    /// Classify `from -> to`
    pub fn between(from: TranslationStatus, to: TranslationStatus) -> Self {
        use TranslationStatus::*;
        match (from, to) {
            (Pending, InProgress) => Self::Apply { gauge_delta: 1 },
            (InProgress, InProgress) => Self::Apply { gauge_delta: 0 },
            (InProgress, Completed | Cancelled | Failed) => Self::Apply { gauge_delta: -1 },
            (Pending, Cancelled) => Self::Apply { gauge_delta: 0 },
            (from, to) if from == to && from.is_terminal() => Self::Unchanged,
            _ => Self::Reject,
        }
    }
}

enum TxOutcome {
    Applied { row: TranslationRequest, gauge_delta: i64 },
    Unchanged(TranslationRequest),
    Rejected(TranslationStatus),
    Missing,
}

/// Persisted request lifecycle plus the active-translation gauge
#[derive(Clone)]
pub struct RequestStore {
    repo: Repository,
    active: Arc<AtomicI64>,
}

impl RequestStore {
    pub fn new(repo: Repository) -> Self {
        Self {
            repo,
            active: Arc::new(AtomicI64::new(0)),
        }
    }

    /// Store over a fresh in-memory database (for testing)
    pub fn new_in_memory() -> Result<Self, StoreError> {
        Ok(Self::new(Repository::new_in_memory()?))
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    /// Queue a new request
    pub async fn create_request(
        &self,
        request: &NewTranslationRequest,
    ) -> Result<TranslationRequest, StoreError> {
        if request.subtitle_to_translate.trim().is_empty() {
            return Err(StoreError::InvalidRequest("subtitle path is empty".to_string()));
        }
        for code in [&request.source_language, &request.target_language] {
            if !language_utils::is_language_code(code) {
                return Err(StoreError::InvalidRequest(format!(
                    "'{}' is not an ISO 639 language code",
                    code
                )));
            }
        }

        let created = self.repo.create_request(request).await?;
        info!(
            "Queued translation request {} for '{}' ({} -> {})",
            created.id, created.title, created.source_language, created.target_language
        );
        Ok(created)
    }

    pub async fn get_request(&self, id: i64) -> Result<TranslationRequest, StoreError> {
        self.repo.get_request(id).await?.ok_or(StoreError::NotFound(id))
    }

    pub async fn list_requests(
        &self,
        status: Option<TranslationStatus>,
    ) -> Result<Vec<TranslationRequest>, StoreError> {
        Ok(self.repo.list_requests(status).await?)
    }

    /// Apply a lifecycle transition and return the stored row.
    ///
    /// `job_id` rebinds the dispatcher job when given; `None` keeps the
    /// currently bound one. Repeating a terminal status is a no-op that
    /// returns the row as stored.
    pub async fn update_status(
        &self,
        request: &TranslationRequest,
        job_id: Option<&str>,
        status: TranslationStatus,
    ) -> Result<TranslationRequest, StoreError> {
        self.transition(request.id, job_id, status, None).await
    }

    /// Cancel a request no worker has started yet.
    ///
    /// The pending check and the write share one transaction, so a worker
    /// claiming the row concurrently makes this fail instead.
    pub async fn cancel_pending(&self, id: i64) -> Result<TranslationRequest, StoreError> {
        self.transition(id, None, TranslationStatus::Cancelled, Some(TranslationStatus::Pending))
            .await
    }

    /// `expected` rejects the change unless the stored row is in that status
    async fn transition(
        &self,
        id: i64,
        job_id: Option<&str>,
        status: TranslationStatus,
        expected: Option<TranslationStatus>,
    ) -> Result<TranslationRequest, StoreError> {
        let job_id = job_id.map(str::to_string);
        let active = Arc::clone(&self.active);

        let outcome = self
            .repo
            .run_transaction(
                move |tx| {
                    let Some(current) = Repository::get_request_sync(tx, id)? else {
                        return Ok(TxOutcome::Missing);
                    };
                    if expected.is_some_and(|expected| expected != current.status) {
                        return Ok(TxOutcome::Rejected(current.status));
                    }

                    let gauge_delta = match Transition::between(current.status, status) {
                        Transition::Apply { gauge_delta } => gauge_delta,
                        Transition::Unchanged => return Ok(TxOutcome::Unchanged(current)),
                        Transition::Reject => return Ok(TxOutcome::Rejected(current.status)),
                    };

                    let bound_job = job_id.or(current.job_id);
                    let completed_at = status
                        .is_terminal()
                        .then(|| chrono::Utc::now().to_rfc3339());
                    Repository::write_status_sync(
                        tx,
                        id,
                        status,
                        bound_job.as_deref(),
                        completed_at.as_deref(),
                    )?;

                    let row = Repository::get_request_sync(tx, id)?
                        .ok_or_else(|| anyhow::anyhow!("Request {} vanished mid-transaction", id))?;
                    Ok(TxOutcome::Applied { row, gauge_delta })
                },
                move |outcome| {
                    if let TxOutcome::Applied { gauge_delta, .. } = outcome {
                        active.fetch_add(*gauge_delta, Ordering::SeqCst);
                    }
                },
            )
            .await?;

        match outcome {
            TxOutcome::Applied { row, .. } => {
                debug!("Request {} is now {}", row.id, row.status);
                Ok(row)
            }
            TxOutcome::Unchanged(row) => {
                debug!("Request {} already {}, nothing to do", row.id, row.status);
                Ok(row)
            }
            TxOutcome::Rejected(from) => Err(StoreError::InvalidTransition { id, from, to: status }),
            TxOutcome::Missing => Err(StoreError::NotFound(id)),
        }
    }

    /// Become the only process allowed to dispatch requests
    pub async fn claim_runner(&self, owner: &str, ttl: Duration) -> Result<(), StoreError> {
        match self.repo.acquire_runner_lease(owner, ttl).await? {
            None => {
                debug!("Runner lease held by {}", owner);
                Ok(())
            }
            Some(holder) => Err(StoreError::RunnerActive { owner: holder }),
        }
    }

    /// Keep the runner lease alive; fails once another process took it over
    pub async fn renew_runner(&self, owner: &str) -> Result<(), StoreError> {
        if self.repo.renew_runner_lease(owner).await? {
            Ok(())
        } else {
            Err(StoreError::RunnerActive { owner: "another process".to_string() })
        }
    }

    pub async fn release_runner(&self, owner: &str) -> Result<(), StoreError> {
        Ok(self.repo.release_runner_lease(owner).await?)
    }

    /// Move requests a previous process left in progress back to pending.
    ///
    /// Call only while holding the runner lease and before dispatching:
    /// rows in progress then belong to a runner that is gone.
    pub async fn requeue_interrupted(&self) -> Result<usize, StoreError> {
        let requeued = self.repo.requeue_in_progress().await?;
        if requeued > 0 {
            warn!("Requeued {} interrupted translation request(s)", requeued);
        }
        self.update_active_count().await?;
        Ok(requeued)
    }

    /// Recompute the gauge from persisted rows
    pub async fn update_active_count(&self) -> Result<i64, StoreError> {
        let active = Arc::clone(&self.active);
        let count = self
            .repo
            .run_transaction(
                |tx| Repository::count_by_status_sync(tx, TranslationStatus::InProgress),
                move |count| active.store(*count, Ordering::SeqCst),
            )
            .await?;
        Ok(count)
    }

    /// Requests currently in progress in this process
    pub fn active_count(&self) -> i64 {
        self.active.load(Ordering::SeqCst)
    }
}
