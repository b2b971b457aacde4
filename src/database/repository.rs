/*!
 * Repository layer for database operations.
 *
 * This module provides a high-level API for all database operations,
 * abstracting away the SQL details and providing type-safe access.
 */

use anyhow::Result;
use log::{debug, info};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use std::collections::HashMap;
use std::time::Duration;

use super::connection::DatabaseConnection;
use super::models::{NewTranslationRequest, TranslationRequest, TranslationStatus};

const REQUEST_COLUMNS: &str = "id, title, subtitle_to_translate, source_language, target_language, \
     status, job_id, created_at, updated_at, completed_at";

/// Repository for database operations
#[derive(Clone)]
pub struct Repository {
    /// Database connection
    db: DatabaseConnection,
}

impl Repository {
    /// Create a new repository with the given database connection
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Create a repository with the default database location
    pub fn new_default() -> Result<Self> {
        let db = DatabaseConnection::open_default()?;
        Ok(Self::new(db))
    }

    /// Create a repository with an in-memory database (for testing)
    pub fn new_in_memory() -> Result<Self> {
        let db = DatabaseConnection::open_in_memory()?;
        Ok(Self::new(db))
    }

    // =========================================================================
    // Translation Request Operations
    // =========================================================================

    /// Insert a new pending request and return the stored row
    pub async fn create_request(&self, request: &NewTranslationRequest) -> Result<TranslationRequest> {
        let request = request.clone();
        let now = chrono::Utc::now().to_rfc3339();

        self.db
            .transaction(move |tx| {
                tx.execute(
                    r#"
                    INSERT INTO translation_requests (
                        title, subtitle_to_translate, source_language, target_language,
                        status, created_at, updated_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
                    "#,
                    params![
                        request.title,
                        request.subtitle_to_translate,
                        request.source_language,
                        request.target_language,
                        TranslationStatus::Pending.as_str(),
                        now,
                    ],
                )?;
                let id = tx.last_insert_rowid();
                debug!("Inserted translation request {}", id);

                Self::get_request_sync(tx, id)?
                    .ok_or_else(|| anyhow::anyhow!("Inserted request {} vanished", id))
            }, |_| {})
            .await
    }

    /// Get a request by ID
    pub async fn get_request(&self, id: i64) -> Result<Option<TranslationRequest>> {
        self.db
            .read(move |conn| Self::get_request_sync(conn, id))
            .await
    }

    /// List requests, oldest first, with an optional status filter
    pub async fn list_requests(
        &self,
        status_filter: Option<TranslationStatus>,
    ) -> Result<Vec<TranslationRequest>> {
        self.db
            .read(move |conn| {
                let requests = match status_filter {
                    Some(status) => {
                        let mut stmt = conn.prepare(&format!(
                            "SELECT {} FROM translation_requests WHERE status = ?1 ORDER BY id",
                            REQUEST_COLUMNS
                        ))?;
                        stmt.query_map([status.as_str()], Self::map_request)?
                            .collect::<rusqlite::Result<Vec<_>>>()?
                    }
                    None => {
                        let mut stmt = conn.prepare(&format!(
                            "SELECT {} FROM translation_requests ORDER BY id",
                            REQUEST_COLUMNS
                        ))?;
                        stmt.query_map([], Self::map_request)?
                            .collect::<rusqlite::Result<Vec<_>>>()?
                    }
                };
                Ok(requests)
            })
            .await
    }

    /// Count requests in the given status
    pub async fn count_by_status(&self, status: TranslationStatus) -> Result<i64> {
        self.db
            .read(move |conn| Self::count_by_status_sync(conn, status))
            .await
    }

    /// Move rows left `in_progress` by a previous process back to `pending`
    pub async fn requeue_in_progress(&self) -> Result<usize> {
        let now = chrono::Utc::now().to_rfc3339();

        self.db
            .transaction(move |tx| {
                let updated = tx.execute(
                    "UPDATE translation_requests SET status = ?1, job_id = NULL, updated_at = ?2 WHERE status = ?3",
                    params![
                        TranslationStatus::Pending.as_str(),
                        now,
                        TranslationStatus::InProgress.as_str()
                    ],
                )?;
                Ok(updated)
            }, |_| {})
            .await
    }

    /// Run `f` in a single transaction, then `on_commit` with its result.
    ///
    /// State derived from the committed rows in `on_commit` cannot
    /// interleave with another writer.
    pub async fn run_transaction<F, C, T>(&self, f: F, on_commit: C) -> Result<T>
    where
        F: FnOnce(&Transaction) -> Result<T> + Send + 'static,
        C: FnOnce(&T) + Send + 'static,
        T: Send + 'static,
    {
        self.db.transaction(f, on_commit).await
    }

    // =========================================================================
    // Runner Lease
    // =========================================================================

    /// Take the runner lease for `owner` unless another owner renewed it
    /// within `ttl`. Returns the live holder when the lease is taken.
    pub async fn acquire_runner_lease(&self, owner: &str, ttl: Duration) -> Result<Option<String>> {
        let owner = owner.to_string();
        let now = chrono::Utc::now().timestamp_millis();
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);

        self.db
            .transaction(move |tx| {
                let holder: Option<(String, i64)> = tx
                    .query_row("SELECT owner, heartbeat_ms FROM runner_lease WHERE id = 1", [], |row| {
                        Ok((row.get(0)?, row.get(1)?))
                    })
                    .optional()?;

                if let Some((holder, heartbeat_ms)) = holder {
                    if holder != owner && now.saturating_sub(heartbeat_ms) < ttl_ms {
                        return Ok(Some(holder));
                    }
                    if holder != owner {
                        info!("Taking over stale runner lease from {}", holder);
                    }
                }

                tx.execute(
                    r#"
                    INSERT INTO runner_lease (id, owner, heartbeat_ms) VALUES (1, ?1, ?2)
                    ON CONFLICT(id) DO UPDATE SET owner = excluded.owner, heartbeat_ms = excluded.heartbeat_ms
                    "#,
                    params![owner, now],
                )?;
                Ok(None)
            }, |_| {})
            .await
    }

    /// Refresh the heartbeat; `false` when `owner` no longer holds the lease
    pub async fn renew_runner_lease(&self, owner: &str) -> Result<bool> {
        let owner = owner.to_string();
        let now = chrono::Utc::now().timestamp_millis();

        self.db
            .transaction(move |tx| {
                let updated = tx.execute(
                    "UPDATE runner_lease SET heartbeat_ms = ?1 WHERE id = 1 AND owner = ?2",
                    params![now, owner],
                )?;
                Ok(updated == 1)
            }, |_| {})
            .await
    }

    pub async fn release_runner_lease(&self, owner: &str) -> Result<()> {
        let owner = owner.to_string();

        self.db
            .transaction(move |tx| {
                tx.execute("DELETE FROM runner_lease WHERE id = 1 AND owner = ?1", [owner])?;
                Ok(())
            }, |_| {})
            .await
    }

    /// Get a request by ID (synchronous version for use within transactions)
    pub fn get_request_sync(conn: &Connection, id: i64) -> Result<Option<TranslationRequest>> {
        let result = conn
            .query_row(
                &format!("SELECT {} FROM translation_requests WHERE id = ?1", REQUEST_COLUMNS),
                [id],
                Self::map_request,
            )
            .optional()?;

        Ok(result)
    }

    /// Write a new status (synchronous version for use within transactions)
    pub fn write_status_sync(
        conn: &Connection,
        id: i64,
        status: TranslationStatus,
        job_id: Option<&str>,
        completed_at: Option<&str>,
    ) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        conn.execute(
            r#"
            UPDATE translation_requests
            SET status = ?1, job_id = ?2, completed_at = ?3, updated_at = ?4
            WHERE id = ?5
            "#,
            params![status.as_str(), job_id, completed_at, now, id],
        )?;
        Ok(())
    }

    /// Count requests in a status (synchronous version for use within transactions)
    pub fn count_by_status_sync(conn: &Connection, status: TranslationStatus) -> Result<i64> {
        let count = conn.query_row(
            "SELECT COUNT(*) FROM translation_requests WHERE status = ?1",
            [status.as_str()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn map_request(row: &Row<'_>) -> rusqlite::Result<TranslationRequest> {
        let status: String = row.get(5)?;
        Ok(TranslationRequest {
            id: row.get(0)?,
            title: row.get(1)?,
            subtitle_to_translate: row.get(2)?,
            source_language: row.get(3)?,
            target_language: row.get(4)?,
            status: status.parse().map_err(|e: anyhow::Error| {
                rusqlite::Error::FromSqlConversionFailure(
                    5,
                    rusqlite::types::Type::Text,
                    e.into(),
                )
            })?,
            job_id: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
            completed_at: row.get(9)?,
        })
    }

    // =========================================================================
    // Settings Operations
    // =========================================================================

    /// Get a single setting value
    pub async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();

        self.db
            .read(move |conn| {
                let value = conn
                    .query_row("SELECT value FROM settings WHERE key = ?1", [key], |row| {
                        row.get(0)
                    })
                    .optional()?;
                Ok(value)
            })
            .await
    }

    /// Get several settings at once; absent keys are omitted from the map
    pub async fn get_settings(&self, keys: &[&str]) -> Result<HashMap<String, String>> {
        let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();

        self.db
            .read(move |conn| {
                let mut stmt = conn.prepare("SELECT value FROM settings WHERE key = ?1")?;
                let mut values = HashMap::new();
                for key in keys {
                    let value: Option<String> =
                        stmt.query_row([&key], |row| row.get(0)).optional()?;
                    if let Some(value) = value {
                        values.insert(key, value);
                    }
                }
                Ok(values)
            })
            .await
    }

    /// Insert or replace a setting value
    pub async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let key = key.to_string();
        let value = value.to_string();
        let now = chrono::Utc::now().to_rfc3339();

        self.db
            .transaction(move |tx| {
                tx.execute(
                    r#"
                    INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)
                    ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
                    "#,
                    params![key, value, now],
                )?;
                Ok(())
            }, |_| {})
            .await
    }
}
