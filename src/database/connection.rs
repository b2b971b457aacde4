/*!
 * Shared SQLite handle.
 *
 * Every statement runs on the blocking pool behind one connection lock.
 * Writes always go through [`DatabaseConnection::transaction`], which also
 * runs a commit hook before the lock is released.
 */

use anyhow::{Context, Result};
use log::{debug, info};
use parking_lot::Mutex;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use super::schema;

/// How long a statement waits on a lock held by another process
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Cloneable handle to the request database
#[derive(Clone)]
pub struct DatabaseConnection {
    path: PathBuf,
    conn: Arc<Mutex<Connection>>,
}

impl DatabaseConnection {
    /// Open `subrelay/subrelay.db` under the user's data directory
    pub fn open_default() -> Result<Self> {
        Self::open(Self::default_database_path()?)
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Cannot create {}", parent.display()))?;
        }

        info!("Using request database {}", path.display());
        let conn = Connection::open(&path).with_context(|| format!("Cannot open {}", path.display()))?;
        Self::from_connection(conn, path)
    }

    /// Private database for tests and dry runs
    pub fn open_in_memory() -> Result<Self> {
        debug!("Using in-memory request database");
        Self::from_connection(Connection::open_in_memory()?, PathBuf::from(":memory:"))
    }

    fn from_connection(conn: Connection, path: PathBuf) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        schema::initialize_schema(&conn)?;
        Ok(Self {
            path,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn default_database_path() -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .or_else(dirs::data_dir)
            .context("No data directory for this user")?;
        Ok(data_dir.join("subrelay").join("subrelay.db"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run read-only statements on the blocking pool
    pub async fn read<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || f(&conn.lock()))
            .await
            .context("Database read task panicked")?
    }

    /// Run `f` in one transaction and call `on_commit` after it commits.
    ///
    /// The write lock is taken up front, so a read-then-write inside `f`
    /// cannot race a writer in another process. `on_commit` still runs under
    /// the connection lock. An error from `f` rolls back and skips the hook.
    pub async fn transaction<F, C, T>(&self, f: F, on_commit: C) -> Result<T>
    where
        F: FnOnce(&Transaction) -> Result<T> + Send + 'static,
        C: FnOnce(&T) + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock();
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let value = f(&tx)?;
            tx.commit()?;
            on_commit(&value);
            Ok(value)
        })
        .await
        .context("Database write task panicked")?
    }
}
