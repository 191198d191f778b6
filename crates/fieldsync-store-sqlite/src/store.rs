// crates/fieldsync-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Observation Store and Ledger
// Description: Durable ObservationStore and SyncLedger over one database.
// Purpose: Persist idempotent observation rows and append-only run records.
// Dependencies: fieldsync-core, rusqlite, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! This module implements [`SqliteStore`], backing both core persistence
//! traits with a single mutex-guarded connection. Observation upserts use
//! `ON CONFLICT(id) DO UPDATE` inside one transaction per batch, so a batch
//! is atomic and replaying a refresh converges to the same rows. The
//! `sync_runs` ledger is append-only: rows transition RUNNING to a terminal
//! status exactly once and are never deleted. Opening the store finalizes
//! any RUNNING rows left behind by a crashed process as FAILURE.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;

use fieldsync_core::LedgerError;
use fieldsync_core::ObservationStore;
use fieldsync_core::ProcessName;
use fieldsync_core::RunStatus;
use fieldsync_core::StoreError;
use fieldsync_core::SyncLedger;
use fieldsync_core::SyncRun;
use fieldsync_core::UpstreamRecord;
use fieldsync_core::unix_millis;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::params;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Failure message written to ledger rows orphaned by a crashed process.
const STALE_RUN_MESSAGE: &str = "run did not finish; finalized at store open";

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteJournalMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteJournalMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `synchronous` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` store.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - `busy_timeout_ms` is interpreted as milliseconds.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteJournalMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
///
/// # Invariants
/// - Error messages avoid embedding raw observation payloads.
#[derive(Debug, Error, Clone)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Invalid store data or transition.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
    /// No ledger row exists for the requested run.
    #[error("sqlite ledger has no run {run_id}")]
    RunNotFound {
        /// Requested run identifier.
        run_id: i64,
    },
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Db(message) => Self::Db(message),
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
            SqliteStoreError::RunNotFound {
                run_id,
            } => Self::Invalid(format!("ledger run {run_id} not found")),
        }
    }
}

impl From<SqliteStoreError> for LedgerError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) | SqliteStoreError::Db(message) => Self::Db(message),
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
            SqliteStoreError::RunNotFound {
                run_id,
            } => Self::NotFound {
                run_id,
            },
        }
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed observation store and sync-run ledger.
///
/// # Invariants
/// - Connection access is serialized through a mutex.
/// - Observation batches commit atomically; no partial batch is visible.
/// - Ledger rows are never deleted; terminal rows are never rewritten.
#[derive(Clone)]
pub struct SqliteStore {
    /// Shared connection guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Opens the store, initializing the schema and finalizing any ledger
    /// rows left RUNNING by a previous process.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// initialized.
    pub fn new(config: &SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        ensure_parent_dir(&config.path)?;
        let connection = open_connection(config)?;
        initialize_schema(&connection)?;
        recover_stale_running(&connection)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Locks the shared connection.
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, SqliteStoreError> {
        self.connection
            .lock()
            .map_err(|_| SqliteStoreError::Db("sqlite mutex poisoned".to_string()))
    }
}

/// Creates the parent directory of the database path if missing.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))?;
    }
    Ok(())
}

/// Opens a connection with the configured pragmas applied.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let connection =
        Connection::open(&config.path).map_err(|err| SqliteStoreError::Io(err.to_string()))?;
    connection
        .busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .pragma_update(None, "journal_mode", config.journal_mode.pragma_value())
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .pragma_update(None, "synchronous", config.sync_mode.pragma_value())
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    Ok(connection)
}

/// Creates tables and verifies the stored schema version.
fn initialize_schema(connection: &Connection) -> Result<(), SqliteStoreError> {
    connection
        .execute_batch(
            "CREATE TABLE IF NOT EXISTS store_meta (
                 key TEXT PRIMARY KEY,
                 value INTEGER NOT NULL
             );
             CREATE TABLE IF NOT EXISTS observations (
                 id TEXT PRIMARY KEY,
                 data TEXT NOT NULL
             );
             CREATE TABLE IF NOT EXISTS sync_runs (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 process TEXT NOT NULL,
                 start_time INTEGER NOT NULL,
                 finish_time INTEGER,
                 status TEXT NOT NULL,
                 rows_loaded INTEGER NOT NULL DEFAULT 0,
                 error_message TEXT,
                 source_label TEXT NOT NULL,
                 target_label TEXT NOT NULL
             );",
        )
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    let stored: Option<i64> = connection
        .query_row("SELECT value FROM store_meta WHERE key = 'schema_version'", [], |row| {
            row.get(0)
        })
        .optional()
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    match stored {
        Some(version) if version == SCHEMA_VERSION => Ok(()),
        Some(version) => Err(SqliteStoreError::Invalid(format!(
            "schema version mismatch: found {version}, expected {SCHEMA_VERSION}"
        ))),
        None => {
            connection
                .execute(
                    "INSERT INTO store_meta (key, value) VALUES ('schema_version', ?1)",
                    params![SCHEMA_VERSION],
                )
                .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            Ok(())
        }
    }
}

/// Finalizes ledger rows orphaned at RUNNING by a crashed process.
fn recover_stale_running(connection: &Connection) -> Result<u64, SqliteStoreError> {
    let updated = connection
        .execute(
            "UPDATE sync_runs SET status = ?1, finish_time = ?2, error_message = ?3
             WHERE status = ?4",
            params![
                RunStatus::Failure.as_str(),
                unix_millis(),
                STALE_RUN_MESSAGE,
                RunStatus::Running.as_str()
            ],
        )
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    Ok(u64::try_from(updated).unwrap_or(u64::MAX))
}

// ============================================================================
// SECTION: Observation Store
// ============================================================================

impl ObservationStore for SqliteStore {
    fn upsert_batch(&self, records: &[UpstreamRecord]) -> Result<u64, StoreError> {
        let mut guard = self.lock()?;
        let tx = guard.transaction().map_err(|err| StoreError::Db(err.to_string()))?;
        let mut written: u64 = 0;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO observations (id, data) VALUES (?1, ?2)
                     ON CONFLICT(id) DO UPDATE SET data = excluded.data",
                )
                .map_err(|err| StoreError::Db(err.to_string()))?;
            for record in records {
                let data = serde_json::to_string(record.payload())
                    .map_err(|err| StoreError::Invalid(err.to_string()))?;
                stmt.execute(params![record.id(), data])
                    .map_err(|err| StoreError::Db(err.to_string()))?;
                written = written.saturating_add(1);
            }
        }
        tx.commit().map_err(|err| StoreError::Db(err.to_string()))?;
        Ok(written)
    }

    fn get(&self, id: &str) -> Result<Option<Value>, StoreError> {
        let guard = self.lock()?;
        let data: Option<String> = guard
            .query_row("SELECT data FROM observations WHERE id = ?1", params![id], |row| {
                row.get(0)
            })
            .optional()
            .map_err(|err| StoreError::Db(err.to_string()))?;
        let Some(data) = data else {
            return Ok(None);
        };
        let value: Value =
            serde_json::from_str(&data).map_err(|err| StoreError::Invalid(err.to_string()))?;
        Ok(Some(value))
    }

    fn count(&self) -> Result<u64, StoreError> {
        let guard = self.lock()?;
        let count: i64 = guard
            .query_row("SELECT COUNT(*) FROM observations", [], |row| row.get(0))
            .map_err(|err| StoreError::Db(err.to_string()))?;
        u64::try_from(count).map_err(|_| StoreError::Invalid("negative row count".to_string()))
    }

    fn prune_absent(&self, live_ids: &[String]) -> Result<u64, StoreError> {
        let mut guard = self.lock()?;
        let tx = guard.transaction().map_err(|err| StoreError::Db(err.to_string()))?;
        tx.execute("CREATE TEMP TABLE live_ids (id TEXT PRIMARY KEY)", [])
            .map_err(|err| StoreError::Db(err.to_string()))?;
        let result = (|| -> Result<u64, StoreError> {
            {
                let mut stmt = tx
                    .prepare("INSERT OR IGNORE INTO live_ids (id) VALUES (?1)")
                    .map_err(|err| StoreError::Db(err.to_string()))?;
                for id in live_ids {
                    stmt.execute(params![id]).map_err(|err| StoreError::Db(err.to_string()))?;
                }
            }
            let deleted = tx
                .execute("DELETE FROM observations WHERE id NOT IN (SELECT id FROM live_ids)", [])
                .map_err(|err| StoreError::Db(err.to_string()))?;
            Ok(u64::try_from(deleted).unwrap_or(u64::MAX))
        })();
        tx.execute("DROP TABLE live_ids", []).map_err(|err| StoreError::Db(err.to_string()))?;
        let deleted = result?;
        tx.commit().map_err(|err| StoreError::Db(err.to_string()))?;
        Ok(deleted)
    }
}

// ============================================================================
// SECTION: Sync Ledger
// ============================================================================

impl SyncLedger for SqliteStore {
    fn begin_run(
        &self,
        process: ProcessName,
        source_label: &str,
        target_label: &str,
    ) -> Result<i64, LedgerError> {
        let guard = self.lock()?;
        guard
            .execute(
                "INSERT INTO sync_runs
                 (process, start_time, status, rows_loaded, source_label, target_label)
                 VALUES (?1, ?2, ?3, 0, ?4, ?5)",
                params![
                    process.as_str(),
                    unix_millis(),
                    RunStatus::Running.as_str(),
                    source_label,
                    target_label
                ],
            )
            .map_err(|err| LedgerError::Db(err.to_string()))?;
        Ok(guard.last_insert_rowid())
    }

    fn finish_run(
        &self,
        run_id: i64,
        status: RunStatus,
        rows_loaded: u64,
        error_message: Option<&str>,
    ) -> Result<(), LedgerError> {
        if !status.is_terminal() {
            return Err(LedgerError::Invalid(format!(
                "finish_run requires a terminal status, got {status}"
            )));
        }
        let guard = self.lock()?;
        let current: Option<String> = guard
            .query_row("SELECT status FROM sync_runs WHERE id = ?1", params![run_id], |row| {
                row.get(0)
            })
            .optional()
            .map_err(|err| LedgerError::Db(err.to_string()))?;
        let Some(current) = current else {
            return Err(LedgerError::NotFound {
                run_id,
            });
        };
        if RunStatus::from_label(&current).is_some_and(RunStatus::is_terminal) {
            return Err(LedgerError::Invalid(format!("run {run_id} is already {current}")));
        }
        let rows_loaded = i64::try_from(rows_loaded)
            .map_err(|_| LedgerError::Invalid("rows_loaded exceeds ledger range".to_string()))?;
        guard
            .execute(
                "UPDATE sync_runs
                 SET status = ?1, finish_time = ?2, rows_loaded = ?3, error_message = ?4
                 WHERE id = ?5",
                params![status.as_str(), unix_millis(), rows_loaded, error_message, run_id],
            )
            .map_err(|err| LedgerError::Db(err.to_string()))?;
        Ok(())
    }

    fn list_runs(&self) -> Result<Vec<SyncRun>, LedgerError> {
        let guard = self.lock()?;
        let mut stmt = guard
            .prepare(
                "SELECT id, process, start_time, finish_time, status, rows_loaded,
                        error_message, source_label, target_label
                 FROM sync_runs
                 ORDER BY finish_time IS NOT NULL, finish_time DESC, id DESC",
            )
            .map_err(|err| LedgerError::Db(err.to_string()))?;
        let rows = stmt
            .query_map([], |row| {
                let id: i64 = row.get(0)?;
                let process: String = row.get(1)?;
                let start_time: i64 = row.get(2)?;
                let finish_time: Option<i64> = row.get(3)?;
                let status: String = row.get(4)?;
                let rows_loaded: i64 = row.get(5)?;
                let error_message: Option<String> = row.get(6)?;
                let source_label: String = row.get(7)?;
                let target_label: String = row.get(8)?;
                Ok((
                    id,
                    process,
                    start_time,
                    finish_time,
                    status,
                    rows_loaded,
                    error_message,
                    source_label,
                    target_label,
                ))
            })
            .map_err(|err| LedgerError::Db(err.to_string()))?;
        let mut runs = Vec::new();
        for row in rows {
            let (
                id,
                process_raw,
                start_time,
                finish_time,
                status_raw,
                rows_loaded,
                error_message,
                source_label,
                target_label,
            ) = row.map_err(|err| LedgerError::Db(err.to_string()))?;
            let process = ProcessName::from_label(&process_raw).ok_or_else(|| {
                LedgerError::Invalid(format!("unknown process label: {process_raw}"))
            })?;
            let status = RunStatus::from_label(&status_raw).ok_or_else(|| {
                LedgerError::Invalid(format!("unknown status label: {status_raw}"))
            })?;
            let rows_loaded = u64::try_from(rows_loaded).map_err(|_| {
                LedgerError::Invalid(format!("negative rows_loaded for run {id}"))
            })?;
            runs.push(SyncRun {
                id,
                process,
                start_time,
                finish_time,
                status,
                rows_loaded,
                error_message,
                source_label,
                target_label,
            });
        }
        Ok(runs)
    }

    fn last_success(&self, process: ProcessName) -> Result<Option<i64>, LedgerError> {
        let guard = self.lock()?;
        guard
            .query_row(
                "SELECT MAX(finish_time) FROM sync_runs WHERE process = ?1 AND status = ?2",
                params![process.as_str(), RunStatus::Success.as_str()],
                |row| row.get(0),
            )
            .map_err(|err| LedgerError::Db(err.to_string()))
    }
}
