// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! SQLite-backed checkpoint store.
//!
//! Records are stored verbatim as JSON deltas in an append table; state
//! folding and hydration projection reuse the shared logic in the parent
//! module, so this backend and the in-memory one reconstruct identically.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
#[cfg(feature = "telemetry")]
use std::time::Instant;

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::CheckpointError;

#[cfg(feature = "telemetry")]
use crate::telemetry::metrics::GLOBAL_METRICS;

use super::{
    derive_hydration_events, split_thread_key, CheckpointDelta, CheckpointRecord, CheckpointStore,
    HydrationEvent, ThreadState, ThreadSummary,
};

/// Current schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Checkpoint store persisted to a SQLite database.
pub struct SqliteCheckpointStore {
    // rusqlite connections are not Sync; serialized behind a mutex, never
    // held across an await.
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl SqliteCheckpointStore {
    /// Open or create the store at the default location
    /// (`~/.troupe/checkpoints.db`).
    pub fn open() -> Result<Self, CheckpointError> {
        let dir = default_store_directory()?;
        std::fs::create_dir_all(&dir)
            .map_err(|e| CheckpointError::Io(format!("Failed to create store directory: {e}")))?;
        Self::open_at(&dir.join("checkpoints.db"))
    }

    /// Open or create the store at a specific path.
    ///
    /// This is useful for testing or when you want to use a custom location.
    pub fn open_at(db_path: &Path) -> Result<Self, CheckpointError> {
        #[cfg(feature = "telemetry")]
        let start = Instant::now();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CheckpointError::Io(format!("Failed to create directory: {e}")))?;
        }

        let conn = Connection::open(db_path).map_err(|e| {
            CheckpointError::ReadFailed(format!("Failed to open checkpoint database: {e}"))
        })?;

        // WAL mode for concurrent readers during hydration
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| CheckpointError::WriteFailed(format!("Failed to set pragmas: {e}")))?;

        let store = Self {
            conn: Mutex::new(conn),
            path: db_path.to_path_buf(),
        };
        store.init_schema()?;

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_operation("checkpoint.sqlite.open", start.elapsed());

        Ok(store)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, CheckpointError> {
        self.conn
            .lock()
            .map_err(|_| CheckpointError::Corrupted("checkpoint connection poisoned".to_string()))
    }

    fn init_schema(&self) -> Result<(), CheckpointError> {
        let conn = self.lock()?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            );

            CREATE TABLE IF NOT EXISTS checkpoints (
                id TEXT PRIMARY KEY,
                thread_key TEXT NOT NULL,
                sequence INTEGER NOT NULL,
                delta TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_checkpoints_thread
                ON checkpoints(thread_key, sequence);
            "#,
        )
        .map_err(|e| CheckpointError::WriteFailed(format!("Failed to create schema: {e}")))?;

        let current_version: Option<u32> = conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
                row.get(0)
            })
            .optional()
            .map_err(|e| {
                CheckpointError::ReadFailed(format!("Failed to get schema version: {e}"))
            })?;

        if current_version.is_none() {
            conn.execute(
                "INSERT INTO schema_version (version) VALUES (?)",
                params![SCHEMA_VERSION],
            )
            .map_err(|e| {
                CheckpointError::WriteFailed(format!("Failed to set schema version: {e}"))
            })?;
        }

        Ok(())
    }

    fn load_records(&self, thread_key: &str) -> Result<Vec<CheckpointRecord>, CheckpointError> {
        let conn = self.lock()?;

        let mut stmt = conn
            .prepare(
                r#"
            SELECT id, sequence, delta, created_at
            FROM checkpoints
            WHERE thread_key = ?
            ORDER BY sequence ASC
            "#,
            )
            .map_err(|e| CheckpointError::ReadFailed(format!("Failed to prepare query: {e}")))?;

        let records = stmt
            .query_map(params![thread_key], |row| {
                let delta_json: String = row.get(2)?;
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    delta_json,
                    row.get::<_, String>(3)?,
                ))
            })
            .map_err(|e| CheckpointError::ReadFailed(format!("Failed to query checkpoints: {e}")))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| {
                CheckpointError::ReadFailed(format!("Failed to collect checkpoints: {e}"))
            })?;

        records
            .into_iter()
            .map(|(id, sequence, delta_json, created_at)| {
                let delta: CheckpointDelta = serde_json::from_str(&delta_json)?;
                Ok(CheckpointRecord {
                    id,
                    sequence: sequence as u64,
                    created_at,
                    delta,
                })
            })
            .collect()
    }

    /// The database path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn get(&self, thread_key: &str) -> Result<Option<ThreadState>, CheckpointError> {
        #[cfg(feature = "telemetry")]
        let start = Instant::now();

        let records = self.load_records(thread_key)?;
        let result = if records.is_empty() {
            None
        } else {
            Some(ThreadState::from_records(&records))
        };

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_operation("checkpoint.sqlite.get", start.elapsed());

        Ok(result)
    }

    async fn put(
        &self,
        thread_key: &str,
        delta: CheckpointDelta,
    ) -> Result<CheckpointRecord, CheckpointError> {
        #[cfg(feature = "telemetry")]
        let start = Instant::now();

        let delta_json = serde_json::to_string(&delta)?;

        let conn = self.lock()?;
        let next_sequence: i64 = conn
            .query_row(
                "SELECT COALESCE(MAX(sequence), -1) + 1 FROM checkpoints WHERE thread_key = ?",
                params![thread_key],
                |row| row.get(0),
            )
            .map_err(|e| CheckpointError::ReadFailed(format!("Failed to get sequence: {e}")))?;

        let record = CheckpointRecord::new(next_sequence as u64, delta);

        conn.execute(
            r#"
            INSERT INTO checkpoints (id, thread_key, sequence, delta, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
            params![
                record.id,
                thread_key,
                next_sequence,
                delta_json,
                record.created_at,
            ],
        )
        .map_err(|e| CheckpointError::WriteFailed(format!("Failed to write checkpoint: {e}")))?;

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_operation("checkpoint.sqlite.put", start.elapsed());

        Ok(record)
    }

    async fn delete_thread(&self, thread_key: &str) -> Result<bool, CheckpointError> {
        let conn = self.lock()?;
        let rows = conn
            .execute(
                "DELETE FROM checkpoints WHERE thread_key = ?",
                params![thread_key],
            )
            .map_err(|e| CheckpointError::WriteFailed(format!("Failed to delete thread: {e}")))?;
        Ok(rows > 0)
    }

    async fn list(&self, session_id: Option<&str>) -> Result<Vec<ThreadSummary>, CheckpointError> {
        #[cfg(feature = "telemetry")]
        let start = Instant::now();

        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                r#"
            SELECT thread_key, COUNT(*), MAX(created_at)
            FROM checkpoints
            GROUP BY thread_key
            ORDER BY thread_key ASC
            "#,
            )
            .map_err(|e| CheckpointError::ReadFailed(format!("Failed to prepare query: {e}")))?;

        let summaries = stmt
            .query_map([], |row| {
                Ok(ThreadSummary {
                    thread_key: row.get(0)?,
                    checkpoints: row.get::<_, i64>(1)? as u64,
                    last_write: row.get(2)?,
                })
            })
            .map_err(|e| CheckpointError::ReadFailed(format!("Failed to list threads: {e}")))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| CheckpointError::ReadFailed(format!("Failed to collect threads: {e}")))?;

        let summaries: Vec<ThreadSummary> = summaries
            .into_iter()
            .filter(|summary| match session_id {
                Some(session) => summary.session_id() == Some(session),
                None => true,
            })
            .collect();

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_operation("checkpoint.sqlite.list", start.elapsed());

        Ok(summaries)
    }

    async fn read_hydration_events(
        &self,
        thread_key: &str,
    ) -> Result<Vec<HydrationEvent>, CheckpointError> {
        let records = self.load_records(thread_key)?;
        let agent = split_thread_key(thread_key)
            .map(|(_, agent)| agent)
            .unwrap_or(thread_key);
        Ok(derive_hydration_events(agent, &records))
    }
}

/// Default checkpoint directory (`~/.troupe`).
fn default_store_directory() -> Result<PathBuf, CheckpointError> {
    let home = dirs::home_dir()
        .ok_or_else(|| CheckpointError::Io("Could not determine home directory".to_string()))?;
    Ok(home.join(".troupe"))
}
