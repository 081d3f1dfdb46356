//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.
//! Payloads are stored as JSON text and compared structurally (as parsed
//! `serde_json::Value`s), so key order or whitespace differences in the
//! upstream response never produce a spurious new snapshot.

use crate::state::{PhaseKind, SessionId, SessionStatus};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{SessionRecord, WriteOutcome};
use crate::TidemarkError;
use chrono::Utc;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde_json::Value;
use std::path::Path;

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens (or creates) a database file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(TidemarkError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, TidemarkError> {
        let conn = Connection::open(path)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for tests and dry runs)
    pub fn new_in_memory() -> Result<Self, TidemarkError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Inserts `payload` unless it equals the newest payload for the key
    ///
    /// `latest_sql` must select `(id, payload)` of the newest row for the key
    /// and take `key_params`; `insert` performs the insert and returns the new
    /// row id.
    fn write_deduplicated<F>(
        &mut self,
        latest_sql: &str,
        key_params: &[&dyn rusqlite::ToSql],
        payload: &Value,
        insert: F,
    ) -> StorageResult<WriteOutcome>
    where
        F: FnOnce(&Connection, &str) -> StorageResult<i64>,
    {
        let latest: Option<(i64, String)> = self
            .conn
            .query_row(latest_sql, key_params, |row| Ok((row.get(0)?, row.get(1)?)))
            .optional()?;

        if let Some((id, stored)) = latest {
            let stored: Value = serde_json::from_str(&stored)?;
            if &stored == payload {
                return Ok(WriteOutcome::Unchanged(id));
            }
        }

        let text = serde_json::to_string(payload)?;
        let id = insert(&self.conn, &text)?;
        Ok(WriteOutcome::Inserted(id))
    }

    fn require_session(&self, session_id: &SessionId) -> StorageResult<String> {
        self.conn
            .query_row(
                "SELECT source_name FROM sessions WHERE id = ?1",
                params![session_id.as_str()],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| StorageError::SessionNotFound(session_id.to_string()))
    }
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<SessionRecord> {
    Ok(SessionRecord {
        id: SessionId::new(row.get::<_, String>(0)?),
        source_name: row.get(1)?,
        phase: PhaseKind::from_db_string(&row.get::<_, String>(2)?)
            .unwrap_or(PhaseKind::Combined),
        config_hash: row.get(3)?,
        started_at: row.get(4)?,
        finished_at: row.get(5)?,
        status: SessionStatus::from_db_string(&row.get::<_, String>(6)?)
            .unwrap_or(SessionStatus::Failed),
        processed_items: row.get::<_, i64>(7)? as u64,
    })
}

const SESSION_COLUMNS: &str =
    "id, source_name, phase, config_hash, started_at, finished_at, status, processed_items";

impl Storage for SqliteStorage {
    // ===== Session Management =====

    fn open_session(
        &mut self,
        source_name: &str,
        phase: PhaseKind,
        config_hash: &str,
    ) -> StorageResult<SessionId> {
        let id = SessionId::generate();
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO sessions (id, source_name, phase, config_hash, started_at, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id.as_str(),
                source_name,
                phase.to_db_string(),
                config_hash,
                now,
                SessionStatus::Running.to_db_string()
            ],
        )?;
        Ok(id)
    }

    fn close_session(
        &mut self,
        session_id: &SessionId,
        status: SessionStatus,
        processed_items: u64,
    ) -> StorageResult<()> {
        if !status.is_terminal() {
            return Err(StorageError::Database(format!(
                "cannot close session {} as {}",
                session_id, status
            )));
        }

        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE sessions SET status = ?1, finished_at = ?2, processed_items = ?3
             WHERE id = ?4 AND status = ?5",
            params![
                status.to_db_string(),
                now,
                processed_items as i64,
                session_id.as_str(),
                SessionStatus::Running.to_db_string()
            ],
        )?;

        if updated == 0 {
            self.require_session(session_id)?;
            return Err(StorageError::SessionClosed(session_id.to_string()));
        }

        Ok(())
    }

    fn get_session(&self, session_id: &SessionId) -> StorageResult<SessionRecord> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM sessions WHERE id = ?1", SESSION_COLUMNS),
                params![session_id.as_str()],
                session_from_row,
            )
            .optional()?
            .ok_or_else(|| StorageError::SessionNotFound(session_id.to_string()))
    }

    fn recent_sessions(&self, limit: usize) -> StorageResult<Vec<SessionRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM sessions ORDER BY rowid DESC LIMIT ?1",
            SESSION_COLUMNS
        ))?;

        let sessions = stmt
            .query_map(params![limit as i64], session_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(sessions)
    }

    // ===== Listing Discovery =====

    fn upsert_discovered_product(
        &mut self,
        session_id: &SessionId,
        product_id: &str,
        brand_id: Option<&str>,
    ) -> StorageResult<bool> {
        let now = Utc::now().to_rfc3339();
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO discovered_products
             (product_id, brand_id, first_session, last_session, discovered_at)
             VALUES (?1, ?2, ?3, ?3, ?4)",
            params![product_id, brand_id, session_id.as_str(), now],
        )?;

        if inserted == 0 {
            self.conn.execute(
                "UPDATE discovered_products
                 SET last_session = ?1, brand_id = COALESCE(?2, brand_id)
                 WHERE product_id = ?3",
                params![session_id.as_str(), brand_id, product_id],
            )?;
        }

        Ok(inserted > 0)
    }

    fn query_product_ids_by_brands(&self, brand_ids: &[String]) -> StorageResult<Vec<String>> {
        if brand_ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; brand_ids.len()].join(", ");
        let mut stmt = self.conn.prepare(&format!(
            "SELECT DISTINCT product_id FROM discovered_products
             WHERE brand_id IN ({}) ORDER BY product_id",
            placeholders
        ))?;

        let ids = stmt
            .query_map(params_from_iter(brand_ids.iter()), |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;

        Ok(ids)
    }

    // ===== Snapshots =====

    fn write_home_snapshot(
        &mut self,
        session_id: &SessionId,
        payload: &Value,
    ) -> StorageResult<WriteOutcome> {
        let source_name = self.require_session(session_id)?;

        self.write_deduplicated(
            "SELECT id, payload FROM home_snapshots WHERE source_name = ?1
             ORDER BY id DESC LIMIT 1",
            params![source_name],
            payload,
            |conn, text| {
                conn.execute(
                    "INSERT INTO home_snapshots (session_id, source_name, payload, captured_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![session_id.as_str(), source_name, text, Utc::now().to_rfc3339()],
                )?;
                Ok(conn.last_insert_rowid())
            },
        )
    }

    fn write_product_snapshot(
        &mut self,
        session_id: &SessionId,
        product_id: &str,
        payload: &Value,
    ) -> StorageResult<WriteOutcome> {
        self.write_deduplicated(
            "SELECT id, payload FROM product_snapshots WHERE product_id = ?1
             ORDER BY id DESC LIMIT 1",
            params![product_id],
            payload,
            |conn, text| {
                conn.execute(
                    "INSERT INTO product_snapshots (session_id, product_id, payload, captured_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![session_id.as_str(), product_id, text, Utc::now().to_rfc3339()],
                )?;
                Ok(conn.last_insert_rowid())
            },
        )
    }

    fn latest_product_snapshot_id(&self, product_id: &str) -> StorageResult<Option<i64>> {
        let id = self
            .conn
            .query_row(
                "SELECT id FROM product_snapshots WHERE product_id = ?1 ORDER BY id DESC LIMIT 1",
                params![product_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    fn write_review_page(
        &mut self,
        session_id: &SessionId,
        snapshot_id: i64,
        product_id: &str,
        page: u32,
        payload: &Value,
    ) -> StorageResult<WriteOutcome> {
        self.write_deduplicated(
            "SELECT id, payload FROM review_pages WHERE product_id = ?1 AND page_number = ?2
             ORDER BY id DESC LIMIT 1",
            params![product_id, page],
            payload,
            |conn, text| {
                conn.execute(
                    "INSERT INTO review_pages
                     (session_id, snapshot_id, product_id, page_number, payload, captured_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        session_id.as_str(),
                        snapshot_id,
                        product_id,
                        page,
                        text,
                        Utc::now().to_rfc3339()
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            },
        )
    }

    // ===== Statistics =====

    fn count_discovered_products(&self) -> StorageResult<u64> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM discovered_products", [], |row| {
                    row.get(0)
                })?;
        Ok(count as u64)
    }

    fn count_product_snapshots(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM product_snapshots", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_review_pages(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM review_pages", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}
