//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::state::{PhaseKind, SessionId, SessionStatus};
use crate::storage::{SessionRecord, WriteOutcome};
use serde_json::Value;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Session already closed: {0}")]
    SessionClosed(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// Writes of snapshot payloads perform equality-based deduplication: when the
/// payload equals the most recent payload stored under the same key, nothing
/// is written and [`WriteOutcome::Unchanged`] carries the existing row id.
/// Implementations are used from many workers through a mutex, so every
/// method is a short, self-contained operation.
pub trait Storage: Send {
    // ===== Session Management =====

    /// Opens a running session and returns its token
    fn open_session(
        &mut self,
        source_name: &str,
        phase: PhaseKind,
        config_hash: &str,
    ) -> StorageResult<SessionId>;

    /// Closes a running session with a terminal status
    ///
    /// Fails with `SessionClosed` if the session is no longer running.
    fn close_session(
        &mut self,
        session_id: &SessionId,
        status: SessionStatus,
        processed_items: u64,
    ) -> StorageResult<()>;

    /// Gets a session by token
    fn get_session(&self, session_id: &SessionId) -> StorageResult<SessionRecord>;

    /// Gets the most recent sessions, newest first
    fn recent_sessions(&self, limit: usize) -> StorageResult<Vec<SessionRecord>>;

    // ===== Listing Discovery =====

    /// Records a product identifier found on a listing page
    ///
    /// Idempotent on the product id. A later call that carries a brand id
    /// fills in a missing one. Returns true if the product was new.
    fn upsert_discovered_product(
        &mut self,
        session_id: &SessionId,
        product_id: &str,
        brand_id: Option<&str>,
    ) -> StorageResult<bool>;

    /// Gets the distinct product ids whose brand is in `brand_ids`, sorted
    fn query_product_ids_by_brands(&self, brand_ids: &[String]) -> StorageResult<Vec<String>>;

    // ===== Snapshots =====

    /// Stores the home payload for the session's source
    fn write_home_snapshot(
        &mut self,
        session_id: &SessionId,
        payload: &Value,
    ) -> StorageResult<WriteOutcome>;

    /// Stores a product payload
    fn write_product_snapshot(
        &mut self,
        session_id: &SessionId,
        product_id: &str,
        payload: &Value,
    ) -> StorageResult<WriteOutcome>;

    /// Gets the id of the most recent snapshot for a product
    fn latest_product_snapshot_id(&self, product_id: &str) -> StorageResult<Option<i64>>;

    /// Stores one review page, keyed by product id and page number
    fn write_review_page(
        &mut self,
        session_id: &SessionId,
        snapshot_id: i64,
        product_id: &str,
        page: u32,
        payload: &Value,
    ) -> StorageResult<WriteOutcome>;

    // ===== Statistics =====

    fn count_discovered_products(&self) -> StorageResult<u64>;

    fn count_product_snapshots(&self) -> StorageResult<u64>;

    fn count_review_pages(&self) -> StorageResult<u64>;
}
