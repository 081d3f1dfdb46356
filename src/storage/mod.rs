//! Storage module for persisting crawl data
//!
//! This module handles all persistence for the crawler, including:
//! - SQLite database initialization and schema management
//! - Crawl session bookkeeping
//! - Idempotent product discovery records
//! - Incremental (equality-deduplicated) snapshots of home, product and
//!   review payloads

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::state::{PhaseKind, SessionId, SessionStatus};
use crate::TidemarkError;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Storage handle shared by the workers of a phase
pub type SharedStorage = Arc<Mutex<dyn Storage>>;

/// Wraps a backend for sharing between workers
pub fn share<S: Storage + 'static>(storage: S) -> SharedStorage {
    Arc::new(Mutex::new(storage))
}

/// Locks a shared backend
///
/// A poisoned lock means a worker panicked mid-write; the backend itself
/// keeps every write atomic, so the guard is recovered rather than failing
/// every later task.
pub fn lock(storage: &SharedStorage) -> MutexGuard<'_, dyn Storage + 'static> {
    storage.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(TidemarkError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> Result<SqliteStorage, TidemarkError> {
    SqliteStorage::new(path)
}

/// Result of a deduplicated snapshot write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// A new row was written with this id
    Inserted(i64),
    /// The payload equals the latest stored one; this is its id
    Unchanged(i64),
}

impl WriteOutcome {
    /// The id of the row that now holds the current payload
    pub fn id(&self) -> i64 {
        match self {
            Self::Inserted(id) | Self::Unchanged(id) => *id,
        }
    }

    pub fn is_inserted(&self) -> bool {
        matches!(self, Self::Inserted(_))
    }
}

/// Represents a crawl session in the database
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub id: SessionId,
    pub source_name: String,
    pub phase: PhaseKind,
    pub config_hash: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub status: SessionStatus,
    pub processed_items: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_outcome() {
        assert_eq!(WriteOutcome::Inserted(4).id(), 4);
        assert_eq!(WriteOutcome::Unchanged(9).id(), 9);
        assert!(WriteOutcome::Inserted(4).is_inserted());
        assert!(!WriteOutcome::Unchanged(9).is_inserted());
    }

    #[test]
    fn test_shared_storage_lock() {
        let shared = share(SqliteStorage::new_in_memory().unwrap());
        let session = lock(&shared)
            .open_session("hasaki", PhaseKind::Listing, "h")
            .unwrap();
        assert_eq!(
            lock(&shared).get_session(&session).unwrap().status,
            SessionStatus::Running
        );
    }
}
