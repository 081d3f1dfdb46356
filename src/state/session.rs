//! In-process view of a crawl session
//!
//! A `CrawlSession` is shared (behind an `Arc`) by every worker of a phase.
//! Workers only bump counters; the coordinator is the only caller of
//! [`CrawlSession::finish`]. Readers take a [`SessionMetrics`] snapshot.

use crate::state::{PhaseKind, SessionStatus};
use crate::TidemarkError;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::OnceLock;

/// Opaque session token assigned by the storage backend
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Generates a fresh random token
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Aggregate counters folded into a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    /// Items that produced an outcome (success or failure)
    Processed,
    /// Writes that created a new snapshot row
    Inserted,
    /// Writes the backend reported as identical to the latest snapshot
    Unchanged,
    /// Items that failed after retries or fatally
    Failed,
    /// Product identifiers seen for the first time
    DiscoveredNew,
    /// Product identifiers already known to the backend
    DiscoveredKnown,
    CategoriesScanned,
    ListingPages,
    ReviewPagesFetched,
    ReviewPagesFailed,
    /// Review page writes that created a new row
    ReviewPagesInserted,
    /// Review page writes identical to the stored page
    ReviewPagesUnchanged,
    /// Pages dropped or never requested after the repeat guard tripped
    ReviewPagesSkipped,
    PaginationAnomalies,
}

const COUNTER_COUNT: usize = 14;

impl Counter {
    fn index(self) -> usize {
        match self {
            Self::Processed => 0,
            Self::Inserted => 1,
            Self::Unchanged => 2,
            Self::Failed => 3,
            Self::DiscoveredNew => 4,
            Self::DiscoveredKnown => 5,
            Self::CategoriesScanned => 6,
            Self::ListingPages => 7,
            Self::ReviewPagesFetched => 8,
            Self::ReviewPagesFailed => 9,
            Self::ReviewPagesInserted => 10,
            Self::ReviewPagesUnchanged => 11,
            Self::ReviewPagesSkipped => 12,
            Self::PaginationAnomalies => 13,
        }
    }
}

/// Point-in-time copy of a session's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionMetrics {
    pub processed: u64,
    pub inserted: u64,
    pub unchanged: u64,
    pub failed: u64,
    pub discovered_new: u64,
    pub discovered_known: u64,
    pub categories_scanned: u64,
    pub listing_pages: u64,
    pub review_pages_fetched: u64,
    pub review_pages_failed: u64,
    pub review_pages_inserted: u64,
    pub review_pages_unchanged: u64,
    pub review_pages_skipped: u64,
    pub pagination_anomalies: u64,
}

/// A crawl session shared by all workers of one phase
#[derive(Debug)]
pub struct CrawlSession {
    id: SessionId,
    source_name: String,
    phase: PhaseKind,
    started_at: DateTime<Utc>,
    finished_at: OnceLock<DateTime<Utc>>,
    status: AtomicU8,
    counters: [AtomicU64; COUNTER_COUNT],
}

impl CrawlSession {
    /// Creates a running session
    pub fn new(id: SessionId, source_name: impl Into<String>, phase: PhaseKind) -> Self {
        Self {
            id,
            source_name: source_name.into(),
            phase,
            started_at: Utc::now(),
            finished_at: OnceLock::new(),
            status: AtomicU8::new(SessionStatus::Running.as_u8()),
            counters: std::array::from_fn(|_| AtomicU64::new(0)),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn phase(&self) -> PhaseKind {
        self.phase
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at.get().copied()
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    /// Adds one to a counter and returns the new value
    pub fn increment(&self, counter: Counter) -> u64 {
        self.add(counter, 1)
    }

    /// Adds `n` to a counter and returns the new value
    pub fn add(&self, counter: Counter, n: u64) -> u64 {
        self.counters[counter.index()].fetch_add(n, Ordering::AcqRel) + n
    }

    pub fn get(&self, counter: Counter) -> u64 {
        self.counters[counter.index()].load(Ordering::Acquire)
    }

    /// Takes a snapshot of every counter
    pub fn metrics(&self) -> SessionMetrics {
        SessionMetrics {
            processed: self.get(Counter::Processed),
            inserted: self.get(Counter::Inserted),
            unchanged: self.get(Counter::Unchanged),
            failed: self.get(Counter::Failed),
            discovered_new: self.get(Counter::DiscoveredNew),
            discovered_known: self.get(Counter::DiscoveredKnown),
            categories_scanned: self.get(Counter::CategoriesScanned),
            listing_pages: self.get(Counter::ListingPages),
            review_pages_fetched: self.get(Counter::ReviewPagesFetched),
            review_pages_failed: self.get(Counter::ReviewPagesFailed),
            review_pages_inserted: self.get(Counter::ReviewPagesInserted),
            review_pages_unchanged: self.get(Counter::ReviewPagesUnchanged),
            review_pages_skipped: self.get(Counter::ReviewPagesSkipped),
            pagination_anomalies: self.get(Counter::PaginationAnomalies),
        }
    }

    /// Moves the session to a terminal status
    ///
    /// Succeeds exactly once; any later call (or a request to move back to
    /// `Running`) is rejected with `InvalidTransition`.
    pub fn finish(&self, status: SessionStatus) -> Result<(), TidemarkError> {
        let current = self.status();
        if !current.can_transition_to(status) {
            return Err(TidemarkError::InvalidTransition {
                from: current,
                to: status,
            });
        }

        self.status
            .compare_exchange(
                SessionStatus::Running.as_u8(),
                status.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map_err(|actual| TidemarkError::InvalidTransition {
                from: SessionStatus::from_u8(actual),
                to: status,
            })?;

        let _ = self.finished_at.set(Utc::now());
        Ok(())
    }
}
