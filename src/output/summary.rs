//! Per-run summary report

use crate::state::{CrawlSession, PhaseKind, SessionId, SessionMetrics, SessionStatus};
use chrono::Utc;
use std::time::Duration;

/// Failed items listed in the log before the rest is elided
const MAX_LOGGED_FAILURES: usize = 20;

/// An item that produced no result, and why
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedItem {
    /// Task id, e.g. `product:123` or `category:45`
    pub item: String,
    pub reason: String,
}

/// What one phase run did
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub session_id: SessionId,
    pub phase: PhaseKind,
    pub status: SessionStatus,
    pub duration: Duration,
    pub metrics: SessionMetrics,
    pub failures: Vec<FailedItem>,
}

impl RunSummary {
    /// Takes a snapshot of a session's counters
    ///
    /// For a session that is still running the duration runs up to now.
    pub fn from_session(session: &CrawlSession, failures: Vec<FailedItem>) -> Self {
        let finished = session.finished_at().unwrap_or_else(Utc::now);
        let duration = (finished - session.started_at())
            .to_std()
            .unwrap_or_default();

        Self {
            session_id: session.id().clone(),
            phase: session.phase(),
            status: session.status(),
            duration,
            metrics: session.metrics(),
            failures,
        }
    }

    /// True when the session closed as completed, item failures included
    pub fn is_success(&self) -> bool {
        self.status == SessionStatus::Completed
    }

    /// Products found by listing discovery, new and already known
    pub fn products_discovered(&self) -> u64 {
        self.metrics.discovered_new + self.metrics.discovered_known
    }

    /// Logs the summary through `tracing`
    pub fn log(&self) {
        let m = &self.metrics;

        tracing::info!(
            "Session {} ({}) finished {} in {:.1}s",
            self.session_id,
            self.phase,
            self.status,
            self.duration.as_secs_f64()
        );

        match self.phase {
            PhaseKind::Listing => {
                tracing::info!(
                    "  {} categories scanned, {} listing pages, {} products ({} new, {} known)",
                    m.categories_scanned,
                    m.listing_pages,
                    self.products_discovered(),
                    m.discovered_new,
                    m.discovered_known
                );
            }
            _ => {
                tracing::info!(
                    "  {} items processed: {} inserted, {} unchanged, {} failed",
                    m.processed,
                    m.inserted,
                    m.unchanged,
                    m.failed
                );
                if self.phase.fetches_reviews() {
                    tracing::info!(
                        "  {} review pages fetched: {} inserted, {} unchanged, {} failed",
                        m.review_pages_fetched,
                        m.review_pages_inserted,
                        m.review_pages_unchanged,
                        m.review_pages_failed
                    );
                    tracing::info!(
                        "  {} pagination anomalies, {} review pages skipped",
                        m.pagination_anomalies,
                        m.review_pages_skipped
                    );
                }
            }
        }

        if !self.failures.is_empty() {
            tracing::warn!("  {} failed items:", self.failures.len());
            for failure in self.failures.iter().take(MAX_LOGGED_FAILURES) {
                tracing::warn!("    {}: {}", failure.item, failure.reason);
            }
            if self.failures.len() > MAX_LOGGED_FAILURES {
                tracing::warn!(
                    "    ... and {} more",
                    self.failures.len() - MAX_LOGGED_FAILURES
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Counter;

    #[test]
    fn test_summary_from_session() {
        let session = CrawlSession::new(SessionId::new("s1"), "hasaki", PhaseKind::Listing);
        session.add(Counter::DiscoveredNew, 3);
        session.increment(Counter::DiscoveredKnown);
        session.finish(SessionStatus::Completed).unwrap();

        let summary = RunSummary::from_session(
            &session,
            vec![FailedItem {
                item: "category:9".to_string(),
                reason: "HTTP 404".to_string(),
            }],
        );

        assert!(summary.is_success());
        assert_eq!(summary.products_discovered(), 4);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.phase, PhaseKind::Listing);
    }

    #[test]
    fn test_failed_session_is_not_success() {
        let session = CrawlSession::new(SessionId::new("s2"), "hasaki", PhaseKind::Combined);
        session.finish(SessionStatus::Failed).unwrap();

        let summary = RunSummary::from_session(&session, vec![]);
        assert!(!summary.is_success());
        summary.log();
    }
}
