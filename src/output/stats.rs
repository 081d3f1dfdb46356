//! Statistics generation from the crawl database
//!
//! This module provides functionality for extracting and displaying
//! snapshot counts and recent sessions from the storage layer.

use crate::storage::{SessionRecord, Storage};
use crate::TidemarkError;

/// Database statistics summary
#[derive(Debug, Clone)]
pub struct StorageStatistics {
    /// Product identifiers known from listing discovery
    pub discovered_products: u64,

    /// Stored product snapshots (all versions)
    pub product_snapshots: u64,

    /// Stored review pages (all versions)
    pub review_pages: u64,

    /// Most recent sessions, newest first
    pub recent_sessions: Vec<SessionRecord>,
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
/// * `session_limit` - How many recent sessions to include
///
/// # Returns
///
/// * `Ok(StorageStatistics)` - Successfully loaded statistics
/// * `Err(TidemarkError)` - Failed to query statistics
pub fn load_statistics(
    storage: &dyn Storage,
    session_limit: usize,
) -> Result<StorageStatistics, TidemarkError> {
    Ok(StorageStatistics {
        discovered_products: storage.count_discovered_products()?,
        product_snapshots: storage.count_product_snapshots()?,
        review_pages: storage.count_review_pages()?,
        recent_sessions: storage.recent_sessions(session_limit)?,
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &StorageStatistics) {
    println!("=== Tidemark Statistics ===\n");

    println!("Overview:");
    println!("  Discovered products: {}", stats.discovered_products);
    println!("  Product snapshots: {}", stats.product_snapshots);
    println!("  Review pages: {}", stats.review_pages);
    println!();

    if stats.recent_sessions.is_empty() {
        println!("No sessions recorded yet.");
        return;
    }

    println!("Recent Sessions ({}):", stats.recent_sessions.len());
    for session in &stats.recent_sessions {
        println!(
            "  {} {:<9} {:<9} items={:<6} started={} finished={}",
            session.id,
            session.phase.to_db_string(),
            session.status.to_db_string(),
            session.processed_items,
            session.started_at,
            session.finished_at.as_deref().unwrap_or("-")
        );
    }
}
