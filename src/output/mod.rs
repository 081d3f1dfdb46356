//! Output module for run summaries and database statistics
//!
//! This module handles:
//! - Folding a finished session's counters and failures into a [`RunSummary`]
//! - Logging the summary at the end of each phase
//! - Reading and printing database statistics for `--stats`

pub mod stats;
mod summary;

pub use stats::{load_statistics, print_statistics, StorageStatistics};
pub use summary::{FailedItem, RunSummary};
