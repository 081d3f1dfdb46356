//! Crawler module: the crawl execution engine
//!
//! This module contains the core crawling logic, including:
//! - Bounded-attempt retry with transient/fatal classification
//! - Per-phase bounded-concurrency worker pools
//! - Review pagination with the repeat-page guard
//! - Overall phase coordination and session bookkeeping

mod coordinator;
mod pagination;
mod pool;
mod retry;

pub use coordinator::{Coordinator, DetailMode};
pub use pagination::{
    compute_total_pages, PaginationController, PaginationRun, PaginationSummary, ReviewPageResult,
};
pub use pool::{TaskOutcome, TaskState, WorkerPool};
pub use retry::{FailureKind, RetryPolicy, Retryable, TaskFailure};
