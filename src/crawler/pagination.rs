//! Review pagination with the repeat-page guard
//!
//! The review endpoint never reports "no more pages". Asked for a page past
//! the end, it answers with the last page again. The controller therefore:
//! - Reads the review count from page 1 and fixes `total_pages` once
//! - Requests pages `2..=total_pages` in increasing order, optionally in
//!   small concurrent batches that are still evaluated in page order
//! - Stops early when a page repeats the page fetched just before it while
//!   more pages were expected (a pagination anomaly)
//! - Skips individual pages that fail after retries and keeps going

use crate::api::ApiClient;
use crate::crawler::retry::{RetryPolicy, TaskFailure};
use futures::future::join_all;
use serde_json::Value;
use std::sync::Arc;

/// Number of pages needed for `total` reviews, never less than 1
pub fn compute_total_pages(total: u64, page_size: u32) -> u32 {
    let page_size = u64::from(page_size.max(1));
    let pages = total.div_ceil(page_size).max(1);
    u32::try_from(pages).unwrap_or(u32::MAX)
}

/// One successfully fetched review page
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewPageResult {
    pub product_id: String,
    /// 1-based page number
    pub page: u32,
    /// Page count fixed when the run started
    pub total_pages: u32,
    pub payload: Value,
}

/// Counters for one product's pagination run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PaginationSummary {
    pub total_pages: u32,
    pub fetched: u32,
    /// Pages that failed after retries
    pub failed: u32,
    /// Pages never emitted because the repeat guard stopped the run
    pub skipped: u32,
    pub anomaly: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaginationRun {
    /// Fetched pages in increasing page order
    pub pages: Vec<ReviewPageResult>,
    pub summary: PaginationSummary,
}

/// Fetches every review page of a product
#[derive(Clone)]
pub struct PaginationController {
    api: Arc<dyn ApiClient>,
    retry: RetryPolicy,
    batch_size: u32,
    max_pages: Option<u32>,
}

impl PaginationController {
    pub fn new(api: Arc<dyn ApiClient>, retry: RetryPolicy) -> Self {
        Self {
            api,
            retry,
            batch_size: 1,
            max_pages: None,
        }
    }

    /// Requests up to `batch_size` pages concurrently (1 = strictly sequential)
    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Never requests more than `max_pages` pages per product
    pub fn with_max_pages(mut self, max_pages: Option<u32>) -> Self {
        self.max_pages = max_pages.map(|m| m.max(1));
        self
    }

    /// Fetches one page through the retry policy
    async fn fetch_page(&self, product_id: &str, page: u32) -> Result<(Value, u64, u32), TaskFailure> {
        let label = format!("reviews {} p{}", product_id, page);
        let result = self
            .retry
            .execute(&label, || self.api.fetch_review_page(product_id, page))
            .await?;
        Ok((result.payload, result.total, result.page_size))
    }

    /// Runs pagination for one product
    ///
    /// # Returns
    ///
    /// * `Ok(PaginationRun)` - Pages fetched so far and the run summary,
    ///   including runs truncated by the repeat guard
    /// * `Err(TaskFailure)` - Page 1 could not be fetched, so the page count
    ///   is unknown
    pub async fn run(&self, product_id: &str) -> Result<PaginationRun, TaskFailure> {
        let (first, total, page_size) = self.fetch_page(product_id, 1).await?;

        let mut total_pages = compute_total_pages(total, page_size);
        if let Some(cap) = self.max_pages {
            if cap < total_pages {
                tracing::debug!(
                    "Product {} has {} review pages, capped at {}",
                    product_id,
                    total_pages,
                    cap
                );
                total_pages = cap;
            }
        }

        let mut summary = PaginationSummary {
            total_pages,
            ..PaginationSummary::default()
        };
        let mut pages = vec![ReviewPageResult {
            product_id: product_id.to_string(),
            page: 1,
            total_pages,
            payload: first,
        }];

        let mut next = 2;
        'paging: while next <= total_pages {
            let last = next.saturating_add(self.batch_size - 1).min(total_pages);
            let fetched = join_all((next..=last).map(|page| async move {
                (page, self.fetch_page(product_id, page).await)
            }))
            .await;

            for (page, result) in fetched {
                let payload = match result {
                    Ok((payload, _, _)) => payload,
                    Err(failure) => {
                        tracing::warn!(
                            "Review page {} of product {} skipped: {}",
                            page,
                            product_id,
                            failure
                        );
                        summary.failed += 1;
                        continue;
                    }
                };

                let repeats_previous = pages.last().is_some_and(|prev| prev.payload == payload);
                if repeats_previous && page < total_pages {
                    tracing::warn!(
                        "Pagination anomaly for product {}: page {} repeats page {} (expected {} pages)",
                        product_id,
                        page,
                        pages.last().map_or(0, |prev| prev.page),
                        total_pages
                    );
                    summary.anomaly = true;
                    summary.skipped = total_pages - page + 1;
                    break 'paging;
                }

                pages.push(ReviewPageResult {
                    product_id: product_id.to_string(),
                    page,
                    total_pages,
                    payload,
                });
            }

            next = last + 1;
        }

        summary.fetched = pages.len() as u32;
        tracing::debug!(
            "Product {}: {}/{} review pages fetched",
            product_id,
            summary.fetched,
            total_pages
        );

        Ok(PaginationRun { pages, summary })
    }
}
