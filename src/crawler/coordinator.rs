//! Crawler coordinator - phase orchestration
//!
//! This module drives both crawl phases, including:
//! - Opening and closing the crawl session of each phase
//! - Listing discovery: categories → leaf categories → listing pages →
//!   discovered product ids
//! - Detail crawl: home snapshot → product snapshots → review pages
//! - Folding task outcomes into session counters and the run summary
//!
//! Individual task failures never abort a phase. Only a failed prerequisite
//! (no categories, no leaf categories, no candidate products) closes the
//! session as failed and returns [`TidemarkError::Structural`].

use crate::api::{collect_leaf_categories, ApiClient, Category, HttpApiClient};
use crate::config::Config;
use crate::crawler::pagination::PaginationController;
use crate::crawler::pool::{TaskOutcome, WorkerPool};
use crate::crawler::retry::{RetryPolicy, TaskFailure};
use crate::output::{FailedItem, RunSummary};
use crate::state::{Counter, CrawlSession, PhaseKind, SessionStatus};
use crate::storage::{lock, share, SharedStorage, SqliteStorage, StorageError, WriteOutcome};
use crate::TidemarkError;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// What a detail run fetches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetailMode {
    /// Products, then their reviews
    Full,
    /// Product snapshots only
    Products,
    /// Reviews for the latest stored snapshot of each product
    Reviews,
}

impl DetailMode {
    pub fn phase_kind(self) -> PhaseKind {
        match self {
            Self::Full => PhaseKind::Combined,
            Self::Products => PhaseKind::Product,
            Self::Reviews => PhaseKind::Review,
        }
    }
}

/// Handles cloned into every task of a phase
#[derive(Clone)]
struct TaskContext {
    api: Arc<dyn ApiClient>,
    storage: SharedStorage,
    session: Arc<CrawlSession>,
    retry: RetryPolicy,
}

fn storage_failure(error: StorageError) -> TaskFailure {
    TaskFailure::fatal(format!("storage: {}", error))
}

/// Counts every outcome on the session and collects the failures
///
/// Returns the values of the successful tasks.
fn fold_outcomes<T>(
    session: &CrawlSession,
    outcomes: Vec<TaskOutcome<T>>,
    failures: &mut Vec<FailedItem>,
) -> Vec<T> {
    let mut values = Vec::with_capacity(outcomes.len());

    for outcome in outcomes {
        session.increment(Counter::Processed);
        match outcome.result {
            Ok(value) => values.push(value),
            Err(failure) => {
                session.increment(Counter::Failed);
                failures.push(FailedItem {
                    item: outcome.task_id,
                    reason: failure.to_string(),
                });
            }
        }
    }

    values
}

fn count_write(session: &CrawlSession, outcome: WriteOutcome) {
    if outcome.is_inserted() {
        session.increment(Counter::Inserted);
    } else {
        session.increment(Counter::Unchanged);
    }
}

/// Walks the listing pages of one leaf category
///
/// Stops at the first page without items, or at `max_pages`.
async fn scan_category(
    ctx: TaskContext,
    category: Category,
    max_pages: u32,
) -> Result<u64, TaskFailure> {
    let mut found = 0;

    for page in 1..=max_pages {
        let label = format!("category {} p{}", category.id, page);
        let listing = ctx
            .retry
            .execute(&label, || ctx.api.fetch_listing_page(&category, page))
            .await?;
        ctx.session.increment(Counter::ListingPages);

        {
            let mut storage = lock(&ctx.storage);
            for item in &listing.items {
                let is_new = storage
                    .upsert_discovered_product(
                        ctx.session.id(),
                        &item.product_id,
                        item.brand_id.as_deref(),
                    )
                    .map_err(storage_failure)?;
                ctx.session.increment(if is_new {
                    Counter::DiscoveredNew
                } else {
                    Counter::DiscoveredKnown
                });
            }
        }
        found += listing.items.len() as u64;

        if !listing.has_more {
            break;
        }
        if page == max_pages {
            tracing::warn!(
                "Category {} ({}) still had items at the {}-page limit",
                category.id,
                category.name,
                max_pages
            );
        }
    }

    ctx.session.increment(Counter::CategoriesScanned);
    tracing::debug!(
        "Category {} ({}): {} products listed",
        category.id,
        category.name,
        found
    );
    Ok(found)
}

/// Fetches and stores one product payload
///
/// Returns the product id with the id of the snapshot that now holds its
/// payload, whether freshly inserted or unchanged.
async fn fetch_product(ctx: TaskContext, product_id: String) -> Result<(String, i64), TaskFailure> {
    let label = format!("product {}", product_id);
    let payload = ctx
        .retry
        .execute(&label, || ctx.api.fetch_product_detail(&product_id))
        .await?;

    let outcome = lock(&ctx.storage)
        .write_product_snapshot(ctx.session.id(), &product_id, &payload)
        .map_err(storage_failure)?;
    count_write(&ctx.session, outcome);

    Ok((product_id, outcome.id()))
}

/// Paginates one product's reviews and stores the pages under `snapshot_id`
async fn fetch_reviews(
    ctx: TaskContext,
    controller: PaginationController,
    product_id: String,
    snapshot_id: i64,
) -> Result<u32, TaskFailure> {
    let run = match controller.run(&product_id).await {
        Ok(run) => run,
        Err(failure) => {
            ctx.session.increment(Counter::ReviewPagesFailed);
            return Err(failure);
        }
    };

    ctx.session
        .add(Counter::ReviewPagesFailed, u64::from(run.summary.failed));
    if run.summary.anomaly {
        ctx.session.increment(Counter::PaginationAnomalies);
        ctx.session
            .add(Counter::ReviewPagesSkipped, u64::from(run.summary.skipped));
    }

    {
        let mut storage = lock(&ctx.storage);
        for page in &run.pages {
            let outcome = storage
                .write_review_page(
                    ctx.session.id(),
                    snapshot_id,
                    &product_id,
                    page.page,
                    &page.payload,
                )
                .map_err(storage_failure)?;
            ctx.session.increment(if outcome.is_inserted() {
                Counter::ReviewPagesInserted
            } else {
                Counter::ReviewPagesUnchanged
            });
        }
    }
    ctx.session
        .add(Counter::ReviewPagesFetched, run.pages.len() as u64);

    Ok(run.summary.fetched)
}

/// Main crawler coordinator structure
pub struct Coordinator {
    config: Arc<Config>,
    config_hash: String,
    api: Arc<dyn ApiClient>,
    storage: SharedStorage,
    retry: RetryPolicy,
}

impl Coordinator {
    /// Creates a coordinator over the given API and storage
    ///
    /// # Arguments
    ///
    /// * `config` - The crawler configuration
    /// * `config_hash` - Hash of the configuration file, recorded on sessions
    /// * `api` - The upstream API
    /// * `storage` - The shared storage backend
    pub fn new(
        config: Config,
        config_hash: impl Into<String>,
        api: Arc<dyn ApiClient>,
        storage: SharedStorage,
    ) -> Self {
        let retry = RetryPolicy::from_config(&config.crawler);
        Self {
            config: Arc::new(config),
            config_hash: config_hash.into(),
            api,
            storage,
            retry,
        }
    }

    /// Creates a coordinator with the HTTP client and SQLite database the
    /// configuration names
    pub fn from_config(config: Config, config_hash: impl Into<String>) -> Result<Self, TidemarkError> {
        let api = HttpApiClient::new(config.api.clone())?;
        let storage = SqliteStorage::new(Path::new(&config.output.database_path))?;
        Ok(Self::new(config, config_hash, Arc::new(api), share(storage)))
    }

    pub fn storage(&self) -> &SharedStorage {
        &self.storage
    }

    fn context(&self, session: &Arc<CrawlSession>) -> TaskContext {
        TaskContext {
            api: Arc::clone(&self.api),
            storage: Arc::clone(&self.storage),
            session: Arc::clone(session),
            retry: self.retry,
        }
    }

    fn open_session(&self, phase: PhaseKind) -> Result<Arc<CrawlSession>, TidemarkError> {
        let id = lock(&self.storage).open_session(
            &self.config.source.name,
            phase,
            &self.config_hash,
        )?;
        tracing::info!("Opened {} session {}", phase, id);

        Ok(Arc::new(CrawlSession::new(
            id,
            self.config.source.name.clone(),
            phase,
        )))
    }

    fn close_session(&self, session: &CrawlSession, status: SessionStatus) -> Result<(), TidemarkError> {
        session.finish(status)?;
        lock(&self.storage).close_session(
            session.id(),
            status,
            session.get(Counter::Processed),
        )?;
        Ok(())
    }

    /// Closes the session as failed and builds the error for the caller
    fn fail_structurally(&self, session: &CrawlSession, reason: String) -> TidemarkError {
        tracing::error!("{} phase failed: {}", session.phase(), reason);
        if let Err(e) = self.close_session(session, SessionStatus::Failed) {
            tracing::error!("Failed to close session {}: {}", session.id(), e);
        }
        TidemarkError::Structural(reason)
    }

    fn finish_phase(
        &self,
        session: &CrawlSession,
        failures: Vec<FailedItem>,
    ) -> Result<RunSummary, TidemarkError> {
        self.close_session(session, SessionStatus::Completed)?;
        let summary = RunSummary::from_session(session, failures);
        summary.log();
        Ok(summary)
    }

    async fn leaf_categories(&self) -> Result<Vec<Category>, String> {
        let categories = self
            .retry
            .execute("categories", || self.api.fetch_categories())
            .await
            .map_err(|failure| format!("category fetch failed: {}", failure))?;

        let leaves = collect_leaf_categories(&categories, &self.config.api.excluded_categories);
        if leaves.is_empty() {
            return Err(format!(
                "no leaf categories among {} top-level categories",
                categories.len()
            ));
        }

        Ok(leaves)
    }

    /// Runs listing discovery
    ///
    /// # Returns
    ///
    /// * `Ok(RunSummary)` - The session closed as completed, possibly with
    ///   failed categories
    /// * `Err(TidemarkError::Structural)` - Categories could not be
    ///   fetched or contained no leaves; the session closed as failed
    pub async fn run_listing_phase(&self) -> Result<RunSummary, TidemarkError> {
        let session = self.open_session(PhaseKind::Listing)?;

        let leaves = match self.leaf_categories().await {
            Ok(leaves) => leaves,
            Err(reason) => return Err(self.fail_structurally(&session, reason)),
        };
        tracing::info!("Scanning {} leaf categories", leaves.len());

        let pool = WorkerPool::new("listing", self.config.crawler.listing_workers);
        let max_pages = self.config.crawler.max_listing_pages;
        let tasks = leaves.into_iter().map(|category| {
            let ctx = self.context(&session);
            (format!("category:{}", category.id), async move {
                scan_category(ctx, category, max_pages).await
            })
        });

        let mut failures = Vec::new();
        fold_outcomes(&session, pool.run(tasks).await, &mut failures);

        self.finish_phase(&session, failures)
    }

    /// Stores the home payload; failures are recorded, never fatal
    async fn snapshot_home(&self, session: &CrawlSession, failures: &mut Vec<FailedItem>) {
        session.increment(Counter::Processed);

        let result = match self.retry.execute("home", || self.api.fetch_home()).await {
            Ok(payload) => lock(&self.storage)
                .write_home_snapshot(session.id(), &payload)
                .map_err(storage_failure),
            Err(failure) => Err(failure),
        };

        match result {
            Ok(outcome) => count_write(session, outcome),
            Err(failure) => {
                session.increment(Counter::Failed);
                failures.push(FailedItem {
                    item: "home".to_string(),
                    reason: failure.to_string(),
                });
            }
        }
    }

    /// Looks up the latest stored snapshot of each product
    ///
    /// Products never snapshotted are skipped.
    fn stored_snapshots(
        &self,
        session: &CrawlSession,
        product_ids: Vec<String>,
        failures: &mut Vec<FailedItem>,
    ) -> Vec<(String, i64)> {
        let mut targets = Vec::with_capacity(product_ids.len());
        let mut missing = 0;

        for product_id in product_ids {
            let latest = lock(&self.storage).latest_product_snapshot_id(&product_id);
            match latest {
                Ok(Some(snapshot_id)) => targets.push((product_id, snapshot_id)),
                Ok(None) => missing += 1,
                Err(e) => {
                    session.increment(Counter::Processed);
                    session.increment(Counter::Failed);
                    failures.push(FailedItem {
                        item: format!("product:{}", product_id),
                        reason: format!("storage: {}", e),
                    });
                }
            }
        }

        if missing > 0 {
            tracing::info!("{} products have no stored snapshot yet; skipped", missing);
        }
        targets
    }

    /// Runs a detail crawl for the products of the given brands
    ///
    /// # Arguments
    ///
    /// * `mode` - Which payloads to fetch
    /// * `brand_ids` - The brand allow-list
    ///
    /// # Returns
    ///
    /// * `Ok(RunSummary)` - The session closed as completed, possibly with
    ///   failed products
    /// * `Err(TidemarkError::Structural)` - The allow-list is empty (no
    ///   session is opened) or matches no discovered product (the session
    ///   closed as failed)
    pub async fn run_detail_phase(
        &self,
        mode: DetailMode,
        brand_ids: &[String],
    ) -> Result<RunSummary, TidemarkError> {
        if brand_ids.is_empty() {
            return Err(TidemarkError::Structural(
                "brand allow-list is empty".to_string(),
            ));
        }

        let phase = mode.phase_kind();
        let session = self.open_session(phase)?;
        let mut failures = Vec::new();

        self.snapshot_home(&session, &mut failures).await;

        let candidates = lock(&self.storage).query_product_ids_by_brands(brand_ids);
        let candidates = match candidates {
            Ok(ids) if ids.is_empty() => {
                let reason = format!(
                    "no discovered products match the {} allowed brands",
                    brand_ids.len()
                );
                return Err(self.fail_structurally(&session, reason));
            }
            Ok(ids) => ids,
            Err(e) => {
                let reason = format!("candidate query failed: {}", e);
                return Err(self.fail_structurally(&session, reason));
            }
        };
        tracing::info!(
            "{} candidate products for {} brands",
            candidates.len(),
            brand_ids.len()
        );

        let targets = if phase.fetches_products() {
            let pool = WorkerPool::new("product", self.config.crawler.product_workers);
            let tasks = candidates.into_iter().map(|product_id| {
                let ctx = self.context(&session);
                (format!("product:{}", product_id), async move {
                    fetch_product(ctx, product_id).await
                })
            });
            fold_outcomes(&session, pool.run(tasks).await, &mut failures)
        } else {
            self.stored_snapshots(&session, candidates, &mut failures)
        };

        if phase.fetches_reviews() {
            let crawler = &self.config.crawler;
            let controller = PaginationController::new(Arc::clone(&self.api), self.retry)
                .with_batch_size(crawler.review_page_batch)
                .with_max_pages(crawler.max_review_pages);

            let pool = WorkerPool::new("review", crawler.review_workers);
            let tasks = targets.into_iter().map(|(product_id, snapshot_id)| {
                let ctx = self.context(&session);
                let controller = controller.clone();
                (format!("reviews:{}", product_id), async move {
                    fetch_reviews(ctx, controller, product_id, snapshot_id).await
                })
            });
            fold_outcomes(&session, pool.run(tasks).await, &mut failures);
        }

        self.finish_phase(&session, failures)
    }

    /// Samples listing pages to find brand ids and names
    ///
    /// Reads the first listing page of the first `sample_categories` leaf
    /// categories. No session is opened and nothing is stored.
    pub async fn discover_brands(
        &self,
        sample_categories: usize,
    ) -> Result<BTreeMap<u64, String>, TidemarkError> {
        let leaves = self
            .leaf_categories()
            .await
            .map_err(TidemarkError::Structural)?;

        let mut brands = BTreeMap::new();
        for category in leaves.iter().take(sample_categories) {
            let label = format!("category {} p1", category.id);
            let page = match self
                .retry
                .execute(&label, || self.api.fetch_listing_page(category, 1))
                .await
            {
                Ok(page) => page,
                Err(failure) => {
                    tracing::warn!("Skipping category {}: {}", category.id, failure);
                    continue;
                }
            };

            for item in page.items {
                let Some(brand_id) = item.brand_id.and_then(|id| id.parse::<u64>().ok()) else {
                    continue;
                };
                brands
                    .entry(brand_id)
                    .or_insert_with(|| item.brand_name.unwrap_or_default());
            }
        }

        tracing::info!(
            "Found {} brands in {} categories",
            brands.len(),
            sample_categories.min(leaves.len())
        );
        Ok(brands)
    }
}
