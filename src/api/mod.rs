//! Upstream API access
//!
//! This module contains:
//! - The [`ApiClient`] capability the crawl engine consumes
//! - The payload types it returns (categories, listing pages, review pages)
//! - Error classification into transient and fatal failures
//! - An HTTP implementation built on `reqwest`

mod client;
mod parse;

pub use client::{build_http_client, HttpApiClient};
pub use parse::{collect_leaf_categories, parse_categories, parse_listing_page, parse_review_page};

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Failure of a single upstream call
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// Timeout, connection reset, socket failure, throttling or a 5xx
    #[error("Transient network error for {url}: {message}")]
    Transient { url: String, message: String },

    /// A non-success status that will not change on retry
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    /// The response did not have the expected shape
    #[error("Malformed payload from {url}: {message}")]
    Malformed { url: String, message: String },
}

impl ApiError {
    /// Returns true if retrying the call may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// A node of the site's category tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub children: Vec<Category>,
}

impl Category {
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// A product reference found on a listing page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingItem {
    pub product_id: String,
    pub brand_id: Option<String>,
    pub brand_name: Option<String>,
}

/// One page of a category listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingPage {
    pub items: Vec<ListingItem>,
    pub has_more: bool,
}

/// One page of a product's reviews
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewPage {
    /// The full response body
    pub payload: Value,
    /// Review count reported by the API
    pub total: u64,
    /// Reviews per page
    pub page_size: u32,
}

/// The upstream API capability
///
/// Every call either returns a decoded payload or a classified [`ApiError`];
/// retrying is the caller's business.
#[async_trait]
pub trait ApiClient: Send + Sync {
    async fn fetch_home(&self) -> Result<Value, ApiError>;

    async fn fetch_categories(&self) -> Result<Vec<Category>, ApiError>;

    async fn fetch_listing_page(&self, category: &Category, page: u32)
        -> Result<ListingPage, ApiError>;

    async fn fetch_product_detail(&self, product_id: &str) -> Result<Value, ApiError>;

    async fn fetch_review_page(&self, product_id: &str, page: u32) -> Result<ReviewPage, ApiError>;
}
