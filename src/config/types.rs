use serde::Deserialize;

/// Main configuration structure for Tidemark
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,
    pub api: ApiConfig,
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub brands: BrandsConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Identity of the crawled source, recorded on every session
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_source_name")]
    pub name: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            name: default_source_name(),
        }
    }
}

/// Upstream API endpoints and transport settings
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Home payload endpoint (also carries the category menu)
    #[serde(rename = "home-url")]
    pub home_url: String,

    /// Listing endpoint template with `{category}` and `{page}` placeholders
    #[serde(rename = "listing-url")]
    pub listing_url: String,

    /// Product detail endpoint template with a `{product}` placeholder
    #[serde(rename = "product-url")]
    pub product_url: String,

    /// Review endpoint template with `{product}` and `{page}` placeholders
    #[serde(rename = "review-url")]
    pub review_url: String,

    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,

    /// Transport timeout per request (seconds)
    #[serde(rename = "request-timeout", default = "default_request_timeout")]
    pub request_timeout: u64,

    /// Reviews per page when the review payload does not say
    #[serde(rename = "review-page-size", default = "default_review_page_size")]
    pub review_page_size: u32,

    /// Category names whose subtree is never enumerated
    #[serde(rename = "excluded-categories", default)]
    pub excluded_categories: Vec<String>,
}

/// Worker pool and retry tuning
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    #[serde(rename = "listing-workers", default = "default_listing_workers")]
    pub listing_workers: u32,

    #[serde(rename = "product-workers", default = "default_product_workers")]
    pub product_workers: u32,

    #[serde(rename = "review-workers", default = "default_review_workers")]
    pub review_workers: u32,

    /// Total attempts per network call, first try included
    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay between attempts (milliseconds)
    #[serde(rename = "retry-delay", default = "default_retry_delay")]
    pub retry_delay: u64,

    #[serde(rename = "retry-backoff", default)]
    pub retry_backoff: BackoffKind,

    /// Review pages requested concurrently per product (1 = sequential)
    #[serde(rename = "review-page-batch", default = "default_review_page_batch")]
    pub review_page_batch: u32,

    /// Upper bound on listing pages walked per category
    #[serde(rename = "max-listing-pages", default = "default_max_listing_pages")]
    pub max_listing_pages: u32,

    /// Optional cap on review pages requested per product
    #[serde(rename = "max-review-pages", default)]
    pub max_review_pages: Option<u32>,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            listing_workers: default_listing_workers(),
            product_workers: default_product_workers(),
            review_workers: default_review_workers(),
            max_attempts: default_max_attempts(),
            retry_delay: default_retry_delay(),
            retry_backoff: BackoffKind::default(),
            review_page_batch: default_review_page_batch(),
            max_listing_pages: default_max_listing_pages(),
            max_review_pages: None,
        }
    }
}

/// How the delay between retry attempts grows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    /// Same delay before every retry
    #[default]
    Fixed,
    /// Delay multiplied by the attempt number
    Linear,
}

/// Brand allow-list location
#[derive(Debug, Clone, Deserialize)]
pub struct BrandsConfig {
    #[serde(default = "default_brands_file")]
    pub file: String,
}

impl Default for BrandsConfig {
    fn default() -> Self {
        Self {
            file: default_brands_file(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when no verbosity flag is given
    #[serde(default)]
    pub level: Option<String>,
}

fn default_source_name() -> String {
    "hasaki".to_string()
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_review_page_size() -> u32 {
    5
}

fn default_listing_workers() -> u32 {
    20
}

fn default_product_workers() -> u32 {
    15
}

fn default_review_workers() -> u32 {
    6
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    1000
}

fn default_review_page_batch() -> u32 {
    1
}

fn default_max_listing_pages() -> u32 {
    500
}

fn default_brands_file() -> String {
    "brands.txt".to_string()
}
