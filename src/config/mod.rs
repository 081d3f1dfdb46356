//! Configuration module for Tidemark
//!
//! This module handles loading, parsing, and validating TOML configuration
//! files, plus the brand allow-list consumed by the detail phase.
//!
//! # Example
//!
//! ```no_run
//! use tidemark::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("tidemark.toml")).unwrap();
//! println!("Product workers: {}", config.crawler.product_workers);
//! ```

mod brands;
mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    ApiConfig, BackoffKind, BrandsConfig, Config, CrawlerConfig, LoggingConfig, OutputConfig,
    SourceConfig,
};

// Re-export parser functions
pub use brands::{load_brand_ids, parse_brand_ids};
pub use parser::{apply_env_overrides, compute_config_hash, load_config, load_config_with_hash};
