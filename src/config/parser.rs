use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Environment variables that replace endpoint templates after parsing
const ENV_OVERRIDES: [&str; 5] = ["HOME_API", "LISTING_API", "PRODUCT_API", "REVIEW_API", "LOG_LEVEL"];

/// Loads and parses a configuration file from the given path
///
/// Environment overrides are applied before validation, so an overridden
/// endpoint must still satisfy the template rules.
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use tidemark::config::load_config;
///
/// let config = load_config(Path::new("tidemark.toml")).unwrap();
/// println!("Review workers: {}", config.crawler.review_workers);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut config: Config = toml::from_str(&content)?;

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    validate(&config)?;

    Ok(config)
}

/// Replaces endpoint templates and the log level from the environment
///
/// The lookup is injected so tests do not have to mutate process state.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    for key in ENV_OVERRIDES {
        let Some(value) = lookup(key).filter(|v| !v.trim().is_empty()) else {
            continue;
        };

        tracing::debug!("Config override from environment: {}", key);
        match key {
            "HOME_API" => config.api.home_url = value,
            "LISTING_API" => config.api.listing_url = value,
            "PRODUCT_API" => config.api.product_url = value,
            "REVIEW_API" => config.api.review_url = value,
            "LOG_LEVEL" => config.logging.level = Some(value),
            _ => {}
        }
    }
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Recorded on each crawl session so runs made with different settings can
/// be told apart.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    Ok(hex::encode(result))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}
