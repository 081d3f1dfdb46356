use crate::config::types::{ApiConfig, Config, CrawlerConfig};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.source.name.trim().is_empty() {
        return Err(ConfigError::Validation(
            "source name cannot be empty".to_string(),
        ));
    }

    validate_api_config(&config.api)?;
    validate_crawler_config(&config.crawler)?;

    if config.output.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates endpoint templates and transport settings
fn validate_api_config(config: &ApiConfig) -> Result<(), ConfigError> {
    validate_template("home-url", &config.home_url, &[])?;
    validate_template("listing-url", &config.listing_url, &["{category}", "{page}"])?;
    validate_template("product-url", &config.product_url, &["{product}"])?;
    validate_template("review-url", &config.review_url, &["{product}", "{page}"])?;

    if config.request_timeout == 0 {
        return Err(ConfigError::Validation(
            "request_timeout must be >= 1 second".to_string(),
        ));
    }

    if config.review_page_size == 0 {
        return Err(ConfigError::Validation(
            "review_page_size must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Checks that a template carries its placeholders and yields a valid URL
fn validate_template(name: &str, template: &str, placeholders: &[&str]) -> Result<(), ConfigError> {
    for placeholder in placeholders {
        if !template.contains(placeholder) {
            return Err(ConfigError::Validation(format!(
                "{} must contain the {} placeholder, got '{}'",
                name, placeholder, template
            )));
        }
    }

    let sample = placeholders
        .iter()
        .fold(template.to_string(), |acc, p| acc.replace(p, "1"));

    let url = Url::parse(&sample)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {}: {}", name, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "{} must use http or https, got '{}'",
            name,
            url.scheme()
        )));
    }

    Ok(())
}

/// Validates worker pool and retry settings
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    for (name, workers) in [
        ("listing_workers", config.listing_workers),
        ("product_workers", config.product_workers),
        ("review_workers", config.review_workers),
    ] {
        if !(1..=100).contains(&workers) {
            return Err(ConfigError::Validation(format!(
                "{} must be between 1 and 100, got {}",
                name, workers
            )));
        }
    }

    if !(1..=10).contains(&config.max_attempts) {
        return Err(ConfigError::Validation(format!(
            "max_attempts must be between 1 and 10, got {}",
            config.max_attempts
        )));
    }

    if config.review_page_batch < 1 || config.review_page_batch > config.review_workers {
        return Err(ConfigError::Validation(format!(
            "review_page_batch must be between 1 and review_workers ({}), got {}",
            config.review_workers, config.review_page_batch
        )));
    }

    if config.max_listing_pages < 1 {
        return Err(ConfigError::Validation(
            "max_listing_pages must be >= 1".to_string(),
        ));
    }

    if config.max_review_pages == Some(0) {
        return Err(ConfigError::Validation(
            "max_review_pages must be >= 1 when set".to_string(),
        ));
    }

    Ok(())
}
