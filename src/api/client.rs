//! HTTP implementation of the API capability
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building the HTTP client with the configured user agent and timeout
//! - Expanding endpoint templates
//! - Classifying transport and status failures as transient or fatal
//! - Decoding JSON bodies

use crate::api::parse::{parse_categories, parse_listing_page, parse_review_page};
use crate::api::{ApiClient, ApiError, Category, ListingPage, ReviewPage};
use crate::config::ApiConfig;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The API configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(config: &ApiConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(Duration::from_secs(config.request_timeout))
        .connect_timeout(Duration::from_secs(config.request_timeout.min(10)))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Maps a response status to a failure, if it is one
///
/// | Condition | Classification |
/// |-----------|----------------|
/// | 2xx | success |
/// | 429 | transient |
/// | 5xx | transient |
/// | anything else | fatal status |
fn classify_status(url: &str, status: StatusCode) -> Option<ApiError> {
    if status.is_success() {
        None
    } else if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        Some(ApiError::Transient {
            url: url.to_string(),
            message: format!("HTTP {}", status.as_u16()),
        })
    } else {
        Some(ApiError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        })
    }
}

fn classify_transport(url: &str, error: reqwest::Error) -> ApiError {
    if error.is_builder() {
        return ApiError::Malformed {
            url: url.to_string(),
            message: format!("invalid request: {}", error),
        };
    }

    let message = if error.is_timeout() {
        "Request timeout".to_string()
    } else if error.is_connect() {
        "Connection failed".to_string()
    } else {
        error.to_string()
    };

    ApiError::Transient {
        url: url.to_string(),
        message,
    }
}

/// API client speaking JSON over HTTP
pub struct HttpApiClient {
    client: Client,
    config: ApiConfig,
}

impl HttpApiClient {
    /// Creates a client for the configured endpoints
    pub fn new(config: ApiConfig) -> Result<Self, reqwest::Error> {
        let client = build_http_client(&config)?;
        Ok(Self { client, config })
    }

    fn listing_url(&self, category_id: &str, page: u32) -> String {
        self.config
            .listing_url
            .replace("{category}", category_id)
            .replace("{page}", &page.to_string())
    }

    fn product_url(&self, product_id: &str) -> String {
        self.config.product_url.replace("{product}", product_id)
    }

    fn review_url(&self, product_id: &str, page: u32) -> String {
        self.config
            .review_url
            .replace("{product}", product_id)
            .replace("{page}", &page.to_string())
    }

    /// Fetches a URL and decodes its body as JSON
    async fn get_json(&self, url: &str) -> Result<Value, ApiError> {
        tracing::debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| classify_transport(url, e))?;

        if let Some(error) = classify_status(url, response.status()) {
            return Err(error);
        }

        let body = response
            .text()
            .await
            .map_err(|e| classify_transport(url, e))?;

        serde_json::from_str(&body).map_err(|e| ApiError::Malformed {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl ApiClient for HttpApiClient {
    async fn fetch_home(&self) -> Result<Value, ApiError> {
        self.get_json(&self.config.home_url).await
    }

    async fn fetch_categories(&self) -> Result<Vec<Category>, ApiError> {
        let home = self.fetch_home().await?;
        parse_categories(&self.config.home_url, &home)
    }

    async fn fetch_listing_page(
        &self,
        category: &Category,
        page: u32,
    ) -> Result<ListingPage, ApiError> {
        let url = self.listing_url(&category.id, page);
        let body = self.get_json(&url).await?;
        parse_listing_page(&url, &body)
    }

    async fn fetch_product_detail(&self, product_id: &str) -> Result<Value, ApiError> {
        self.get_json(&self.product_url(product_id)).await
    }

    async fn fetch_review_page(&self, product_id: &str, page: u32) -> Result<ReviewPage, ApiError> {
        let url = self.review_url(product_id, page);
        let body = self.get_json(&url).await?;
        parse_review_page(&url, body, self.config.review_page_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_test_config(base: &str) -> ApiConfig {
        ApiConfig {
            home_url: format!("{}/home", base),
            listing_url: format!("{}/listing?cate={{category}}&p={{page}}", base),
            product_url: format!("{}/product/{{product}}", base),
            review_url: format!("{}/reviews?product={{product}}&p={{page}}", base),
            user_agent: "TidemarkTest/1.0".to_string(),
            request_timeout: 5,
            review_page_size: 5,
            excluded_categories: vec![],
        }
    }

    #[test]
    fn test_build_http_client() {
        let config = create_test_config("https://example.com");
        assert!(build_http_client(&config).is_ok());
    }

    #[test]
    fn test_template_expansion() {
        let client = HttpApiClient::new(create_test_config("https://example.com")).unwrap();
        assert_eq!(
            client.listing_url("12", 3),
            "https://example.com/listing?cate=12&p=3"
        );
        assert_eq!(client.product_url("99"), "https://example.com/product/99");
        assert_eq!(
            client.review_url("99", 2),
            "https://example.com/reviews?product=99&p=2"
        );
    }

    #[test]
    fn test_classify_status() {
        assert!(classify_status("u", StatusCode::OK).is_none());
        assert!(classify_status("u", StatusCode::TOO_MANY_REQUESTS)
            .unwrap()
            .is_transient());
        assert!(classify_status("u", StatusCode::BAD_GATEWAY)
            .unwrap()
            .is_transient());
        assert!(matches!(
            classify_status("u", StatusCode::NOT_FOUND),
            Some(ApiError::Status { status: 404, .. })
        ));
    }

    #[tokio::test]
    async fn test_fetch_review_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/reviews"))
            .and(query_param("product", "7"))
            .and(query_param("p", "1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"data": {"total": 12, "reviews": [{"id": 1}]}})),
            )
            .mount(&server)
            .await;

        let client = HttpApiClient::new(create_test_config(&server.uri())).unwrap();
        let page = client.fetch_review_page("7", 1).await.unwrap();
        assert_eq!(page.total, 12);
        assert_eq!(page.page_size, 5);
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/product/1"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/product/2"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = HttpApiClient::new(create_test_config(&server.uri())).unwrap();
        assert!(client
            .fetch_product_detail("1")
            .await
            .unwrap_err()
            .is_transient());
        assert!(matches!(
            client.fetch_product_detail("2").await,
            Err(ApiError::Status { status: 404, .. })
        ));
    }

    #[tokio::test]
    async fn test_invalid_json_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/home"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .mount(&server)
            .await;

        let client = HttpApiClient::new(create_test_config(&server.uri())).unwrap();
        assert!(matches!(
            client.fetch_categories().await,
            Err(ApiError::Malformed { .. })
        ));
    }
}
