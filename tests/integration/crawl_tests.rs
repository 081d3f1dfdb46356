//! Integration tests for the crawler
//!
//! These tests use wiremock to create a mock shop API and run both crawl
//! phases end-to-end through the HTTP client and a SQLite database file.

use serde_json::{json, Value};
use std::io::Write;
use std::path::Path;
use tempfile::{NamedTempFile, TempDir};
use tidemark::config::{load_brand_ids, load_config};
use tidemark::crawler::{Coordinator, DetailMode};
use tidemark::storage::lock;
use tidemark::{SessionStatus, TidemarkError};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Writes a config file pointing every endpoint at the mock server
fn write_config(base_url: &str, db_path: &Path) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create config file");
    write!(
        file,
        r#"
[source]
name = "test-shop"

[api]
home-url = "{base}/home"
listing-url = "{base}/listing?cate={{category}}&p={{page}}"
product-url = "{base}/product/{{product}}"
review-url = "{base}/reviews?product={{product}}&p={{page}}"
review-page-size = 5
excluded-categories = ["Gift Cards"]

[crawler]
listing-workers = 2
product-workers = 2
review-workers = 2
max-attempts = 2
retry-delay = 1

[output]
database-path = "{db}"
"#,
        base = base_url,
        db = db_path.display()
    )
    .expect("Failed to write config file");
    file
}

fn home_payload() -> Value {
    json!({
        "cate_menu": [
            {"id": 1, "name": "Skincare", "child": [
                {"id": 11, "name": "Cleansers", "child": []},
                {"id": 12, "name": "Serums", "child": []}
            ]},
            {"id": 9, "name": "Gift Cards", "child": []}
        ]
    })
}

async fn mount_json(server: &MockServer, route: &str, query: &[(&str, &str)], body: Value) {
    let mut mock = Mock::given(method("GET")).and(path(route));
    for (key, value) in query {
        mock = mock.and(query_param(*key, *value));
    }
    mock.respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Mounts the home and listing endpoints: products 100 and 101 of brand 7,
/// product 200 of brand 8
async fn mount_catalogue(server: &MockServer) {
    mount_json(server, "/home", &[], home_payload()).await;

    let listing = |items: Value| json!({"listing": items});
    mount_json(
        server,
        "/listing",
        &[("cate", "11"), ("p", "1")],
        listing(json!([
            {"id": 100, "brand": {"id": 7, "name": "CeraVe"}},
            {"id": 101, "brand": {"id": 7, "name": "CeraVe"}}
        ])),
    )
    .await;
    mount_json(server, "/listing", &[("cate", "11"), ("p", "2")], listing(json!([]))).await;
    mount_json(
        server,
        "/listing",
        &[("cate", "12"), ("p", "1")],
        listing(json!([
            {"id": 200, "brand": {"id": 8, "name": "La Roche-Posay"}},
            {"id": 100, "brand": {"id": 7, "name": "CeraVe"}}
        ])),
    )
    .await;
    mount_json(server, "/listing", &[("cate", "12"), ("p", "2")], listing(json!([]))).await;
}

/// Mounts product and review endpoints for products 100 and 101
///
/// Product 100 has 7 reviews over two pages, product 101 has none.
async fn mount_details(server: &MockServer) {
    mount_json(server, "/product/100", &[], json!({"id": 100, "price": 199000})).await;
    mount_json(server, "/product/101", &[], json!({"id": 101, "price": 99000})).await;

    mount_json(
        server,
        "/reviews",
        &[("product", "100"), ("p", "1")],
        json!({"data": {"total": 7, "reviews": [1, 2, 3, 4, 5]}}),
    )
    .await;
    mount_json(
        server,
        "/reviews",
        &[("product", "100"), ("p", "2")],
        json!({"data": {"total": 7, "reviews": [6, 7]}}),
    )
    .await;
    mount_json(
        server,
        "/reviews",
        &[("product", "101"), ("p", "1")],
        json!({"data": {"total": 0, "reviews": []}}),
    )
    .await;
}

fn create_coordinator(config_file: &NamedTempFile) -> Coordinator {
    let config = load_config(config_file.path()).expect("Failed to load config");
    Coordinator::from_config(config, "test-hash").expect("Failed to create coordinator")
}

#[tokio::test]
async fn test_listing_phase_end_to_end() {
    let mock_server = MockServer::start().await;
    mount_catalogue(&mock_server).await;

    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let config_file = write_config(&mock_server.uri(), &db_path);
    let coordinator = create_coordinator(&config_file);

    let summary = coordinator.run_listing_phase().await.unwrap();

    assert!(summary.is_success());
    // "Gift Cards" is excluded, so only the two Skincare leaves are scanned
    assert_eq!(summary.metrics.categories_scanned, 2);
    assert_eq!(summary.metrics.listing_pages, 4);
    assert_eq!(summary.metrics.discovered_new, 3);
    assert_eq!(summary.metrics.discovered_known, 1);

    let storage = lock(coordinator.storage());
    assert_eq!(storage.count_discovered_products().unwrap(), 3);
    assert_eq!(
        storage
            .query_product_ids_by_brands(&["7".to_string()])
            .unwrap(),
        vec!["100".to_string(), "101".to_string()]
    );

    let session = &storage.recent_sessions(1).unwrap()[0];
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.source_name, "test-shop");
    assert_eq!(session.config_hash, "test-hash");
    assert_eq!(session.processed_items, 2);
}

#[tokio::test]
async fn test_detail_phase_end_to_end() {
    let mock_server = MockServer::start().await;
    mount_catalogue(&mock_server).await;
    mount_details(&mock_server).await;

    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let config_file = write_config(&mock_server.uri(), &db_path);
    let coordinator = create_coordinator(&config_file);

    let mut brands_file = NamedTempFile::new().unwrap();
    writeln!(brands_file, "# Allowed brands").unwrap();
    writeln!(brands_file, "7    # CeraVe").unwrap();
    let brand_ids = load_brand_ids(brands_file.path()).unwrap();

    coordinator.run_listing_phase().await.unwrap();
    let summary = coordinator
        .run_detail_phase(DetailMode::Full, &brand_ids)
        .await
        .unwrap();

    assert!(summary.is_success());
    assert!(summary.failures.is_empty());
    // Home plus two products
    assert_eq!(summary.metrics.inserted, 3);
    assert_eq!(summary.metrics.review_pages_fetched, 3);
    assert_eq!(summary.metrics.pagination_anomalies, 0);

    let storage = lock(coordinator.storage());
    assert_eq!(storage.count_product_snapshots().unwrap(), 2);
    assert_eq!(storage.count_review_pages().unwrap(), 3);
    assert!(storage.latest_product_snapshot_id("100").unwrap().is_some());
}

#[tokio::test]
async fn test_detail_rerun_is_idempotent() {
    let mock_server = MockServer::start().await;
    mount_catalogue(&mock_server).await;
    mount_details(&mock_server).await;

    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let config_file = write_config(&mock_server.uri(), &db_path);
    let coordinator = create_coordinator(&config_file);
    let brand_ids = vec!["7".to_string()];

    coordinator.run_listing_phase().await.unwrap();
    coordinator
        .run_detail_phase(DetailMode::Full, &brand_ids)
        .await
        .unwrap();
    let rerun = coordinator
        .run_detail_phase(DetailMode::Full, &brand_ids)
        .await
        .unwrap();

    assert!(rerun.is_success());
    assert_eq!(rerun.metrics.inserted, 0);
    assert_eq!(rerun.metrics.unchanged, 3);
    assert_eq!(rerun.metrics.failed, 0);
    assert_eq!(rerun.metrics.review_pages_fetched, 3);
    assert_eq!(rerun.metrics.review_pages_inserted, 0);
    assert_eq!(rerun.metrics.review_pages_unchanged, 3);

    let storage = lock(coordinator.storage());
    assert_eq!(storage.count_product_snapshots().unwrap(), 2);
    assert_eq!(storage.count_review_pages().unwrap(), 3);
}

#[tokio::test]
async fn test_repeated_review_page_stops_pagination() {
    let mock_server = MockServer::start().await;
    mount_catalogue(&mock_server).await;
    mount_json(&mock_server, "/product/200", &[], json!({"id": 200})).await;

    // 15 reviews means 3 pages, but page 2 repeats page 1
    let repeated = json!({"data": {"total": 15, "reviews": [1, 2, 3, 4, 5]}});
    mount_json(
        &mock_server,
        "/reviews",
        &[("product", "200"), ("p", "1")],
        repeated.clone(),
    )
    .await;
    mount_json(
        &mock_server,
        "/reviews",
        &[("product", "200"), ("p", "2")],
        repeated,
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/reviews"))
        .and(query_param("product", "200"))
        .and(query_param("p", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"total": 15}})))
        .expect(0)
        .mount(&mock_server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let config_file = write_config(&mock_server.uri(), &db_path);
    let coordinator = create_coordinator(&config_file);

    coordinator.run_listing_phase().await.unwrap();
    let summary = coordinator
        .run_detail_phase(DetailMode::Full, &["8".to_string()])
        .await
        .unwrap();

    assert!(summary.is_success());
    assert_eq!(summary.metrics.pagination_anomalies, 1);
    assert_eq!(summary.metrics.review_pages_fetched, 1);
    assert_eq!(
        lock(coordinator.storage()).count_review_pages().unwrap(),
        1
    );
}

#[tokio::test]
async fn test_category_failure_fails_session() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/home"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&mock_server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let config_file = write_config(&mock_server.uri(), &db_path);
    let coordinator = create_coordinator(&config_file);

    let result = coordinator.run_listing_phase().await;
    assert!(matches!(result, Err(TidemarkError::Structural(_))));

    let storage = lock(coordinator.storage());
    let session = &storage.recent_sessions(1).unwrap()[0];
    assert_eq!(session.status, SessionStatus::Failed);
    assert!(session.finished_at.is_some());
}

#[tokio::test]
async fn test_failed_product_does_not_fail_phase() {
    let mock_server = MockServer::start().await;
    mount_catalogue(&mock_server).await;
    mount_details(&mock_server).await;
    Mock::given(method("GET"))
        .and(path("/product/200"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let config_file = write_config(&mock_server.uri(), &db_path);
    let coordinator = create_coordinator(&config_file);

    coordinator.run_listing_phase().await.unwrap();
    let summary = coordinator
        .run_detail_phase(DetailMode::Products, &["7".to_string(), "8".to_string()])
        .await
        .unwrap();

    assert!(summary.is_success());
    assert_eq!(summary.metrics.failed, 1);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].item, "product:200");
    assert!(summary.failures[0].reason.contains("404"));
    assert_eq!(
        lock(coordinator.storage())
            .count_product_snapshots()
            .unwrap(),
        2
    );
}

#[tokio::test]
async fn test_find_brands() {
    let mock_server = MockServer::start().await;
    mount_catalogue(&mock_server).await;

    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let config_file = write_config(&mock_server.uri(), &db_path);
    let coordinator = create_coordinator(&config_file);

    let brands = coordinator.discover_brands(10).await.unwrap();

    assert_eq!(brands.len(), 2);
    assert_eq!(brands.get(&7).map(String::as_str), Some("CeraVe"));
    assert_eq!(brands.get(&8).map(String::as_str), Some("La Roche-Posay"));
}
