//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock shop servers and run the full
//! crawl cycle end-to-end: HTTP driver, selector extractor, SQLite
//! checkpoints and CSV output.

use catalog_harvest::config::{load_config_with_hash, Config};
use catalog_harvest::crawler::{run_crawl, Coordinator};
use catalog_harvest::output::finalize;
use catalog_harvest::storage::{open_storage, StateStore, STATE_DB_FILE};
use std::path::Path;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DATE: &str = "20240105";

/// Creates a test configuration crawling `categories` on the mock server
fn create_test_config(base_url: &str, output: &Path, categories: &[&str], window: &str) -> Config {
    let categories: String = categories
        .iter()
        .map(|name| {
            format!(
                "[[category]]\nname = \"{}\"\nurl = \"{}/c/{}\"\n\n",
                name,
                base_url,
                name.to_lowercase()
            )
        })
        .collect();

    let toml = format!(
        r#"
[site]
name = "shop"
date = "{DATE}"

[categories]
chunk-size = 2
{window}

{categories}

[products]
min-chunk-size = 1
max-chunk-size = 4

[network]
rate-limit = 100
period-ms = 1000
request-timeout-secs = 5

[output]
directory = "{output}"

[[column]]
field = "product_id"
header = "ID"

[[column]]
field = "name"
header = "Name"

[extract]
products = "li.item"
link = "a"
id-pattern = '/p/(\d+)'

[[extract.field]]
name = "name"
selector = "h1.name"
"#,
        output = output.display(),
    );

    toml::from_str(&toml).expect("test config should parse")
}

fn listing_html(ids: &[u32]) -> String {
    let items: String = ids
        .iter()
        .map(|id| format!(r#"<li class="item"><a href="/p/{id}">Product {id}</a></li>"#))
        .collect();
    format!("<html><body><ul class=\"grid\">{}</ul></body></html>", items)
}

fn product_html(id: u32) -> String {
    format!(r#"<html><body><h1 class="name">Product {id}</h1></body></html>"#)
}

async fn mount_listing(server: &MockServer, category: &str, page: u32, ids: &[u32], times: u64) {
    Mock::given(method("GET"))
        .and(path(format!("/c/{}", category)))
        .and(query_param("page", page.to_string()))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(listing_html(ids))
                .insert_header("content-type", "text/html"),
        )
        .expect(times)
        .mount(server)
        .await;
}

async fn mount_product(server: &MockServer, id: u32, times: u64) {
    Mock::given(method("GET"))
        .and(path(format!("/p/{}", id)))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(product_html(id))
                .insert_header("content-type", "text/html"),
        )
        .expect(times)
        .mount(server)
        .await;
}

fn read_page_csv(output: &Path, category: &str, page: u32) -> String {
    let file = output
        .join("shop")
        .join("temp")
        .join(DATE)
        .join(format!("products_shop_{}_{}_{}.csv", DATE, category, page));
    std::fs::read_to_string(file).expect("page CSV should exist")
}

#[tokio::test]
async fn test_interrupted_crawl_resumes_without_duplicates() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();
    let output = TempDir::new().unwrap();
    let config = create_test_config(&base_url, output.path(), &["Tents"], "");

    // First run: product 2 is broken, so page 1 cannot be checkpointed
    mount_listing(&mock_server, "tents", 1, &[1, 2], 1).await;
    mount_product(&mock_server, 1, 1).await;
    Mock::given(method("GET"))
        .and(path("/p/2"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&mock_server)
        .await;

    let first = Coordinator::from_config(config.clone(), "hash-1")
        .unwrap()
        .run()
        .await
        .unwrap();
    assert_eq!(first.products_done, 1);
    assert_eq!(first.products_failed, 1);
    assert_eq!(first.categories_failed, 1);
    assert_eq!(first.pages, 0);

    mock_server.verify().await;
    mock_server.reset().await;

    // Second run: the cached listing is reused and product 1 is skipped
    mount_listing(&mock_server, "tents", 1, &[1, 2], 0).await;
    mount_product(&mock_server, 1, 0).await;
    mount_product(&mock_server, 2, 1).await;
    mount_listing(&mock_server, "tents", 2, &[3], 1).await;
    mount_product(&mock_server, 3, 1).await;
    mount_listing(&mock_server, "tents", 3, &[], 1).await;

    let second = Coordinator::from_config(config.clone(), "hash-1")
        .unwrap()
        .run()
        .await
        .unwrap();
    assert_eq!(second.products_done, 2);
    assert_eq!(second.products_skipped, 1);
    assert_eq!(second.categories_done, 1);
    assert_eq!(second.pages, 2);

    mock_server.verify().await;

    let page1 = read_page_csv(output.path(), "Tents", 1);
    assert_eq!(page1.matches("ID,Name").count(), 1);
    assert_eq!(page1.matches("1,Product 1\n").count(), 1);
    assert_eq!(page1.matches("2,Product 2\n").count(), 1);
    assert_eq!(read_page_csv(output.path(), "Tents", 2), "ID,Name\n3,Product 3\n");

    // Third run: nothing left to do, nothing is requested
    mock_server.reset().await;
    let third = Coordinator::from_config(config, "hash-1")
        .unwrap()
        .run()
        .await
        .unwrap();
    assert_eq!(third.categories_skipped, 1);
    assert!(mock_server.received_requests().await.unwrap().is_empty());

    let storage = open_storage(&output.path().join("shop").join(STATE_DB_FILE)).unwrap();
    assert_eq!(storage.count_runs("shop", DATE).unwrap(), 3);
    let stats = storage.statistics("shop", DATE).unwrap();
    assert_eq!(stats.categories_done, 1);
    assert_eq!(stats.products_done, 3);
}

#[tokio::test]
async fn test_category_window_filter() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();
    let output = TempDir::new().unwrap();
    let config = create_test_config(
        &base_url,
        output.path(),
        &["A", "B", "C", "D", "E"],
        "start = \"B\"\nend = \"D\"",
    );

    for category in ["b", "c", "d"] {
        mount_listing(&mock_server, category, 1, &[], 1).await;
    }
    for category in ["a", "e"] {
        mount_listing(&mock_server, category, 1, &[], 0).await;
    }

    let summary = Coordinator::from_config(config, "hash")
        .unwrap()
        .run()
        .await
        .unwrap();
    assert_eq!(summary.categories_done, 3);

    mock_server.verify().await;

    // Categories outside the window never got a state
    let storage = open_storage(&output.path().join("shop").join(STATE_DB_FILE)).unwrap();
    let stats = storage.statistics("shop", DATE).unwrap();
    let names: Vec<&str> = stats.categories.iter().map(|(n, _, _)| n.as_str()).collect();
    assert_eq!(names, vec!["B", "C", "D"]);
}

#[tokio::test]
async fn test_zero_products_terminates_category() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();
    let output = TempDir::new().unwrap();
    let config = create_test_config(&base_url, output.path(), &["Tents"], "");

    mount_listing(&mock_server, "tents", 1, &[], 1).await;
    mount_listing(&mock_server, "tents", 2, &[7], 0).await;

    let summary = Coordinator::from_config(config, "hash")
        .unwrap()
        .run()
        .await
        .unwrap();
    assert_eq!(summary.categories_done, 1);
    assert_eq!(summary.pages, 0);
    assert_eq!(summary.products_done, 0);

    mock_server.verify().await;

    // The category is saved as done, so the next run never loads it
    let storage = open_storage(&output.path().join("shop").join(STATE_DB_FILE)).unwrap();
    let stats = storage.statistics("shop", DATE).unwrap();
    assert_eq!(stats.categories, vec![("Tents".to_string(), 1, true)]);
    assert!(storage
        .load_category_state("shop", "Tents", DATE, 1)
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_config_file_crawl_and_finalize() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("out");

    std::fs::write(
        dir.path().join("categories.txt"),
        format!("# name, url\nTents, {}/c/tents\nBags, {}/c/bags\n", base_url, base_url),
    )
    .unwrap();
    std::fs::write(
        dir.path().join("harvest.toml"),
        format!(
            r#"
[site]
name = "shop"
date = "{DATE}"

[categories]
file = "categories.txt"

[network]
rate-limit = 100

[output]
directory = "{}"
final-file = "all.csv"
dedup-columns = ["ID"]

[[column]]
field = "product_id"
header = "ID"

[[column]]
field = "name"
header = "Name"

[extract]
products = "li.item"
id-pattern = '/p/(\d+)'

[[extract.field]]
name = "name"
selector = "h1.name"
"#,
            output.display()
        ),
    )
    .unwrap();

    mount_listing(&mock_server, "tents", 1, &[1, 2], 1).await;
    mount_listing(&mock_server, "tents", 2, &[], 1).await;
    // Product 2 is listed in both categories
    mount_listing(&mock_server, "bags", 1, &[2, 3], 1).await;
    mount_listing(&mock_server, "bags", 2, &[], 1).await;
    mount_product(&mock_server, 1, 1).await;
    mount_product(&mock_server, 2, 2).await;
    mount_product(&mock_server, 3, 1).await;

    let (config, hash) = load_config_with_hash(&dir.path().join("harvest.toml")).unwrap();
    assert_eq!(config.category.len(), 2);

    let summary = run_crawl(config.clone(), hash).await.unwrap();
    assert_eq!(summary.categories_done, 2);
    assert_eq!(summary.products_done, 4);

    mock_server.verify().await;

    let report = finalize(&config, DATE).unwrap();
    assert_eq!(report.files, 2);
    assert_eq!(report.duplicates, 1);
    assert_eq!(
        std::fs::read_to_string(output.join("shop").join("all.csv")).unwrap(),
        "ID,Name\n1,Product 1\n2,Product 2\n3,Product 3\n"
    );

    let run_report =
        std::fs::read_to_string(output.join("shop").join("reports").join(format!("{}.txt", DATE)))
            .unwrap();
    assert!(run_report.starts_with("Run #1\n"));
}
