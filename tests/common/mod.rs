//! Common test utilities for fetch-pool integration tests

use std::time::Duration;

use fetch_pool::{Config, FetchConfig, PoolConfig, RetryConfig};
use serde::Deserialize;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Payload served by the mock endpoints
#[derive(Debug, Deserialize, PartialEq)]
pub struct Item {
    pub id: usize,
}

/// Config with short delays so retry tests stay fast
pub fn fast_config(limit: usize, max_retries: u32) -> Config {
    Config {
        retry: RetryConfig {
            max_retries,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(1),
            ..RetryConfig::default()
        },
        pool: PoolConfig {
            limit,
            deadline: None,
        },
        fetch: FetchConfig {
            timeout: Duration::from_secs(5),
            ..FetchConfig::default()
        },
    }
}

/// URLs `/item/0` through `/item/{count - 1}` on `server`
pub fn item_urls(server: &MockServer, count: usize) -> Vec<String> {
    (0..count)
        .map(|i| format!("{}/item/{i}", server.uri()))
        .collect()
}

/// Serve `{"id": index}` at `/item/{index}`, optionally after `delay`
pub async fn mount_item(server: &MockServer, index: usize, delay: Option<Duration>) {
    let mut template = ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": index }));
    if let Some(delay) = delay {
        template = template.set_delay(delay);
    }
    Mock::given(method("GET"))
        .and(path(format!("/item/{index}")))
        .respond_with(template)
        .mount(server)
        .await;
}

/// Answer `/item/{index}` with `status` for the first `times` requests
pub async fn mount_failures(server: &MockServer, index: usize, status: u16, times: u64) {
    Mock::given(method("GET"))
        .and(path(format!("/item/{index}")))
        .respond_with(ResponseTemplate::new(status))
        .up_to_n_times(times)
        .mount(server)
        .await;
}

/// Number of requests `server` received for `/item/{index}`
pub async fn requests_for(server: &MockServer, index: usize) -> usize {
    let target = format!("/item/{index}");
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == target)
        .count()
}
