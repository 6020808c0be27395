//! HTTP fetching on top of the retry wrapper and the task pool
//!
//! [`Fetcher`] performs single, classified GET requests. [`fetch_all_json`]
//! is the batch entry point: every URL becomes one retrying task and the
//! tasks run through a [`TaskPool`].

use serde::de::DeserializeOwned;
use url::Url;

use crate::config::{Config, FetchConfig, RetryConfig};
use crate::error::{Error, Result, RetryError};
use crate::pool::TaskPool;
use crate::retry::{with_retry, with_retry_cancellable};
use crate::types::BatchReport;

/// HTTP client issuing one request per call
///
/// Non-success statuses are turned into [`Error::Http`], so the caller's
/// retry policy can tell 5xx from 4xx. Cloning is cheap: the underlying
/// connection pool is shared.
#[derive(Clone, Debug)]
pub struct Fetcher {
    client: reqwest::Client,
}

impl Fetcher {
    /// Build a fetcher with the given timeout and user agent
    pub fn new(config: FetchConfig) -> Result<Self> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self { client })
    }

    /// Fetch `url` and return the body as text
    pub async fn get_text(&self, url: &str) -> Result<String> {
        let response = self.send(url).await?;
        Ok(response.text().await?)
    }

    /// Fetch `url` and decode the JSON body into `T`
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self.send(url).await?;
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Fetch and decode `url`, retrying transient failures per `retry`
    pub async fn get_json_with_retry<T: DeserializeOwned>(
        &self,
        url: &str,
        retry: &RetryConfig,
    ) -> std::result::Result<T, RetryError<Error>> {
        with_retry(retry, || self.get_json::<T>(url)).await
    }

    async fn send(&self, url: &str) -> Result<reqwest::Response> {
        let parsed = parse_url(url)?;
        let response = self.client.get(parsed).send().await?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!(url, status = status.as_u16(), "Request returned error status");
            return Err(Error::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response)
    }
}

fn parse_url(url: &str) -> Result<Url> {
    let parsed = Url::parse(url).map_err(|e| Error::InvalidUrl(format!("{url}: {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(Error::InvalidUrl(format!(
            "{url}: unsupported scheme '{other}'"
        ))),
    }
}

/// Fetch every URL as JSON with bounded concurrency and per-URL retries
///
/// Builds a [`Fetcher`] and a [`TaskPool`] from `config`. The outcome at
/// index `i` belongs to `urls[i]`.
///
/// # Example
///
/// ```no_run
/// use fetch_pool::{Config, fetch_all_json};
///
/// # async fn example() -> fetch_pool::Result<()> {
/// let urls = ["https://example.com/a.json", "https://example.com/b.json"];
/// let report = fetch_all_json::<serde_json::Value, _>(urls, &Config::default()).await?;
///
/// for (index, failure) in report.failures() {
///     eprintln!("{}: {failure}", urls[index]);
/// }
/// println!("{}", report.summary());
/// # Ok(())
/// # }
/// ```
pub async fn fetch_all_json<T, I>(urls: I, config: &Config) -> Result<BatchReport<T>>
where
    T: DeserializeOwned,
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    config.validate()?;
    let fetcher = Fetcher::new(config.fetch.clone())?;
    let pool = TaskPool::new(config.pool.clone())?;
    Ok(fetch_all_json_with(&pool, &fetcher, urls, &config.retry).await)
}

/// Fetch every URL as JSON through an existing pool and fetcher
///
/// Cancelling the pool stops new fetches and also cuts short any retry
/// backoff still waiting; such tasks are recorded as cancelled.
pub async fn fetch_all_json_with<T, I>(
    pool: &TaskPool,
    fetcher: &Fetcher,
    urls: I,
    retry: &RetryConfig,
) -> BatchReport<T>
where
    T: DeserializeOwned,
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let cancel = pool.cancel_token();
    let tasks = urls.into_iter().map(|url| {
        let url = url.as_ref().to_string();
        let cancel = cancel.clone();
        move || async move {
            with_retry_cancellable(retry, &cancel, || fetcher.get_json::<T>(&url)).await
        }
    });
    pool.run(tasks).await
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::{Classify, FailureClass};
    use serde::Deserialize;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Debug, Deserialize, PartialEq)]
    struct Item {
        id: u32,
    }

    fn fetcher() -> Fetcher {
        Fetcher::new(FetchConfig {
            timeout: Duration::from_secs(5),
            user_agent: "fetch-pool-tests".to_string(),
        })
        .unwrap()
    }

    fn fast_retry(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
            ..RetryConfig::default()
        }
    }

    async fn mount(server: &MockServer, route: &str, template: ResponseTemplate) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(template)
            .mount(server)
            .await;
    }

    /// A URL on a local port nothing listens on
    fn refused_url() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        format!("http://127.0.0.1:{port}/")
    }

    #[tokio::test]
    async fn get_json_decodes_body() {
        let server = MockServer::start().await;
        mount(
            &server,
            "/item",
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": 7})),
        )
        .await;

        let item: Item = fetcher()
            .get_json(&format!("{}/item", server.uri()))
            .await
            .unwrap();

        assert_eq!(item, Item { id: 7 });
    }

    #[tokio::test]
    async fn get_text_returns_body() {
        let server = MockServer::start().await;
        mount(&server, "/hello", ResponseTemplate::new(200).set_body_string("hi")).await;

        let body = fetcher()
            .get_text(&format!("{}/hello", server.uri()))
            .await
            .unwrap();

        assert_eq!(body, "hi");
    }

    #[tokio::test]
    async fn user_agent_is_sent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("user-agent", "fetch-pool-tests"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&server)
            .await;

        tokio_test::assert_ok!(fetcher().get_text(&server.uri()).await);
    }

    #[tokio::test]
    async fn client_error_status_is_permanent() {
        let server = MockServer::start().await;
        mount(&server, "/missing", ResponseTemplate::new(404)).await;

        let err = fetcher()
            .get_text(&format!("{}/missing", server.uri()))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Http { status: 404, .. }));
        assert_eq!(err.classify(), FailureClass::Permanent);
    }

    #[tokio::test]
    async fn server_error_status_is_transient() {
        let server = MockServer::start().await;
        mount(&server, "/busy", ResponseTemplate::new(503)).await;

        let err = fetcher()
            .get_text(&format!("{}/busy", server.uri()))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Http { status: 503, .. }));
        assert_eq!(err.classify(), FailureClass::Transient);
    }

    #[tokio::test]
    async fn malformed_json_is_permanent() {
        let server = MockServer::start().await;
        mount(&server, "/bad", ResponseTemplate::new(200).set_body_string("{not json")).await;

        let err = fetcher()
            .get_json::<Item>(&format!("{}/bad", server.uri()))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Serialization(_)));
        assert_eq!(err.classify(), FailureClass::Permanent);
    }

    #[tokio::test]
    async fn invalid_urls_are_rejected_before_sending() {
        let fetcher = fetcher();

        let err = fetcher.get_text("not a url").await.unwrap_err();
        assert!(matches!(err, Error::InvalidUrl(_)));

        let err = fetcher.get_text("ftp://example.com/file").await.unwrap_err();
        assert!(matches!(err, Error::InvalidUrl(ref msg) if msg.contains("unsupported scheme")));
    }

    #[tokio::test]
    async fn connection_refused_is_a_transport_failure() {
        let err = fetcher().get_text(&refused_url()).await.unwrap_err();

        assert!(matches!(err, Error::Network(_)), "got {err:?}");
        assert_eq!(err.classify(), FailureClass::Transport);
    }

    #[tokio::test]
    async fn retry_recovers_from_transient_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        mount(
            &server,
            "/flaky",
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": 1})),
        )
        .await;

        let item: Item = fetcher()
            .get_json_with_retry(&format!("{}/flaky", server.uri()), &fast_retry(3))
            .await
            .unwrap();

        assert_eq!(item, Item { id: 1 });
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn retry_exhausts_on_persistent_server_errors() {
        let server = MockServer::start().await;
        mount(&server, "/down", ResponseTemplate::new(500)).await;

        let err = fetcher()
            .get_json_with_retry::<Item>(&format!("{}/down", server.uri()), &fast_retry(2))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RetryError::Exhausted {
                last: Error::Http { status: 500, .. },
                attempts: 3
            }
        ));
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn retry_does_not_repeat_client_errors() {
        let server = MockServer::start().await;
        mount(&server, "/gone", ResponseTemplate::new(410)).await;

        let err = fetcher()
            .get_json_with_retry::<Item>(&format!("{}/gone", server.uri()), &fast_retry(3))
            .await
            .unwrap_err();

        assert!(matches!(err, RetryError::Permanent { attempts: 1, .. }));
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn transport_failures_retry_only_when_enabled() {
        let url = refused_url();
        let fetcher = fetcher();

        let err = fetcher
            .get_json_with_retry::<Item>(&url, &fast_retry(2))
            .await
            .unwrap_err();
        assert!(matches!(err, RetryError::Exhausted { attempts: 3, .. }));

        let no_transport_retry = RetryConfig {
            retry_transport_failures: false,
            ..fast_retry(2)
        };
        let err = fetcher
            .get_json_with_retry::<Item>(&url, &no_transport_retry)
            .await
            .unwrap_err();
        assert!(matches!(err, RetryError::Permanent { attempts: 1, .. }));
    }

    #[tokio::test]
    async fn zero_timeout_is_rejected() {
        let result = Fetcher::new(FetchConfig {
            timeout: Duration::ZERO,
            ..FetchConfig::default()
        });
        tokio_test::assert_err!(result);
    }
}
