use crate::config::CrawlSettings;
use crate::core::{FetchedPage, PageFetcher};
use crate::utils::error::{EtlError, Result};
use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use reqwest::{redirect, Client, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

const MAX_REDIRECTS: usize = 10;

pub fn build_client(crawl: &CrawlSettings) -> Result<Client> {
    let timeout = Duration::from_secs(crawl.timeout_seconds.max(1));
    let client = Client::builder()
        .user_agent(crawl.user_agent.clone())
        .timeout(timeout)
        .connect_timeout(timeout)
        .redirect(redirect::Policy::limited(MAX_REDIRECTS))
        .danger_accept_invalid_certs(crawl.accept_invalid_certs)
        .build()?;
    Ok(client)
}

pub fn retry_policy(attempts: usize) -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(500))
        .with_max_delay(Duration::from_secs(5))
        .with_max_times(attempts)
        .with_jitter()
}

/// Plain HTTP fetcher; retries timeouts, 5xx and 429 with exponential backoff.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    retry_policy: ExponentialBuilder,
}

impl HttpFetcher {
    pub fn new(client: Client, retry_attempts: usize) -> Self {
        Self {
            client,
            retry_policy: retry_policy(retry_attempts),
        }
    }

    pub fn from_settings(crawl: &CrawlSettings) -> Result<Self> {
        Ok(Self::new(build_client(crawl)?, crawl.retry_attempts))
    }
}

async fn fetch_once(client: Client, url: String) -> Result<FetchedPage> {
    let response = client.get(&url).send().await?;
    let status = response.status();

    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        return Err(EtlError::HttpStatusError {
            url,
            status: status.as_u16(),
        });
    }

    let final_url = response.url().to_string();
    let body = response.text().await?;
    debug!("GET {} -> {} ({} bytes)", url, status, body.len());

    Ok(FetchedPage {
        final_url,
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        let client = self.client.clone();
        let url = url.to_string();

        (move || fetch_once(client.clone(), url.clone()))
            .retry(self.retry_policy)
            .when(|e: &EtlError| e.is_retryable())
            .notify(|err: &EtlError, dur: Duration| {
                warn!("Request failed ({}), retrying in {:?}", err, dur);
            })
            .await
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn fast_settings() -> CrawlSettings {
        CrawlSettings {
            timeout_seconds: 5,
            retry_attempts: 2,
            ..CrawlSettings::default()
        }
    }

    #[tokio::test]
    async fn test_fetch_returns_body_and_status() {
        let server = MockServer::start();
        let page = server.mock(|when, then| {
            when.method(GET).path("/");
            then.status(200)
                .header("Content-Type", "text/html; charset=utf-8")
                .body("<html><body>olá</body></html>");
        });

        let fetcher = HttpFetcher::from_settings(&fast_settings()).unwrap();
        let fetched = fetcher.fetch(&server.url("/")).await.unwrap();

        page.assert();
        assert!(fetched.is_success());
        assert!(fetched.body.contains("olá"));
        assert_eq!(fetched.final_url, server.url("/"));
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let server = MockServer::start();
        let missing = server.mock(|when, then| {
            when.method(GET).path("/missing");
            then.status(404).body("not here");
        });

        let fetcher = HttpFetcher::from_settings(&fast_settings()).unwrap();
        let fetched = fetcher.fetch(&server.url("/missing")).await.unwrap();

        missing.assert_hits(1);
        assert_eq!(fetched.status, 404);
        assert!(!fetched.is_success());
    }

    #[tokio::test]
    async fn test_server_errors_are_retried_then_reported() {
        let server = MockServer::start();
        let failing = server.mock(|when, then| {
            when.method(GET).path("/boom");
            then.status(503);
        });

        let fetcher = HttpFetcher::from_settings(&fast_settings()).unwrap();
        let err = fetcher.fetch(&server.url("/boom")).await.unwrap_err();

        // 1 次原始請求 + 2 次重試
        failing.assert_hits(3);
        assert!(matches!(err, EtlError::HttpStatusError { status: 503, .. }));
    }
}
