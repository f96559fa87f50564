use crate::config::ScraperConfig;
use crate::scrapers::traits::PageFetcher;
use anyhow::{Context, Result};
use async_trait::async_trait;
use rand::seq::SliceRandom;
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, REFERER, USER_AGENT};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, error, warn};

const FALLBACK_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Plain HTTP fetcher with user-agent rotation and retry
pub struct HttpFetcher {
    client: Client,
    referer: String,
    user_agents: Vec<String>,
    max_retries: u32,
    /// Wait before retry n is `(n + 1) * retry_base` plus up to one `retry_base` of jitter
    retry_base: Duration,
}

impl HttpFetcher {
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("ar-SA,ar;q=0.9,en;q=0.8"));

        let client = Client::builder()
            .timeout(config.timeout())
            .default_headers(headers)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            referer: config.base_url.clone(),
            user_agents: config.user_agents.clone(),
            max_retries: config.max_retries,
            retry_base: Duration::from_secs(2),
        })
    }

    pub fn with_retry_base(mut self, retry_base: Duration) -> Self {
        self.retry_base = retry_base;
        self
    }

    fn pick_user_agent(&self) -> &str {
        self.user_agents
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
            .unwrap_or(FALLBACK_USER_AGENT)
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let jitter = rand::thread_rng().gen_range(0.0..1.0);
        self.retry_base.mul_f64(attempt as f64 + 1.0 + jitter)
    }

    async fn fetch_once(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, self.pick_user_agent())
            .header(REFERER, &self.referer)
            .send()
            .await
            .with_context(|| format!("Failed to fetch {}", url))?
            .error_for_status()
            .with_context(|| format!("Bad status for {}", url))?;

        let html = response.text().await.context("Failed to read response body")?;
        debug!("Downloaded {} bytes of HTML from {}", html.len(), url);
        Ok(html)
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        let mut attempt = 0;
        loop {
            match self.fetch_once(url).await {
                Ok(html) => return Ok(html),
                Err(e) if attempt < self.max_retries => {
                    let wait = self.backoff(attempt);
                    warn!(
                        "Request failed, retrying in {:.1}s: {} ({:#})",
                        wait.as_secs_f64(),
                        url,
                        e
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!("Request failed after {} retries: {}", self.max_retries, url);
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::get, Router};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    async fn flaky_server(failures: u32) -> (String, Arc<AtomicU32>) {
        let hits = Arc::new(AtomicU32::new(0));
        let counter = hits.clone();
        let app = Router::new().route(
            "/page",
            get(move || {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    if n < failures {
                        (StatusCode::SERVICE_UNAVAILABLE, "busy".to_string())
                    } else {
                        (StatusCode::OK, "<html>ok</html>".to_string())
                    }
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        (format!("http://{}/page", addr), hits)
    }

    fn fetcher(max_retries: u32) -> HttpFetcher {
        let config = ScraperConfig {
            max_retries,
            ..ScraperConfig::default()
        };
        HttpFetcher::new(&config)
            .unwrap()
            .with_retry_base(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn retries_until_success() {
        let (url, hits) = flaky_server(2).await;
        let html = fetcher(3).fetch(&url).await.unwrap();
        assert_eq!(html, "<html>ok</html>");
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let (url, hits) = flaky_server(10).await;
        assert!(fetcher(2).fetch(&url).await.is_err());
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }
}
