use crate::types::{AggregateError, FetchConfig, Result};
use headless_chrome::{Browser, LaunchOptions};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

/// Retrieves raw page content, either with a plain HTTP GET or through a
/// headless browser for JavaScript-driven pages.
pub struct PageFetcher {
    client: Client,
    settle: Duration,
}

impl PageFetcher {
    pub fn new(config: &FetchConfig) -> Self {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .gzip(true)
            .build()
            .expect("failed to create HTTP client");

        Self {
            client,
            settle: config.settle,
        }
    }

    /// Fetch a page. Any failure (transport, non-success status, browser
    /// automation) is logged and reported as `None`; nothing propagates past
    /// this boundary and no retry happens at this layer.
    pub async fn fetch(&self, url: &str, rendered: bool) -> Option<String> {
        let result = if rendered {
            self.fetch_rendered(url).await
        } else {
            self.fetch_static(url).await
        };

        match result {
            Ok(body) => {
                debug!(%url, bytes = body.len(), rendered, "fetched page");
                Some(body)
            }
            Err(e) => {
                warn!(%url, error = %e, rendered, "page fetch failed");
                None
            }
        }
    }

    async fn fetch_static(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.text().await?)
    }

    async fn fetch_rendered(&self, url: &str) -> Result<String> {
        let url = url.to_string();
        let settle = self.settle;
        // headless_chrome is synchronous; keep the settle sleep off the runtime.
        tokio::task::spawn_blocking(move || render_page(&url, settle)).await?
    }
}

/// Drive a headless browser through one navigation. The browser instance is
/// owned by this call and its process is released when `browser` drops, on
/// every exit path.
fn render_page(url: &str, settle: Duration) -> Result<String> {
    let options = LaunchOptions::default_builder()
        .headless(true)
        .build()
        .map_err(|e| AggregateError::Browser(e.to_string()))?;
    let browser = Browser::new(options).map_err(|e| AggregateError::Browser(e.to_string()))?;
    let tab = browser
        .new_tab()
        .map_err(|e| AggregateError::Browser(e.to_string()))?;
    tab.navigate_to(url)
        .map_err(|e| AggregateError::Browser(e.to_string()))?;
    tab.wait_until_navigated()
        .map_err(|e| AggregateError::Browser(e.to_string()))?;
    std::thread::sleep(settle);
    tab.get_content()
        .map_err(|e| AggregateError::Browser(e.to_string()))
}
