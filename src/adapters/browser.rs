use crate::config::CrawlSettings;
use crate::core::{FetchedPage, PageFetcher};
use crate::utils::error::{EtlError, Result};
use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions};
use std::time::Duration;
use tracing::debug;

fn browser_error(context: &str, err: impl std::fmt::Display) -> EtlError {
    EtlError::BrowserError {
        message: format!("{}: {}", context, err),
    }
}

/// Renders pages in headless Chrome so JavaScript-built links show up.
///
/// One browser process is shared; each fetch opens and closes its own tab.
/// The CDP calls block, so they run on tokio's blocking pool.
#[derive(Clone)]
pub struct BrowserFetcher {
    browser: Browser,
    timeout: Duration,
    user_agent: String,
}

impl BrowserFetcher {
    pub fn launch(crawl: &CrawlSettings) -> Result<Self> {
        let options = LaunchOptions::default_builder()
            .headless(true)
            .sandbox(false)
            .idle_browser_timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| browser_error("invalid launch options", e))?;

        let browser = Browser::new(options).map_err(|e| browser_error("failed to launch Chrome", e))?;

        Ok(Self {
            browser,
            timeout: Duration::from_secs(crawl.timeout_seconds.max(1)),
            user_agent: crawl.user_agent.clone(),
        })
    }

    fn render_blocking(&self, url: &str) -> anyhow::Result<FetchedPage> {
        let tab = self.browser.new_tab()?;

        // 不論成功與否都要關閉分頁
        then_close(
            || {
                tab.set_default_timeout(self.timeout);
                tab.set_user_agent(&self.user_agent, None, None)?;
                tab.navigate_to(url)?;
                tab.wait_until_navigated()?;
                Ok(FetchedPage {
                    final_url: tab.get_url(),
                    // CDP 不回傳狀態碼；能導覽成功就當 200
                    status: 200,
                    body: tab.get_content()?,
                })
            },
            || {
                if let Err(e) = tab.close(true) {
                    debug!("Closing tab for {} failed: {}", url, e);
                }
            },
        )
    }
}

fn then_close<T>(
    work: impl FnOnce() -> anyhow::Result<T>,
    close: impl FnOnce(),
) -> anyhow::Result<T> {
    let result = work();
    close();
    result
}

#[async_trait]
impl PageFetcher for BrowserFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        let fetcher = self.clone();
        let url = url.to_string();

        tokio::task::spawn_blocking(move || {
            fetcher
                .render_blocking(&url)
                .map_err(|e| browser_error(&format!("rendering {} failed", url), e))
        })
        .await
        .map_err(|e| browser_error("render task panicked", e))?
    }

    fn name(&self) -> &'static str {
        "browser"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_tab_is_closed_when_navigation_fails() {
        let closed = Cell::new(false);
        let result: anyhow::Result<()> = then_close(
            || anyhow::bail!("navigation timed out"),
            || closed.set(true),
        );

        assert!(result.is_err());
        assert!(closed.get());
    }

    #[test]
    fn test_tab_is_closed_after_success() {
        let closed = Cell::new(false);
        let result = then_close(|| Ok(42), || closed.set(true));

        assert_eq!(result.unwrap(), 42);
        assert!(closed.get());
    }
}
