use crate::config::CrawlSettings;
use crate::core::page_scan::{analyze_page, PageAnalysis, PageHit};
use crate::core::username::UsernameRules;
use crate::core::PageFetcher;
use crate::utils::error::EtlError;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Result of walking one site.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlOutcome {
    pub hit: Option<PageHit>,
    pub found_on_page: String,
    pub pages_scanned: usize,
    /// 第一個被規則拒絕的 Instagram 帳號
    pub rejected: Option<String>,
    /// Why the start page could not be scanned, if it could not.
    pub start_error: Option<String>,
}

/// Breadth-first, same-site crawl bounded by depth and scanned-page count.
#[derive(Clone)]
pub struct SiteCrawler {
    http: Arc<dyn PageFetcher>,
    browser: Option<Arc<dyn PageFetcher>>,
    rules: UsernameRules,
    settings: CrawlSettings,
}

impl SiteCrawler {
    pub fn new(
        http: Arc<dyn PageFetcher>,
        browser: Option<Arc<dyn PageFetcher>>,
        rules: UsernameRules,
        settings: CrawlSettings,
    ) -> Self {
        Self {
            http,
            browser,
            rules,
            settings,
        }
    }

    /// 沒有 scheme 時先試 https，連線失敗再退回 http
    fn start_candidates(start: &str) -> (String, Option<String>) {
        let lower = start.to_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            (start.to_string(), None)
        } else {
            let bare = start.trim_start_matches('/');
            (format!("https://{}", bare), Some(format!("http://{}", bare)))
        }
    }

    pub async fn crawl(&self, start: &str) -> CrawlOutcome {
        let (first, mut fallback) = Self::start_candidates(start);
        let max_depth = self.settings.max_depth;
        let max_pages = self.settings.max_pages;

        let mut outcome = CrawlOutcome::default();
        let mut queue: VecDeque<(String, usize)> = VecDeque::from([(first, 0)]);
        let mut visited: HashSet<String> = HashSet::new();

        while outcome.pages_scanned < max_pages {
            let Some((url, depth)) = queue.pop_front() else {
                break;
            };
            if depth > max_depth || !visited.insert(url.clone()) {
                continue;
            }

            debug!("Visiting {} (depth {})", url, depth);
            let page = match self.http.fetch(&url).await {
                Ok(page) => page,
                Err(e) => {
                    debug!("Failed to fetch {}: {}", url, e);
                    if depth == 0 {
                        // 只有連線層錯誤才退回 http；伺服器錯誤照實回報
                        if matches!(e, EtlError::ApiError(_)) {
                            if let Some(next) = fallback.take() {
                                queue.push_front((next, 0));
                                continue;
                            }
                        }
                        outcome.start_error = Some(e.to_string());
                    }
                    continue;
                }
            };

            if !page.is_success() {
                debug!("Skipping {}: HTTP {}", url, page.status);
                if depth == 0 {
                    outcome.start_error = Some(format!("start page returned HTTP {}", page.status));
                }
                continue;
            }

            outcome.pages_scanned += 1;
            visited.insert(page.final_url.clone());

            let follow_links = depth < max_depth;
            let mut analysis = analyze_page(&page.body, &page.final_url, &self.rules, follow_links);

            if analysis.hit.is_none() && depth == 0 {
                if let Some(rendered) = self.render_start_page(&page.final_url, follow_links).await {
                    if rendered.hit.is_some() || analysis.links.is_empty() {
                        analysis.hit = rendered.hit;
                        analysis.links = rendered.links;
                    }
                    if analysis.rejected.is_none() {
                        analysis.rejected = rendered.rejected;
                    }
                }
            }

            if outcome.rejected.is_none() {
                outcome.rejected = analysis.rejected.take();
            }

            if let Some(hit) = analysis.hit {
                outcome.found_on_page = page.final_url;
                outcome.hit = Some(hit);
                return outcome;
            }

            for link in analysis.links {
                if !visited.contains(&link) {
                    queue.push_back((link, depth + 1));
                }
            }

            if !queue.is_empty() && outcome.pages_scanned < max_pages && self.settings.page_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.settings.page_delay_ms)).await;
            }
        }

        outcome
    }

    /// JavaScript 產生的連結只有瀏覽器渲染後才看得到
    async fn render_start_page(&self, url: &str, follow_links: bool) -> Option<PageAnalysis> {
        let browser = self.browser.as_ref()?;
        match browser.fetch(url).await {
            Ok(rendered) => {
                debug!("Rendered {} with {}", url, browser.name());
                let mut analysis =
                    analyze_page(&rendered.body, &rendered.final_url, &self.rules, follow_links);
                if let Some(hit) = analysis.hit.as_mut() {
                    hit.notes.push_str(" (rendered)");
                }
                Some(analysis)
            }
            Err(e) => {
                debug!("Browser rendering of {} failed: {}", url, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::http::HttpFetcher;
    use crate::core::FetchedPage;
    use crate::domain::model::ExtractionStatus;
    use crate::utils::error::Result;
    use async_trait::async_trait;
    use httpmock::prelude::*;
    use std::sync::Mutex;

    fn settings() -> CrawlSettings {
        CrawlSettings {
            page_delay_ms: 0,
            retry_attempts: 0,
            timeout_seconds: 5,
            ..CrawlSettings::default()
        }
    }

    fn crawler(settings: CrawlSettings, browser: Option<Arc<dyn PageFetcher>>) -> SiteCrawler {
        let http = HttpFetcher::from_settings(&settings).unwrap();
        SiteCrawler::new(Arc::new(http), browser, UsernameRules::default(), settings)
    }

    #[tokio::test]
    async fn test_finds_instagram_on_linked_page() {
        let server = MockServer::start();
        let home = server.mock(|when, then| {
            when.method(GET).path("/");
            then.status(200)
                .body(r#"<a href="/sobre">Sobre</a><a href="/contato">Contato</a>"#);
        });
        server.mock(|when, then| {
            when.method(GET).path("/contato");
            then.status(200).body("<p>Fale conosco</p>");
        });
        server.mock(|when, then| {
            when.method(GET).path("/sobre");
            then.status(200)
                .body(r#"<a href="https://instagram.com/padaria_central">IG</a>"#);
        });

        let outcome = crawler(settings(), None).crawl(&server.url("/")).await;

        home.assert();
        let hit = outcome.hit.unwrap();
        assert_eq!(hit.username, "padaria_central");
        assert_eq!(hit.status, ExtractionStatus::FoundInSite);
        assert_eq!(outcome.found_on_page, server.url("/sobre"));
        assert!(outcome.pages_scanned >= 2);
    }

    #[tokio::test]
    async fn test_respects_max_pages_and_visits_each_url_once() {
        let server = MockServer::start();
        let home = server.mock(|when, then| {
            when.method(GET).path("/");
            then.status(200).body(
                r#"<a href="/a">A</a><a href="/b">B</a><a href="/c">C</a><a href="/d">D</a><a href="/">Home</a>"#,
            );
        });
        let child = server.mock(|when, then| {
            when.method(GET).path_matches(regex::Regex::new("^/[a-d]$").unwrap());
            then.status(200).body(r#"<a href="/">Home</a><p>nada</p>"#);
        });

        let limited = CrawlSettings {
            max_pages: 3,
            ..settings()
        };
        let outcome = crawler(limited, None).crawl(&server.url("/")).await;

        assert!(outcome.hit.is_none());
        assert_eq!(outcome.pages_scanned, 3);
        home.assert_hits(1);
        child.assert_hits(2);
    }

    #[tokio::test]
    async fn test_respects_max_depth_and_stays_on_site() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/");
            then.status(200)
                .body(r#"<a href="/level1">L1</a><a href="https://elsewhere.example/">Out</a>"#);
        });
        let level1 = server.mock(|when, then| {
            when.method(GET).path("/level1");
            then.status(200).body(r#"<a href="/level2">L2</a>"#);
        });
        let level2 = server.mock(|when, then| {
            when.method(GET).path("/level2");
            then.status(200).body(r#"<a href="https://instagram.com/too_deep">IG</a>"#);
        });

        let shallow = CrawlSettings {
            max_depth: 1,
            ..settings()
        };
        let outcome = crawler(shallow, None).crawl(&server.url("/")).await;

        assert!(outcome.hit.is_none());
        assert_eq!(outcome.pages_scanned, 2);
        level1.assert_hits(1);
        level2.assert_hits(0);
    }

    #[tokio::test]
    async fn test_unreachable_start_reports_error() {
        let outcome = crawler(settings(), None)
            .crawl("http://127.0.0.1:9/")
            .await;

        assert_eq!(outcome.pages_scanned, 0);
        assert!(outcome.start_error.is_some());
    }

    #[tokio::test]
    async fn test_start_page_http_error_is_reported() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/");
            then.status(404);
        });

        let outcome = crawler(settings(), None).crawl(&server.url("/")).await;
        assert_eq!(outcome.pages_scanned, 0);
        assert_eq!(
            outcome.start_error.as_deref(),
            Some("start page returned HTTP 404")
        );
    }

    struct StaticRenderer;

    #[async_trait]
    impl PageFetcher for StaticRenderer {
        async fn fetch(&self, url: &str) -> Result<FetchedPage> {
            Ok(FetchedPage {
                final_url: url.to_string(),
                status: 200,
                body: r#"<a href="https://www.instagram.com/rendered_shop/">IG</a>"#.to_string(),
            })
        }

        fn name(&self) -> &'static str {
            "static-renderer"
        }
    }

    #[tokio::test]
    async fn test_browser_renders_start_page_when_static_html_is_empty() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/");
            then.status(200).body(r#"<div id="app"></div>"#);
        });

        let outcome = crawler(settings(), Some(Arc::new(StaticRenderer)))
            .crawl(&server.url("/"))
            .await;

        let hit = outcome.hit.unwrap();
        assert_eq!(hit.username, "rendered_shop");
        assert!(hit.notes.ends_with("(rendered)"));
    }

    #[tokio::test]
    async fn test_scheme_less_start_falls_back_to_http() {
        let server = MockServer::start();
        let home = server.mock(|when, then| {
            when.method(GET).path("/");
            then.status(200)
                .body(r#"<a href="https://www.instagram.com/padaria_central/">IG</a>"#);
        });

        // https 對純 http 伺服器會在 TLS 握手失敗
        let start = format!("{}/", server.address());
        let outcome = crawler(settings(), None).crawl(&start).await;

        home.assert();
        assert_eq!(outcome.hit.unwrap().username, "padaria_central");
        assert_eq!(outcome.pages_scanned, 1);
        assert_eq!(outcome.start_error, None);
    }

    #[derive(Default)]
    struct OverloadedSite {
        requested: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PageFetcher for OverloadedSite {
        async fn fetch(&self, url: &str) -> Result<FetchedPage> {
            self.requested.lock().unwrap().push(url.to_string());
            Err(EtlError::HttpStatusError {
                url: url.to_string(),
                status: 503,
            })
        }

        fn name(&self) -> &'static str {
            "overloaded"
        }
    }

    #[tokio::test]
    async fn test_server_error_does_not_fall_back_to_http() {
        let site = Arc::new(OverloadedSite::default());
        let crawler = SiteCrawler::new(site.clone(), None, UsernameRules::default(), settings());

        let outcome = crawler.crawl("padaria.com.br").await;

        assert_eq!(
            *site.requested.lock().unwrap(),
            vec!["https://padaria.com.br".to_string()]
        );
        assert_eq!(outcome.pages_scanned, 0);
        assert!(outcome.start_error.unwrap().contains("503"));
    }
}
