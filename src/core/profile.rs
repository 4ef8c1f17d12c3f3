use crate::core::rate_limit::InstagramRateLimiter;
use crate::core::PageFetcher;
use crate::domain::model::{ProfileInfo, ProfileStatus};
use crate::utils::error::EtlError;
use regex::Regex;
use scraper::{Html, Selector};
use std::sync::{Arc, LazyLock};
use tracing::{debug, warn};

static META_OG_DESCRIPTION: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"meta[property="og:description"], meta[name="description"]"#)
        .expect("description selector is valid")
});

static META_OG_TITLE: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"meta[property="og:title"]"#).expect("title selector is valid")
});

static FOLLOWERS_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d[\d.,]*(?:\s?(?:mil|mi|k|m|b))?)\s+(?:followers|seguidores)\b")
        .expect("followers pattern is valid")
});

static NAME_IN_DESCRIPTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:from|de)\s+(.+?)\s*\(@[A-Za-z0-9_.]+\)")
        .expect("description name pattern is valid")
});

static NAME_IN_TITLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(.+?)\s*\(@[A-Za-z0-9_.]+\)").expect("title name pattern is valid")
});

static FOLLOWERS_JSON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""edge_followed_by"\s*:\s*\{\s*"count"\s*:\s*(\d+)"#)
        .expect("followers json pattern is valid")
});

static FULL_NAME_JSON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""full_name"\s*:\s*"((?:[^"\\]|\\.)*)""#).expect("full name json pattern is valid")
});

/// Fields recovered from a profile page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileData {
    pub display_name: Option<String>,
    pub followers: Option<u64>,
}

/// 解析「1,234」「1.234」「12.5K」「1,2 mi」「10 mil」等追蹤數字
pub fn parse_follower_count(raw: &str) -> Option<u64> {
    let lower = raw.trim().to_lowercase();

    let (number, multiplier) = [("mil", 1e3), ("mi", 1e6), ("k", 1e3), ("m", 1e6), ("b", 1e9)]
        .iter()
        .find_map(|(suffix, mult)| lower.strip_suffix(suffix).map(|n| (n.trim(), *mult)))
        .unwrap_or((lower.as_str(), 1.0));

    if number.is_empty() {
        return None;
    }

    if multiplier == 1.0 {
        let digits: String = number.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() || number.chars().any(|c| !(c.is_ascii_digit() || c == ',' || c == '.')) {
            return None;
        }
        return digits.parse().ok();
    }

    let value: f64 = number.replace(',', ".").parse().ok()?;
    Some((value * multiplier).round() as u64)
}

pub fn parse_profile_html(html: &str) -> ProfileData {
    let document = Html::parse_document(html);
    let mut data = ProfileData::default();

    let description = document
        .select(&META_OG_DESCRIPTION)
        .filter_map(|m| m.value().attr("content"))
        .find(|c| !c.trim().is_empty());

    if let Some(description) = description {
        data.followers = FOLLOWERS_TEXT
            .captures(description)
            .and_then(|caps| parse_follower_count(&caps[1]));
        data.display_name = NAME_IN_DESCRIPTION
            .captures(description)
            .map(|caps| caps[1].trim().to_string())
            .filter(|name| !name.is_empty());
    }

    if data.display_name.is_none() {
        data.display_name = document
            .select(&META_OG_TITLE)
            .filter_map(|m| m.value().attr("content"))
            .find_map(|title| NAME_IN_TITLE.captures(title).map(|caps| caps[1].trim().to_string()))
            .filter(|name| !name.is_empty());
    }

    // 內嵌 JSON 作為備援
    if data.followers.is_none() {
        data.followers = FOLLOWERS_JSON
            .captures(html)
            .and_then(|caps| caps[1].parse().ok());
    }
    if data.display_name.is_none() {
        data.display_name = FULL_NAME_JSON
            .captures(html)
            .and_then(|caps| serde_json::from_str::<String>(&format!("\"{}\"", &caps[1])).ok())
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty());
    }

    data
}

/// Loads profile pages, waiting on the shared limiter before each request.
#[derive(Clone)]
pub struct ProfileFetcher {
    fetcher: Arc<dyn PageFetcher>,
    limiter: InstagramRateLimiter,
    base_url: String,
}

impl ProfileFetcher {
    pub fn new(fetcher: Arc<dyn PageFetcher>, limiter: InstagramRateLimiter, base_url: &str) -> Self {
        Self {
            fetcher,
            limiter,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn profile_page_url(&self, username: &str) -> String {
        format!("{}/{}/", self.base_url, username)
    }

    pub async fn fetch(&self, username: &str) -> ProfileInfo {
        self.limiter.acquire().await;

        let url = self.profile_page_url(username);
        debug!("Fetching Instagram profile {}", url);

        let page = match self.fetcher.fetch(&url).await {
            Ok(page) => page,
            Err(EtlError::HttpStatusError { status: 429, .. }) => {
                warn!("Instagram rate-limited the request for @{}", username);
                return ProfileInfo::failed(username, ProfileStatus::RateLimited);
            }
            Err(e) => {
                warn!("Profile fetch for @{} failed: {}", username, e);
                return ProfileInfo::failed(username, ProfileStatus::Error);
            }
        };

        if page.final_url.contains("/accounts/login") {
            return ProfileInfo::failed(username, ProfileStatus::LoginRequired);
        }
        if page.status == 404 {
            return ProfileInfo::failed(username, ProfileStatus::NotFound);
        }
        if !page.is_success() {
            warn!("Profile page for @{} returned HTTP {}", username, page.status);
            return ProfileInfo::failed(username, ProfileStatus::Error);
        }

        let data = parse_profile_html(&page.body);
        let status = match (&data.display_name, data.followers) {
            (Some(_), Some(_)) => ProfileStatus::Ok,
            (None, None) => ProfileStatus::Unparsed,
            _ => ProfileStatus::Partial,
        };

        ProfileInfo {
            username: username.to_string(),
            display_name: data.display_name,
            followers: data.followers,
            status,
        }
    }
}
