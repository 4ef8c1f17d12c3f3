//! Instagram username rules: validation, direct-link normalization and
//! handle detection in free text.

use regex::Regex;
use std::sync::LazyLock;
use url::Url;

pub const INSTAGRAM_PROFILE_BASE: &str = "https://www.instagram.com";
pub const MAX_USERNAME_LEN: usize = 30;

/// 這些路徑是 Instagram 功能頁，不是帳號
pub const RESERVED_PATHS: &[&str] = &[
    "p", "explore", "directory", "accounts", "reels", "reel", "stories", "tv",
];

/// 帳號名稱裡不會出現的字詞（比對小寫）
pub const BLOCKED_TERMS: &[&str] = &[
    ".com", "gmail", "google", "outlook", "hotmail", "yahoo", "email", "contact", "contato",
    "info", "admin", "web", "site", "www", "http", "mailto:", "?", "&", "=", "%",
];

static USERNAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.]+$").expect("username pattern is valid"));

static AT_HANDLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^@[A-Za-z0-9_.]+$").expect("handle pattern is valid"));

/// 依優先順序排列；`@` 規則抓整段字元，超過 30 字元的在外面剔除
static TEXT_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"@([A-Za-z0-9_.]+)",
        r"(?i)instagram\.com/([A-Za-z0-9_.]{1,30})",
        r"(?i)instagr\.am/([A-Za-z0-9_.]{1,30})",
        r"(?i)ig: @?([A-Za-z0-9_.]{1,30})",
        r"(?i)instagram: @?([A-Za-z0-9_.]{1,30})",
        r"(?i)insta: @?([A-Za-z0-9_.]{1,30})",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("text handle pattern is valid"))
    .collect()
});

/// Username validation with an optional list of extra blocked terms.
#[derive(Debug, Clone, Default)]
pub struct UsernameRules {
    extra_blocked_terms: Vec<String>,
}

impl UsernameRules {
    pub fn new(extra_blocked_terms: &[String]) -> Self {
        Self {
            extra_blocked_terms: extra_blocked_terms
                .iter()
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }

    pub fn is_valid(&self, username: &str) -> bool {
        self.rejection_reason(username).is_none()
    }

    /// 回傳不合法的原因，合法時為 `None`
    pub fn rejection_reason(&self, username: &str) -> Option<String> {
        if username.is_empty() {
            return Some("empty username".to_string());
        }

        let lower = username.to_lowercase();

        if let Some(term) = BLOCKED_TERMS
            .iter()
            .copied()
            .chain(self.extra_blocked_terms.iter().map(String::as_str))
            .find(|term| lower.contains(term))
        {
            return Some(format!("contains blocked term '{}'", term));
        }

        if username.chars().any(char::is_whitespace) {
            return Some("contains whitespace".to_string());
        }

        if username.contains('@')
            && [".com", ".com.br", ".org", ".net"]
                .iter()
                .any(|suffix| lower.ends_with(suffix))
        {
            return Some("looks like an email address".to_string());
        }

        if lower.starts_with("http://") || lower.starts_with("https://") || lower.starts_with("www.") {
            return Some("looks like a URL".to_string());
        }

        let length = username.chars().count();
        if length > MAX_USERNAME_LEN {
            return Some(format!("too long ({} characters)", length));
        }

        if !USERNAME_CHARS.is_match(username) {
            return Some("contains invalid characters".to_string());
        }

        None
    }
}

pub fn is_reserved_path(segment: &str) -> bool {
    let lower = segment.to_lowercase();
    RESERVED_PATHS.contains(&lower.as_str())
}

pub fn profile_url(username: &str) -> String {
    format!("{}/{}/", INSTAGRAM_PROFILE_BASE, username)
}

/// Instagram 連結或單獨的 `@handle`
pub fn is_direct_instagram_ref(value: &str) -> bool {
    let lower = value.to_lowercase();
    lower.contains("instagram.com") || lower.contains("instagr.am") || AT_HANDLE.is_match(value)
}

pub fn normalize_instagram_url(value: &str) -> String {
    let trimmed = value.trim();

    if let Some(handle) = trimmed.strip_prefix('@') {
        let handle = handle.split_whitespace().next().unwrap_or("").to_lowercase();
        return profile_url(&handle);
    }

    let lower = trimmed.to_lowercase();
    let mut url = if lower.starts_with("//") {
        format!("https:{}", trimmed)
    } else if lower.starts_with('/') {
        format!("{}{}", INSTAGRAM_PROFILE_BASE, trimmed)
    } else if !lower.starts_with("http") {
        format!("https://{}", trimmed)
    } else {
        trimmed.to_string()
    };

    if let Some(idx) = url.find('?') {
        url.truncate(idx);
        let without_slash = url.trim_end_matches('/').len();
        url.truncate(without_slash);
    }

    url
}

/// 從 Instagram 連結取出帳號（第一段路徑）。
/// 只有保留路徑或空路徑回傳 None；字元是否合法交給 `rejection_reason`
pub fn username_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);
    if host != "instagram.com" && host != "instagr.am" && !host.ends_with(".instagram.com") {
        return None;
    }

    let segment = parsed.path_segments()?.find(|s| !s.is_empty())?;
    let segment = segment.split(['?', '#']).next().unwrap_or("");
    if segment.is_empty() || is_reserved_path(segment) {
        return None;
    }
    Some(segment.to_string())
}

/// Every handle-like candidate in `text`, in pattern priority order.
pub fn handle_candidates(text: &str) -> Vec<String> {
    let mut candidates = Vec::new();

    for pattern in TEXT_PATTERNS.iter() {
        for caps in pattern.captures_iter(text) {
            let Some(m) = caps.get(1) else { continue };
            let raw = m.as_str();
            if raw.chars().count() > MAX_USERNAME_LEN {
                continue;
            }
            let candidate = raw.trim_end_matches('.');
            if candidate.is_empty() || !USERNAME_CHARS.is_match(candidate) {
                continue;
            }
            if !candidates.iter().any(|c: &String| c == candidate) {
                candidates.push(candidate.to_string());
            }
        }
    }

    candidates
}

pub fn username_from_text(text: &str) -> Option<String> {
    handle_candidates(text).into_iter().next()
}

/// First candidate in `text` that passes the rules.
pub fn valid_username_from_text(text: &str, rules: &UsernameRules) -> Option<String> {
    handle_candidates(text)
        .into_iter()
        .find(|candidate| rules.is_valid(candidate))
}
