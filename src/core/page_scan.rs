//! Locates an Instagram profile inside one HTML document.
//!
//! Everything here is synchronous: `scraper::Html` is not `Send`, so a
//! document is parsed, scanned and dropped without crossing an `.await`.

use crate::core::username::{
    is_direct_instagram_ref, normalize_instagram_url, profile_url, username_from_url,
    valid_username_from_text, UsernameRules,
};
use crate::domain::model::ExtractionStatus;
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeSet;
use std::sync::LazyLock;
use url::Url;

const SOCIAL_SELECTORS: &[&str] = &[
    ".social-links",
    ".social-icons",
    ".social-media",
    ".social",
    ".follow-us",
    ".footer-social",
    ".share",
    ".connect",
    ".instagram",
    "#instagram",
    "[class*=\"instagram\"]",
    "[id*=\"instagram\"]",
    "[class*=\"insta\"]",
    "[id*=\"insta\"]",
    "[class*=\"ig-\"]",
    "[id*=\"ig-\"]",
    "[class*=\"ig_\"]",
    "[id*=\"ig_\"]",
    ".fa-instagram",
    ".bi-instagram",
    ".icon-instagram",
    "a[title*=\"instagram\"]",
    "a[aria-label*=\"instagram\"]",
    "a[data-label*=\"instagram\"]",
    "a[data-social*=\"instagram\"]",
    "[data-elfsight-app-lazy*=\"instagram\"]",
    "[data-instagram]",
    "[data-insta]",
    "[data-feed*=\"instagram\"]",
];

const HIDDEN_TEXT_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

const SKIPPED_LINK_PREFIXES: &[&str] = &["#", "javascript:", "mailto:", "tel:", "data:"];

const ASSET_EXTENSIONS: &[&str] = &[
    ".jpg", ".jpeg", ".png", ".gif", ".webp", ".svg", ".ico", ".pdf", ".zip", ".rar", ".gz",
    ".mp3", ".mp4", ".avi", ".mov", ".webm", ".doc", ".docx", ".xls", ".xlsx", ".ppt", ".pptx",
    ".css", ".js", ".xml", ".woff", ".woff2", ".ttf",
];

static ANCHORS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("anchor selector is valid"));

static METAS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("meta[content]").expect("meta selector is valid"));

static SOCIAL: LazyLock<Vec<(&'static str, Selector)>> = LazyLock::new(|| {
    SOCIAL_SELECTORS
        .iter()
        .filter_map(|s| Selector::parse(s).ok().map(|sel| (*s, sel)))
        .collect()
});

/// Where and how a username was found on a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageHit {
    pub url: String,
    pub username: String,
    pub status: ExtractionStatus,
    pub notes: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageAnalysis {
    pub hit: Option<PageHit>,
    /// 頁面上有 Instagram 連結但帳號不合法
    pub rejected: Option<String>,
    /// Same-site links to follow, only filled when requested.
    pub links: Vec<String>,
}

pub fn analyze_page(
    html: &str,
    page_url: &str,
    rules: &UsernameRules,
    collect_links: bool,
) -> PageAnalysis {
    let document = Html::parse_document(html);
    let base = Url::parse(page_url).ok();

    let mut analysis = PageAnalysis::default();
    analysis.hit = find_instagram(&document, base.as_ref(), rules, &mut analysis.rejected);

    if collect_links && analysis.hit.is_none() {
        if let Some(base) = &base {
            analysis.links = same_site_links(&document, base);
        }
    }

    analysis
}

fn find_instagram(
    document: &Html,
    base: Option<&Url>,
    rules: &UsernameRules,
    rejected: &mut Option<String>,
) -> Option<PageHit> {
    // 1. 連結本身與連結文字
    for anchor in document.select(&ANCHORS) {
        let href = anchor.value().attr("href").unwrap_or("").trim();

        if is_direct_instagram_ref(href) {
            let resolved = resolve_href(href, base);
            let normalized = normalize_instagram_url(&resolved);
            if let Some(username) = username_from_url(&normalized) {
                match rules.rejection_reason(&username) {
                    None => {
                        return Some(PageHit {
                            url: normalized,
                            username,
                            status: ExtractionStatus::FoundInSite,
                            notes: "Found in a link on the page".to_string(),
                        })
                    }
                    Some(reason) => {
                        tracing::debug!("Rejected linked username '{}': {}", username, reason);
                        rejected.get_or_insert(username);
                    }
                }
            }
        }

        let link_text = collapse_whitespace(&element_text(&anchor));
        if let Some(username) = valid_username_from_text(&link_text, rules) {
            return Some(text_hit(
                username,
                ExtractionStatus::FoundInLinkText,
                format!("Found in link text: \"{}\"", truncate(&link_text, 80)),
            ));
        }
    }

    // 2. 整頁可見文字
    let page_text = visible_text(document);
    if let Some(username) = valid_username_from_text(&page_text, rules) {
        return Some(text_hit(
            username,
            ExtractionStatus::FoundInPageText,
            "Found in page text".to_string(),
        ));
    }

    // 3. meta 標籤（Open Graph 等）
    for meta in document.select(&METAS) {
        let content = meta.value().attr("content").unwrap_or("");
        if content.is_empty() {
            continue;
        }
        if let Some(username) = valid_username_from_text(content, rules) {
            let label = meta
                .value()
                .attr("property")
                .or_else(|| meta.value().attr("name"))
                .unwrap_or("");
            return Some(text_hit(
                username,
                ExtractionStatus::FoundInMetaTag,
                format!("Found in meta tag: {}", label),
            ));
        }
    }

    // 4. 常見社群區塊
    for (selector_text, selector) in SOCIAL.iter() {
        for element in document.select(selector) {
            if let Some(username) = social_element_username(&element, base, rules) {
                return Some(text_hit(
                    username,
                    ExtractionStatus::FoundInSocialSection,
                    format!("Found in section: {}", selector_text),
                ));
            }
        }
    }

    None
}

fn social_element_username(
    element: &ElementRef<'_>,
    base: Option<&Url>,
    rules: &UsernameRules,
) -> Option<String> {
    let text = element_text(element);
    if let Some(username) = valid_username_from_text(&text, rules) {
        return Some(username);
    }

    element
        .value()
        .attrs()
        .filter(|(_, value)| is_direct_instagram_ref(value))
        .filter_map(|(_, value)| {
            username_from_url(&normalize_instagram_url(&resolve_href(value.trim(), base)))
        })
        .find(|username| rules.is_valid(username))
}

fn text_hit(username: String, status: ExtractionStatus, notes: String) -> PageHit {
    PageHit {
        url: profile_url(&username),
        username,
        status,
        notes,
    }
}

fn element_text(element: &ElementRef<'_>) -> String {
    element.text().collect::<Vec<_>>().join(" ")
}

fn visible_text(document: &Html) -> String {
    let mut out = String::new();
    for node in document.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .map(|el| HIDDEN_TEXT_ELEMENTS.contains(&el.name()))
                .unwrap_or(false)
        });
        if !hidden {
            out.push_str(text);
            out.push(' ');
        }
    }
    out
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}

/// 相對連結轉絕對；`//host` 補 https
pub fn resolve_href(href: &str, base: Option<&Url>) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }
    if href.starts_with("//") {
        return format!("https:{}", href);
    }
    match base.and_then(|b| b.join(href).ok()) {
        Some(url) => url.to_string(),
        None => href.to_string(),
    }
}

fn bare_host(url: &Url) -> Option<String> {
    url.host_str().map(|h| {
        let h = h.to_lowercase();
        h.strip_prefix("www.").map(str::to_string).unwrap_or(h)
    })
}

/// Same host (ignoring `www.`) or a subdomain of it.
pub fn is_same_site(base: &Url, candidate: &Url) -> bool {
    match (bare_host(base), bare_host(candidate)) {
        (Some(base_host), Some(host)) => {
            host == base_host || host.ends_with(&format!(".{}", base_host))
        }
        _ => false,
    }
}

fn is_asset(url: &Url) -> bool {
    let path = url.path().to_lowercase();
    ASSET_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

fn same_site_links(document: &Html, base: &Url) -> Vec<String> {
    let mut links = BTreeSet::new();

    for anchor in document.select(&ANCHORS) {
        let href = anchor.value().attr("href").unwrap_or("").trim();
        if href.is_empty() {
            continue;
        }
        let lower = href.to_lowercase();
        if SKIPPED_LINK_PREFIXES.iter().any(|p| lower.starts_with(p)) {
            continue;
        }

        let Ok(mut url) = Url::parse(&resolve_href(href, Some(base))) else {
            continue;
        };
        if !matches!(url.scheme(), "http" | "https") || !is_same_site(base, &url) || is_asset(&url) {
            continue;
        }
        url.set_fragment(None);
        links.insert(url.to_string());
    }

    links.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(html: &str) -> PageAnalysis {
        analyze_page(html, "https://padaria.com.br/", &UsernameRules::default(), true)
    }

    #[test]
    fn test_finds_instagram_link() {
        let html = r#"<html><body>
            <a href="/sobre">Sobre</a>
            <a href="https://www.instagram.com/padaria_central/?hl=pt">Siga</a>
        </body></html>"#;

        let hit = scan(html).hit.unwrap();
        assert_eq!(hit.status, ExtractionStatus::FoundInSite);
        assert_eq!(hit.username, "padaria_central");
        assert_eq!(hit.url, "https://www.instagram.com/padaria_central");
    }

    #[test]
    fn test_finds_handle_in_link_text() {
        let html = r#"<a href="/social">Siga @padaria_central</a>"#;
        let hit = scan(html).hit.unwrap();
        assert_eq!(hit.status, ExtractionStatus::FoundInLinkText);
        assert_eq!(hit.url, "https://www.instagram.com/padaria_central/");
    }

    #[test]
    fn test_finds_handle_in_page_text_ignoring_scripts() {
        let html = r#"<html><head><script>var x = "@tracking_lib";</script></head>
            <body><p>Contato: contato@padaria.com.br</p><p>Instagram: padaria_central</p></body></html>"#;

        let hit = scan(html).hit.unwrap();
        assert_eq!(hit.status, ExtractionStatus::FoundInPageText);
        assert_eq!(hit.username, "padaria_central");
    }

    #[test]
    fn test_finds_handle_in_meta_tag() {
        let html = r#"<html><head>
            <meta property="og:see_also" content="https://instagram.com/padaria_central">
        </head><body><p>Bem-vindo</p></body></html>"#;

        let hit = scan(html).hit.unwrap();
        assert_eq!(hit.status, ExtractionStatus::FoundInMetaTag);
        assert!(hit.notes.contains("og:see_also"));
    }

    #[test]
    fn test_finds_username_in_social_section_attribute() {
        let html = r#"<html><body>
            <div class="footer-social"><i class="fa-instagram" data-href="https://instagram.com/padaria_central"></i></div>
        </body></html>"#;

        let hit = scan(html).hit.unwrap();
        assert_eq!(hit.status, ExtractionStatus::FoundInSocialSection);
        assert_eq!(hit.username, "padaria_central");
    }

    #[test]
    fn test_rejected_link_is_reported() {
        let html = r#"<a href="https://instagram.com/contato_loja">IG</a>"#;
        let analysis = scan(html);
        assert!(analysis.hit.is_none());
        assert_eq!(analysis.rejected.as_deref(), Some("contato_loja"));
    }

    #[test]
    fn test_collects_only_same_site_page_links() {
        let html = r##"<html><body>
            <a href="/sobre#equipe">Sobre</a>
            <a href="https://www.padaria.com.br/contato">Contato</a>
            <a href="https://loja.padaria.com.br/">Loja</a>
            <a href="https://outro.com/">Outro</a>
            <a href="mailto:x@padaria.com.br">Mail</a>
            <a href="tel:123">Tel</a>
            <a href="#topo">Topo</a>
            <a href="/cardapio.pdf">PDF</a>
        </body></html>"##;

        let links = scan(html).links;
        assert_eq!(
            links,
            vec![
                "https://loja.padaria.com.br/".to_string(),
                "https://padaria.com.br/sobre".to_string(),
                "https://www.padaria.com.br/contato".to_string(),
            ]
        );
    }

    #[test]
    fn test_resolve_href() {
        let base = Url::parse("https://site.com/a/b").unwrap();
        assert_eq!(resolve_href("//cdn.site.com/x", Some(&base)), "https://cdn.site.com/x");
        assert_eq!(resolve_href("c", Some(&base)), "https://site.com/a/c");
        assert_eq!(resolve_href("/d", Some(&base)), "https://site.com/d");
        assert_eq!(resolve_href("http://x.com", Some(&base)), "http://x.com");
    }
}
