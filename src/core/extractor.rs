use crate::core::crawler::SiteCrawler;
use crate::core::profile::ProfileFetcher;
use crate::core::username::{
    is_direct_instagram_ref, normalize_instagram_url, profile_url, username_from_text,
    username_from_url, UsernameRules,
};
use crate::domain::model::{ExtractionResult, ExtractionStatus, SiteRow};
use tracing::{debug, info};

/// Resolves one spreadsheet value into an Instagram profile.
#[derive(Clone)]
pub struct InstagramExtractor {
    rules: UsernameRules,
    crawler: SiteCrawler,
    profiles: Option<ProfileFetcher>,
}

impl InstagramExtractor {
    pub fn new(rules: UsernameRules, crawler: SiteCrawler, profiles: Option<ProfileFetcher>) -> Self {
        Self {
            rules,
            crawler,
            profiles,
        }
    }

    pub async fn process_row(&self, row: &SiteRow) -> ExtractionResult {
        let mut result = self.extract(row).await;

        if let Some(profiles) = &self.profiles {
            if result.status.is_found() {
                result.profile = Some(profiles.fetch(&result.instagram_username).await);
            }
        }

        result
    }

    pub async fn extract(&self, row: &SiteRow) -> ExtractionResult {
        if let Some(result) = self.classify_offline(row) {
            return result;
        }

        let mut result = ExtractionResult::new(row);
        let target = compact(&row.value);
        info!("🔎 Row {}: scanning site {}", row.row_number, target);

        let outcome = self.crawler.crawl(&target).await;
        result.pages_scanned = outcome.pages_scanned;

        match outcome.hit {
            Some(hit) => {
                result.instagram_url = hit.url;
                result.instagram_username = hit.username;
                result.status = hit.status;
                result.notes = hit.notes;
                result.found_on_page = outcome.found_on_page;
            }
            None => match (outcome.rejected, outcome.start_error) {
                (Some(username), _) => {
                    let reason = self.rules.rejection_reason(&username).unwrap_or_default();
                    result.status = ExtractionStatus::InvalidUsernameCrawled;
                    result.notes = format!("Invalid username found: {} ({})", username, reason);
                }
                (None, Some(error)) if outcome.pages_scanned == 0 => {
                    result.status = ExtractionStatus::CrawlError;
                    result.notes = format!("Crawl failed: {}", error);
                }
                (None, _) => {
                    result.status = ExtractionStatus::NotFoundAfterScan;
                    result.notes = format!(
                        "scanned {} pages, Instagram not found",
                        outcome.pages_scanned
                    );
                }
            },
        }

        debug!(
            "Row {} -> {} ({} pages)",
            row.row_number, result.status, result.pages_scanned
        );
        result
    }

    /// 不需連線即可判定的情況：空值、Instagram 連結、文字中的 @帳號
    pub fn classify_offline(&self, row: &SiteRow) -> Option<ExtractionResult> {
        let mut result = ExtractionResult::new(row);

        if row.value.trim().is_empty() {
            result.status = ExtractionStatus::Empty;
            return Some(result);
        }

        let value = compact(&row.value);

        if is_direct_instagram_ref(&value) {
            let normalized = normalize_instagram_url(&value);
            result.instagram_url = normalized.clone();
            match username_from_url(&normalized) {
                Some(username) => match self.rules.rejection_reason(&username) {
                    None => {
                        result.instagram_username = username;
                        result.status = ExtractionStatus::FoundDirect;
                        result.notes = "Direct Instagram link".to_string();
                    }
                    Some(reason) => {
                        result.status = ExtractionStatus::InvalidUsername;
                        result.notes = format!("Invalid username: {} ({})", username, reason);
                    }
                },
                None => {
                    result.status = ExtractionStatus::InvalidUsername;
                    result.notes = "no username in Instagram link".to_string();
                }
            }
            return Some(result);
        }

        if let Some(username) = username_from_text(&value) {
            match self.rules.rejection_reason(&username) {
                None => {
                    result.instagram_url = profile_url(&username);
                    result.instagram_username = username;
                    result.status = ExtractionStatus::FoundFromText;
                    result.notes = "Extracted from @handle text".to_string();
                }
                Some(reason) => {
                    result.status = ExtractionStatus::InvalidUsernameFromText;
                    result.notes = format!(
                        "Invalid username extracted from text: {} ({})",
                        username, reason
                    );
                }
            }
            return Some(result);
        }

        None
    }
}

fn compact(value: &str) -> String {
    value.chars().filter(|c| !c.is_whitespace()).collect()
}
