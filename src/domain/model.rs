use serde::{Deserialize, Serialize};
use std::fmt;

/// 讀入的工作表，所有儲存格都當成文字
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl InputTable {
    pub fn column_values(&self, index: usize) -> impl Iterator<Item = &str> + '_ {
        self.rows
            .iter()
            .map(move |row| row.get(index).map(String::as_str).unwrap_or(""))
    }
}

/// One data row to process; `row_number` is 1-based and excludes the header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteRow {
    pub row_number: usize,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStatus {
    Empty,
    FoundDirect,
    InvalidUsername,
    FoundFromText,
    InvalidUsernameFromText,
    FoundInSite,
    FoundInLinkText,
    FoundInPageText,
    FoundInMetaTag,
    FoundInSocialSection,
    InvalidUsernameCrawled,
    NotFoundAfterScan,
    CrawlError,
}

impl ExtractionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionStatus::Empty => "empty",
            ExtractionStatus::FoundDirect => "found_direct",
            ExtractionStatus::InvalidUsername => "invalid_username",
            ExtractionStatus::FoundFromText => "found_from_text",
            ExtractionStatus::InvalidUsernameFromText => "invalid_username_from_text",
            ExtractionStatus::FoundInSite => "found_in_site",
            ExtractionStatus::FoundInLinkText => "found_in_link_text",
            ExtractionStatus::FoundInPageText => "found_in_page_text",
            ExtractionStatus::FoundInMetaTag => "found_in_meta_tag",
            ExtractionStatus::FoundInSocialSection => "found_in_social_section",
            ExtractionStatus::InvalidUsernameCrawled => "invalid_username_crawled",
            ExtractionStatus::NotFoundAfterScan => "not_found_after_scan",
            ExtractionStatus::CrawlError => "crawl_error",
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(
            self,
            ExtractionStatus::FoundDirect
                | ExtractionStatus::FoundFromText
                | ExtractionStatus::FoundInSite
                | ExtractionStatus::FoundInLinkText
                | ExtractionStatus::FoundInPageText
                | ExtractionStatus::FoundInMetaTag
                | ExtractionStatus::FoundInSocialSection
        )
    }

    pub fn is_invalid(&self) -> bool {
        matches!(
            self,
            ExtractionStatus::InvalidUsername
                | ExtractionStatus::InvalidUsernameFromText
                | ExtractionStatus::InvalidUsernameCrawled
        )
    }
}

impl fmt::Display for ExtractionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileStatus {
    Ok,
    Partial,
    NotFound,
    LoginRequired,
    RateLimited,
    Unparsed,
    Error,
}

impl ProfileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileStatus::Ok => "ok",
            ProfileStatus::Partial => "partial",
            ProfileStatus::NotFound => "not_found",
            ProfileStatus::LoginRequired => "login_required",
            ProfileStatus::RateLimited => "rate_limited",
            ProfileStatus::Unparsed => "unparsed",
            ProfileStatus::Error => "error",
        }
    }
}

impl fmt::Display for ProfileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileInfo {
    pub username: String,
    pub display_name: Option<String>,
    pub followers: Option<u64>,
    pub status: ProfileStatus,
}

impl ProfileInfo {
    pub fn failed(username: &str, status: ProfileStatus) -> Self {
        Self {
            username: username.to_string(),
            display_name: None,
            followers: None,
            status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub row_number: usize,
    pub original_value: String,
    pub instagram_url: String,
    pub instagram_username: String,
    pub status: ExtractionStatus,
    pub notes: String,
    pub pages_scanned: usize,
    pub found_on_page: String,
    pub profile: Option<ProfileInfo>,
}

impl ExtractionResult {
    pub fn new(row: &SiteRow) -> Self {
        Self {
            row_number: row.row_number,
            original_value: row.value.clone(),
            instagram_url: String::new(),
            instagram_username: String::new(),
            status: ExtractionStatus::NotFoundAfterScan,
            notes: String::new(),
            pages_scanned: 0,
            found_on_page: String::new(),
            profile: None,
        }
    }

    pub fn has_username(&self) -> bool {
        !self.instagram_username.is_empty()
    }
}

/// Transform 階段的輸出：原始表格加上每列的抽取結果
#[derive(Debug, Clone)]
pub struct TransformResult {
    pub table: InputTable,
    pub results: Vec<ExtractionResult>,
    pub profiles_enabled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_as_snake_case() {
        let json = serde_json::to_string(&ExtractionStatus::FoundInSocialSection).unwrap();
        assert_eq!(json, "\"found_in_social_section\"");
        assert_eq!(ExtractionStatus::FoundInSocialSection.as_str(), "found_in_social_section");
    }

    #[test]
    fn test_status_groups() {
        assert!(ExtractionStatus::FoundDirect.is_found());
        assert!(ExtractionStatus::FoundInMetaTag.is_found());
        assert!(!ExtractionStatus::NotFoundAfterScan.is_found());
        assert!(ExtractionStatus::InvalidUsernameCrawled.is_invalid());
        assert!(!ExtractionStatus::CrawlError.is_invalid());
    }

    #[test]
    fn test_column_values_pads_short_rows() {
        let table = InputTable {
            headers: vec!["Name".to_string(), "Website".to_string()],
            rows: vec![
                vec!["A".to_string(), "a.com".to_string()],
                vec!["B".to_string()],
            ],
        };
        let values: Vec<&str> = table.column_values(1).collect();
        assert_eq!(values, vec!["a.com", ""]);
    }
}
