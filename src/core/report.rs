use crate::adapters::spreadsheet::{Cell, OutputSheet};
use crate::domain::model::{ExtractionResult, ExtractionStatus, ProfileStatus};
use chrono::{DateTime, Local};
use std::collections::BTreeMap;
use std::fmt;

pub const SUMMARY_SHEET: &str = "Summary";
const MAX_EXAMPLES: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct ValidExample {
    pub username: String,
    pub original: String,
    pub status: ExtractionStatus,
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InvalidExample {
    pub status: ExtractionStatus,
    pub original: String,
    pub notes: String,
}

/// Aggregated view of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionReport {
    pub generated_at: DateTime<Local>,
    pub total: usize,
    pub status_counts: BTreeMap<ExtractionStatus, usize>,
    pub valid_found: usize,
    pub discovery_methods: BTreeMap<ExtractionStatus, usize>,
    pub average_pages: f64,
    pub max_pages: usize,
    pub valid_examples: Vec<ValidExample>,
    pub invalid_total: usize,
    pub invalid_examples: Vec<InvalidExample>,
    pub crawled_sites: usize,
    pub crawled_with_username: usize,
    pub profiles_fetched: usize,
    pub profiles_with_followers: usize,
    pub profile_counts: BTreeMap<ProfileStatus, usize>,
}

/// 超過 `max` 字元時截斷並加上 "..."
pub fn truncate(value: &str, max: usize) -> String {
    if value.chars().count() > max {
        format!("{}...", value.chars().take(max).collect::<String>())
    } else {
        value.to_string()
    }
}

fn percent(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

/// 依數量遞減排序，數量相同時依狀態順序
fn by_count<K: Copy + Ord>(counts: &BTreeMap<K, usize>) -> Vec<(K, usize)> {
    let mut entries: Vec<(K, usize)> = counts.iter().map(|(k, v)| (*k, *v)).collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    entries
}

impl ExtractionReport {
    pub fn from_results(results: &[ExtractionResult]) -> Self {
        let total = results.len();
        let mut status_counts = BTreeMap::new();
        let mut discovery_methods = BTreeMap::new();
        let mut profile_counts = BTreeMap::new();
        let mut valid_examples = Vec::new();
        let mut invalid_examples = Vec::new();
        let mut valid_found = 0;
        let mut invalid_total = 0;
        let mut crawled_sites = 0;
        let mut crawled_with_username = 0;
        let mut profiles_fetched = 0;
        let mut profiles_with_followers = 0;
        let mut pages_sum = 0;
        let mut max_pages = 0;

        for result in results {
            *status_counts.entry(result.status).or_insert(0) += 1;
            pages_sum += result.pages_scanned;
            max_pages = max_pages.max(result.pages_scanned);

            if result.has_username() {
                valid_found += 1;
                *discovery_methods.entry(result.status).or_insert(0) += 1;
                if valid_examples.len() < MAX_EXAMPLES {
                    valid_examples.push(ValidExample {
                        username: result.instagram_username.clone(),
                        original: truncate(&result.original_value, 50),
                        status: result.status,
                        notes: truncate(&result.notes, 50),
                    });
                }
            }

            if result.status.is_invalid() {
                invalid_total += 1;
                if invalid_examples.len() < MAX_EXAMPLES {
                    invalid_examples.push(InvalidExample {
                        status: result.status,
                        original: truncate(&result.original_value, 50),
                        notes: truncate(&result.notes, 100),
                    });
                }
            }

            if result.pages_scanned > 0 {
                crawled_sites += 1;
                if result.has_username() {
                    crawled_with_username += 1;
                }
            }

            if let Some(profile) = &result.profile {
                profiles_fetched += 1;
                if profile.followers.is_some() {
                    profiles_with_followers += 1;
                }
                *profile_counts.entry(profile.status).or_insert(0) += 1;
            }
        }

        let average_pages = if total == 0 {
            0.0
        } else {
            pages_sum as f64 / total as f64
        };

        Self {
            generated_at: Local::now(),
            total,
            status_counts,
            valid_found,
            discovery_methods,
            average_pages,
            max_pages,
            valid_examples,
            invalid_total,
            invalid_examples,
            crawled_sites,
            crawled_with_username,
            profiles_fetched,
            profiles_with_followers,
            profile_counts,
        }
    }

    pub fn valid_percent(&self) -> f64 {
        percent(self.valid_found, self.total)
    }

    pub fn status_percent(&self, status: ExtractionStatus) -> f64 {
        percent(self.status_counts.get(&status).copied().unwrap_or(0), self.total)
    }

    /// 有掃描頁面的網站中，找到帳號的比例
    pub fn crawl_success_rate(&self) -> f64 {
        percent(self.crawled_with_username, self.crawled_sites)
    }

    /// The report as a two-column `Metric`/`Value` sheet.
    pub fn to_sheet(&self) -> OutputSheet {
        let mut rows = Vec::new();
        let mut push = |metric: String, value: Cell| rows.push(vec![Cell::text(metric), value]);

        push(
            "Generated at".to_string(),
            Cell::text(self.generated_at.format("%Y-%m-%d %H:%M:%S").to_string()),
        );
        push("Total rows".to_string(), Cell::Number(self.total as f64));
        for (status, count) in by_count(&self.status_counts) {
            push(
                format!("Status: {}", status),
                Cell::text(format!("{} ({:.1}%)", count, self.status_percent(status))),
            );
        }
        push(
            "Valid usernames found".to_string(),
            Cell::text(format!("{} ({:.1}%)", self.valid_found, self.valid_percent())),
        );
        for (status, count) in by_count(&self.discovery_methods) {
            push(format!("Discovery: {}", status), Cell::Number(count as f64));
        }
        push(
            "Average pages scanned".to_string(),
            Cell::Number((self.average_pages * 10.0).round() / 10.0),
        );
        push("Max pages scanned".to_string(), Cell::Number(self.max_pages as f64));
        push("Invalid usernames detected".to_string(), Cell::Number(self.invalid_total as f64));
        push("Crawled sites".to_string(), Cell::Number(self.crawled_sites as f64));
        push(
            "Crawl success rate".to_string(),
            Cell::text(format!("{:.1}%", self.crawl_success_rate())),
        );
        if self.profiles_fetched > 0 {
            push("Profiles fetched".to_string(), Cell::Number(self.profiles_fetched as f64));
            push(
                "Profiles with follower count".to_string(),
                Cell::Number(self.profiles_with_followers as f64),
            );
            for (status, count) in by_count(&self.profile_counts) {
                push(format!("Profile: {}", status), Cell::Number(count as f64));
            }
        }

        OutputSheet {
            name: SUMMARY_SHEET.to_string(),
            headers: vec!["Metric".to_string(), "Value".to_string()],
            rows,
        }
    }
}

impl fmt::Display for ExtractionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(80);
        let thin = "-".repeat(80);

        writeln!(f, "{}", rule)?;
        writeln!(f, "INSTAGRAM EXTRACTION REPORT")?;
        writeln!(f, "{}", rule)?;
        writeln!(f)?;
        writeln!(f, "TOTAL ROWS: {}", self.total)?;
        writeln!(f)?;
        writeln!(f, "STATUS DISTRIBUTION:")?;
        for (status, count) in by_count(&self.status_counts) {
            writeln!(f, "  {}: {} ({:.1}%)", status, count, self.status_percent(status))?;
        }

        writeln!(f)?;
        writeln!(
            f,
            "VALID INSTAGRAMS FOUND: {} ({:.1}%)",
            self.valid_found,
            self.valid_percent()
        )?;
        if !self.discovery_methods.is_empty() {
            writeln!(f)?;
            writeln!(f, "DISCOVERY METHODS:")?;
            for (status, count) in by_count(&self.discovery_methods) {
                writeln!(f, "  {}: {}", status, count)?;
            }
        }

        writeln!(f)?;
        writeln!(f, "CRAWL STATISTICS:")?;
        writeln!(f, "  Average pages scanned per site: {:.1}", self.average_pages)?;
        writeln!(f, "  Max pages scanned: {}", self.max_pages)?;

        if !self.valid_examples.is_empty() {
            writeln!(f)?;
            writeln!(f, "VALID USERNAME EXAMPLES:")?;
            writeln!(f, "{}", thin)?;
            for example in &self.valid_examples {
                writeln!(f, "  @{}", example.username)?;
                writeln!(f, "    Original: {}", example.original)?;
                writeln!(f, "    Status: {}", example.status)?;
                writeln!(f, "    Notes: {}", example.notes)?;
                writeln!(f)?;
            }
        }

        if self.invalid_total > 0 {
            writeln!(f)?;
            writeln!(f, "INVALID USERNAMES DETECTED: {}", self.invalid_total)?;
            writeln!(f, "{}", thin)?;
            for example in &self.invalid_examples {
                writeln!(f, "  Status: {}", example.status)?;
                writeln!(f, "    Original: {}", example.original)?;
                writeln!(f, "    Notes: {}", example.notes)?;
                writeln!(f)?;
            }
        }

        if self.crawled_sites > 0 {
            writeln!(f)?;
            writeln!(f, "CRAWLED SITES: {}", self.crawled_sites)?;
            writeln!(f, "  Crawl success rate: {:.1}%", self.crawl_success_rate())?;
        }

        if self.profiles_fetched > 0 {
            writeln!(f)?;
            writeln!(
                f,
                "PROFILES FETCHED: {} ({} with follower count)",
                self.profiles_fetched, self.profiles_with_followers
            )?;
            for (status, count) in by_count(&self.profile_counts) {
                writeln!(f, "  {}: {}", status, count)?;
            }
        }

        writeln!(f)?;
        write!(f, "{}", rule)
    }
}
