pub mod cli;
pub mod toml_config;

use crate::core::ConfigProvider;
use crate::utils::error::Result;
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use toml_config::TomlConfig;

#[cfg(feature = "cli")]
use crate::utils::logger::LogFormat;
#[cfg(feature = "cli")]
use clap::Parser;

pub const DEFAULT_OUTPUT_PATH: &str = "instagram_results.xlsx";
pub const DEFAULT_PROFILE_BASE_URL: &str = "https://www.instagram.com";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

pub const INPUT_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xls", "xlsb", "ods", "csv"];
pub const OUTPUT_EXTENSIONS: &[&str] = &["xlsx", "csv"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlSettings {
    pub max_depth: usize,
    pub max_pages: usize,
    pub timeout_seconds: u64,
    pub page_delay_ms: u64,
    pub user_agent: String,
    pub accept_invalid_certs: bool,
    pub retry_attempts: usize,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            max_depth: 2,
            max_pages: 5,
            timeout_seconds: 10,
            page_delay_ms: 500,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            accept_invalid_certs: true,
            retry_attempts: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstagramSettings {
    pub rate_limit_seconds: f64,
    pub fetch_profiles: bool,
    pub profile_base_url: String,
    pub extra_blocked_terms: Vec<String>,
}

impl Default for InstagramSettings {
    fn default() -> Self {
        Self {
            rate_limit_seconds: 3.0,
            fetch_profiles: true,
            profile_base_url: DEFAULT_PROFILE_BASE_URL.to_string(),
            extra_blocked_terms: Vec::new(),
        }
    }
}

/// Fully resolved run settings: defaults, then the TOML file, then CLI flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractSettings {
    pub input_path: String,
    pub column: String,
    pub output_path: String,
    pub sheet: Option<String>,
    pub limit: Option<usize>,
    pub workers: usize,
    pub use_browser: bool,
    pub crawl: CrawlSettings,
    pub instagram: InstagramSettings,
}

impl ExtractSettings {
    pub fn new(input_path: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            input_path: input_path.into(),
            column: column.into(),
            output_path: DEFAULT_OUTPUT_PATH.to_string(),
            sheet: None,
            limit: None,
            workers: 5,
            use_browser: true,
            crawl: CrawlSettings::default(),
            instagram: InstagramSettings::default(),
        }
    }

    /// 套用設定檔中有寫到的欄位
    pub fn apply_file(&mut self, file: &TomlConfig) {
        if let Some(crawl) = &file.crawl {
            if let Some(v) = crawl.max_depth {
                self.crawl.max_depth = v;
            }
            if let Some(v) = crawl.max_pages {
                self.crawl.max_pages = v;
            }
            if let Some(v) = crawl.timeout_seconds {
                self.crawl.timeout_seconds = v;
            }
            if let Some(v) = crawl.page_delay_ms {
                self.crawl.page_delay_ms = v;
            }
            if let Some(v) = &crawl.user_agent {
                self.crawl.user_agent = v.clone();
            }
            if let Some(v) = crawl.accept_invalid_certs {
                self.crawl.accept_invalid_certs = v;
            }
            if let Some(v) = crawl.retry_attempts {
                self.crawl.retry_attempts = v;
            }
        }

        if let Some(instagram) = &file.instagram {
            if let Some(v) = instagram.rate_limit_seconds {
                self.instagram.rate_limit_seconds = v;
            }
            if let Some(v) = instagram.fetch_profiles {
                self.instagram.fetch_profiles = v;
            }
            if let Some(v) = &instagram.profile_base_url {
                self.instagram.profile_base_url = v.trim_end_matches('/').to_string();
            }
            if let Some(v) = &instagram.extra_blocked_terms {
                self.instagram.extra_blocked_terms = v.clone();
            }
        }

        if let Some(run) = &file.run {
            if let Some(v) = run.workers {
                self.workers = v;
            }
            if let Some(v) = run.use_browser {
                self.use_browser = v;
            }
        }
    }
}

impl ConfigProvider for ExtractSettings {
    fn input_path(&self) -> &str {
        &self.input_path
    }

    fn column(&self) -> &str {
        &self.column
    }

    fn output_path(&self) -> &str {
        &self.output_path
    }

    fn sheet(&self) -> Option<&str> {
        self.sheet.as_deref()
    }

    fn row_limit(&self) -> Option<usize> {
        self.limit
    }

    fn workers(&self) -> usize {
        self.workers
    }

    fn crawl(&self) -> &CrawlSettings {
        &self.crawl
    }

    fn instagram(&self) -> &InstagramSettings {
        &self.instagram
    }

    fn use_browser(&self) -> bool {
        self.use_browser
    }
}

impl Validate for ExtractSettings {
    fn validate(&self) -> Result<()> {
        validation::validate_path("input", &self.input_path)?;
        validation::validate_file_extension("input", &self.input_path, INPUT_EXTENSIONS)?;
        validation::validate_path("output", &self.output_path)?;
        validation::validate_file_extension("output", &self.output_path, OUTPUT_EXTENSIONS)?;
        validation::validate_non_empty_string("column", &self.column)?;
        validation::validate_positive_number("workers", self.workers, 1)?;
        validation::validate_positive_number("max_pages", self.crawl.max_pages, 1)?;
        validation::validate_positive_number(
            "timeout",
            self.crawl.timeout_seconds as usize,
            1,
        )?;
        validation::validate_non_empty_string("user_agent", &self.crawl.user_agent)?;
        validation::validate_seconds("instagram_rate_limit", self.instagram.rate_limit_seconds)?;
        validation::validate_http_url("profile_base_url", &self.instagram.profile_base_url)?;
        if let Some(limit) = self.limit {
            validation::validate_positive_number("limit", limit, 1)?;
        }
        Ok(())
    }
}

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Parser)]
#[command(name = "insta-etl")]
#[command(about = "Find Instagram profiles for a spreadsheet of website URLs")]
pub struct CliConfig {
    /// Input workbook (.xlsx, .xls, .ods) or .csv file
    #[arg(long)]
    pub input: String,

    /// Column holding the site URLs: header name or 1-based position
    #[arg(long)]
    pub column: String,

    /// Output file (.xlsx or .csv)
    #[arg(long, default_value = DEFAULT_OUTPUT_PATH)]
    pub output: String,

    /// Worksheet to read (defaults to the first one)
    #[arg(long)]
    pub sheet: Option<String>,

    /// Skip fetching display name and follower count
    #[arg(long)]
    pub no_profile_info: bool,

    /// Never render pages with the headless browser
    #[arg(long, visible_alias = "no-browser")]
    pub no_playwright: bool,

    /// Minimum seconds between Instagram requests
    #[arg(long)]
    pub instagram_rate_limit: Option<f64>,

    /// Process only the first N data rows
    #[arg(long)]
    pub limit: Option<usize>,

    /// Rows processed concurrently
    #[arg(long)]
    pub workers: Option<usize>,

    /// Maximum crawl depth per site
    #[arg(long)]
    pub depth: Option<usize>,

    /// Maximum pages scanned per site
    #[arg(long)]
    pub max_pages: Option<usize>,

    /// HTTP timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Optional TOML configuration file
    #[arg(long)]
    pub config: Option<String>,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, value_enum, default_value_t = LogFormat::Compact)]
    pub log_format: LogFormat,

    #[arg(long, help = "Log CPU and memory usage per phase")]
    pub monitor: bool,
}

#[cfg(feature = "cli")]
impl CliConfig {
    /// 預設值 → 設定檔 → 命令列
    pub fn resolve(&self) -> Result<ExtractSettings> {
        let file = match &self.config {
            Some(path) => Some(TomlConfig::from_file(path)?),
            None => None,
        };
        Ok(self.resolve_with(file.as_ref()))
    }

    pub fn resolve_with(&self, file: Option<&TomlConfig>) -> ExtractSettings {
        let mut settings = ExtractSettings::new(self.input.clone(), self.column.clone());
        settings.output_path = self.output.clone();
        settings.sheet = self.sheet.clone();
        settings.limit = self.limit;

        if let Some(file) = file {
            settings.apply_file(file);
        }

        if let Some(v) = self.workers {
            settings.workers = v;
        }
        if let Some(v) = self.depth {
            settings.crawl.max_depth = v;
        }
        if let Some(v) = self.max_pages {
            settings.crawl.max_pages = v;
        }
        if let Some(v) = self.timeout {
            settings.crawl.timeout_seconds = v;
        }
        if let Some(v) = self.instagram_rate_limit {
            settings.instagram.rate_limit_seconds = v;
        }
        if self.no_profile_info {
            settings.instagram.fetch_profiles = false;
        }
        if self.no_playwright {
            settings.use_browser = false;
        }

        settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = ExtractSettings::new("sites.xlsx", "Website");
        assert!(settings.validate().is_ok());
        assert_eq!(settings.crawl.max_depth, 2);
        assert_eq!(settings.crawl.max_pages, 5);
        assert_eq!(settings.output_path, DEFAULT_OUTPUT_PATH);
        assert!(settings.instagram.fetch_profiles);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut settings = ExtractSettings::new("sites.txt", "Website");
        assert!(settings.validate().is_err());

        settings.input_path = "sites.csv".to_string();
        settings.workers = 0;
        assert!(settings.validate().is_err());

        settings.workers = 1;
        settings.instagram.rate_limit_seconds = -2.0;
        assert!(settings.validate().is_err());

        settings.instagram.rate_limit_seconds = 1e20;
        assert!(settings.validate().is_err());

        settings.instagram.rate_limit_seconds = 0.0;
        settings.output_path = "out.json".to_string();
        assert!(settings.validate().is_err());

        settings.output_path = "out.csv".to_string();
        settings.column = "  ".to_string();
        assert!(settings.validate().is_err());

        settings.column = "2".to_string();
        settings.limit = Some(0);
        assert!(settings.validate().is_err());

        settings.limit = Some(10);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_file_values_apply_over_defaults() {
        let file = TomlConfig::from_toml_str(
            r#"
[crawl]
max_pages = 9
[instagram]
profile_base_url = "http://localhost:1234/"
extra_blocked_terms = ["loja"]
[run]
use_browser = false
"#,
        )
        .unwrap();

        let mut settings = ExtractSettings::new("sites.xlsx", "Website");
        settings.apply_file(&file);

        assert_eq!(settings.crawl.max_pages, 9);
        assert_eq!(settings.crawl.max_depth, 2);
        assert_eq!(settings.instagram.profile_base_url, "http://localhost:1234");
        assert_eq!(settings.instagram.extra_blocked_terms, vec!["loja".to_string()]);
        assert!(!settings.use_browser);
    }

    #[cfg(feature = "cli")]
    #[test]
    fn test_cli_flags_override_file() {
        let cli = CliConfig::parse_from([
            "insta-etl",
            "--input",
            "sites.xlsx",
            "--column",
            "Website",
            "--no-profile-info",
            "--no-browser",
            "--instagram-rate-limit",
            "0.5",
            "--limit",
            "3",
            "--max-pages",
            "2",
        ]);
        let file = TomlConfig::from_toml_str(
            "[crawl]\nmax_pages = 9\nmax_depth = 4\n[instagram]\nfetch_profiles = true\n",
        )
        .unwrap();

        let settings = cli.resolve_with(Some(&file));

        assert_eq!(settings.crawl.max_pages, 2);
        assert_eq!(settings.crawl.max_depth, 4);
        assert!(!settings.instagram.fetch_profiles);
        assert!(!settings.use_browser);
        assert_eq!(settings.instagram.rate_limit_seconds, 0.5);
        assert_eq!(settings.limit, Some(3));
        assert_eq!(settings.output_path, DEFAULT_OUTPUT_PATH);
    }
}
