use crate::utils::error::{EtlError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::LazyLock;

static ENV_VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([^}]+)\}").expect("env placeholder pattern is valid")
});

/// 選用的 TOML 設定檔；所有鍵都可省略，命令列參數優先
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    pub crawl: Option<CrawlSection>,
    pub instagram: Option<InstagramSection>,
    pub run: Option<RunSection>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrawlSection {
    pub max_depth: Option<usize>,
    pub max_pages: Option<usize>,
    pub timeout_seconds: Option<u64>,
    pub page_delay_ms: Option<u64>,
    pub user_agent: Option<String>,
    pub accept_invalid_certs: Option<bool>,
    pub retry_attempts: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstagramSection {
    pub rate_limit_seconds: Option<f64>,
    pub fetch_profiles: Option<bool>,
    pub profile_base_url: Option<String>,
    pub extra_blocked_terms: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSection {
    pub workers: Option<usize>,
    pub use_browser: Option<bool>,
}

impl TomlConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(EtlError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content);

        toml::from_str(&processed_content).map_err(|e| EtlError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${IG_RATE_LIMIT})；未定義的保留原樣
    fn substitute_env_vars(content: &str) -> String {
        ENV_VAR_PATTERN
            .replace_all(content, |caps: &regex::Captures| {
                let var_name = &caps[1];
                std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
            })
            .into_owned()
    }
}
