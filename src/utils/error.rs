use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("HTTP request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    HttpStatusError { url: String, status: u16 },

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Spreadsheet read error: {0}")]
    SpreadsheetReadError(#[from] calamine::Error),

    #[error("Spreadsheet write error: {0}")]
    SpreadsheetWriteError(#[from] rust_xlsxwriter::XlsxError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error in '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Column '{column}' not found. Available columns: {}", .available.join(", "))]
    ColumnNotFoundError {
        column: String,
        available: Vec<String>,
    },

    #[error("Browser error: {message}")]
    BrowserError { message: String },

    #[error("Data processing error: {message}")]
    ProcessingError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    Config,
    Input,
    Output,
    Parse,
    Browser,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl EtlError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            EtlError::ApiError(_) | EtlError::HttpStatusError { .. } => ErrorCategory::Network,
            EtlError::CsvError(_)
            | EtlError::SpreadsheetReadError(_)
            | EtlError::ColumnNotFoundError { .. } => ErrorCategory::Input,
            EtlError::SpreadsheetWriteError(_) => ErrorCategory::Output,
            EtlError::IoError(_) => ErrorCategory::System,
            EtlError::ConfigValidationError { .. } | EtlError::InvalidConfigValueError { .. } => {
                ErrorCategory::Config
            }
            EtlError::BrowserError { .. } => ErrorCategory::Browser,
            EtlError::ProcessingError { .. } => ErrorCategory::Parse,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Network => ErrorSeverity::Medium,
            ErrorCategory::Browser => ErrorSeverity::Low,
            ErrorCategory::System => ErrorSeverity::Critical,
            ErrorCategory::Config
            | ErrorCategory::Input
            | ErrorCategory::Output
            | ErrorCategory::Parse => ErrorSeverity::High,
        }
    }

    /// 暫時性錯誤：逾時、5xx、429
    pub fn is_retryable(&self) -> bool {
        match self {
            EtlError::ApiError(e) => e.is_timeout(),
            EtlError::HttpStatusError { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            EtlError::ApiError(_) => "Check your network connection or raise --timeout",
            EtlError::HttpStatusError { status: 429, .. } => {
                "Instagram is throttling requests; raise --instagram-rate-limit"
            }
            EtlError::HttpStatusError { .. } => "The remote server failed; try again later",
            EtlError::CsvError(_) => "Make sure the CSV file is UTF-8 with a header row",
            EtlError::SpreadsheetReadError(_) => {
                "Make sure the input is a valid .xlsx/.xls/.ods workbook and --sheet exists"
            }
            EtlError::SpreadsheetWriteError(_) => {
                "Close the output workbook if it is open elsewhere, or write to .csv"
            }
            EtlError::IoError(_) => "Check that the file paths exist and are writable",
            EtlError::ConfigValidationError { .. } | EtlError::InvalidConfigValueError { .. } => {
                "Review the command-line flags and config file"
            }
            EtlError::ColumnNotFoundError { .. } => {
                "Pass one of the listed header names, or a 1-based column number, to --column"
            }
            EtlError::BrowserError { .. } => {
                "Install Chrome/Chromium or rerun with --no-playwright"
            }
            EtlError::ProcessingError { .. } => "Check the input data",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            EtlError::ColumnNotFoundError { column, available } => format!(
                "Column '{}' was not found in the input. Available columns: {}",
                column,
                available.join(", ")
            ),
            EtlError::IoError(e) => format!("File access failed: {}", e),
            EtlError::SpreadsheetReadError(e) => format!("Could not read the input workbook: {}", e),
            EtlError::SpreadsheetWriteError(e) => {
                format!("Could not write the output workbook: {}", e)
            }
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EtlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_errors_are_retryable_only_when_transient() {
        let throttled = EtlError::HttpStatusError {
            url: "https://www.instagram.com/x/".to_string(),
            status: 429,
        };
        let server = EtlError::HttpStatusError {
            url: "https://example.com".to_string(),
            status: 503,
        };
        let missing = EtlError::HttpStatusError {
            url: "https://example.com".to_string(),
            status: 404,
        };

        assert!(throttled.is_retryable());
        assert!(server.is_retryable());
        assert!(!missing.is_retryable());
        assert_eq!(throttled.severity(), ErrorSeverity::Medium);
    }

    #[test]
    fn test_column_not_found_lists_available_headers() {
        let err = EtlError::ColumnNotFoundError {
            column: "Site".to_string(),
            available: vec!["Name".to_string(), "Website".to_string()],
        };

        assert_eq!(err.category(), ErrorCategory::Input);
        assert_eq!(err.severity(), ErrorSeverity::High);
        assert!(err.to_string().contains("Name, Website"));
        assert!(err.user_friendly_message().contains("Website"));
    }

    #[test]
    fn test_io_errors_are_critical() {
        let err = EtlError::IoError(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        ));
        assert_eq!(err.category(), ErrorCategory::System);
        assert_eq!(err.severity(), ErrorSeverity::Critical);
    }
}
