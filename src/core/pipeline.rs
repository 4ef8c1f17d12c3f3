use crate::adapters::http::HttpFetcher;
use crate::adapters::spreadsheet::{
    read_table, render_csv, render_xlsx, resolve_column, Cell, OutputSheet, SheetFormat,
};
use crate::core::crawler::SiteCrawler;
use crate::core::extractor::InstagramExtractor;
use crate::core::profile::ProfileFetcher;
use crate::core::rate_limit::InstagramRateLimiter;
use crate::core::report::ExtractionReport;
use crate::core::username::UsernameRules;
use crate::core::{ConfigProvider, InputTable, PageFetcher, Pipeline, Storage, TransformResult};
use crate::domain::model::{ExtractionResult, SiteRow};
use crate::utils::error::Result;
use futures::stream::{self, StreamExt};
use std::path::Path;
use std::sync::Arc;

pub const RESULTS_SHEET: &str = "Results";
const PROGRESS_EVERY: usize = 10;

pub const RESULT_COLUMNS: &[&str] = &[
    "Row",
    "Original URL",
    "Instagram URL",
    "Instagram Username",
    "Status",
    "Pages Scanned",
    "Found On Page",
    "Notes",
];

pub const PROFILE_COLUMNS: &[&str] = &["Display Name", "Followers", "Profile Status"];

/// Spreadsheet in, Instagram profiles out.
pub struct InstagramPipeline<S: Storage, C: ConfigProvider> {
    storage: S,
    config: C,
    extractor: Arc<InstagramExtractor>,
}

impl<S: Storage, C: ConfigProvider> InstagramPipeline<S, C> {
    pub fn new(storage: S, config: C) -> Result<Self> {
        let crawl = config.crawl().clone();
        let instagram = config.instagram();

        let http: Arc<dyn PageFetcher> = Arc::new(HttpFetcher::from_settings(&crawl)?);
        let browser = if config.use_browser() {
            launch_browser(&config)
        } else {
            tracing::debug!("Browser rendering disabled");
            None
        };

        let rules = UsernameRules::new(&instagram.extra_blocked_terms);
        let crawler = SiteCrawler::new(http.clone(), browser, rules.clone(), crawl);

        let profiles = if instagram.fetch_profiles {
            let limiter = InstagramRateLimiter::from_seconds(instagram.rate_limit_seconds)?;
            tracing::debug!("Instagram rate limiter: {:?}", limiter);
            Some(ProfileFetcher::new(http, limiter, &instagram.profile_base_url))
        } else {
            None
        };

        Ok(Self {
            storage,
            config,
            extractor: Arc::new(InstagramExtractor::new(rules, crawler, profiles)),
        })
    }

    fn profiles_enabled(&self) -> bool {
        self.config.instagram().fetch_profiles
    }

    fn results_sheet(&self, result: &TransformResult) -> OutputSheet {
        let mut headers = result.table.headers.clone();
        headers.extend(RESULT_COLUMNS.iter().map(|c| c.to_string()));
        if result.profiles_enabled {
            headers.extend(PROFILE_COLUMNS.iter().map(|c| c.to_string()));
        }

        let rows = result
            .results
            .iter()
            .map(|r| {
                let input = result
                    .table
                    .rows
                    .get(r.row_number.saturating_sub(1))
                    .map(Vec::as_slice)
                    .unwrap_or_default();
                output_row(input, r, result.profiles_enabled)
            })
            .collect();

        OutputSheet {
            name: RESULTS_SHEET.to_string(),
            headers,
            rows,
        }
    }

    /// xlsx 寫入失敗時改寫同名 .csv
    async fn write_workbook(&self, output_path: &str, sheets: &[OutputSheet]) -> Result<String> {
        let written = match render_xlsx(sheets) {
            Ok(bytes) => self.storage.write_file(output_path, &bytes).await,
            Err(e) => Err(e),
        };

        match written {
            Ok(()) => Ok(output_path.to_string()),
            Err(e) => {
                let fallback = Path::new(output_path)
                    .with_extension("csv")
                    .to_string_lossy()
                    .into_owned();
                tracing::warn!(
                    "⚠️ Could not write {}: {}. Falling back to {}",
                    output_path,
                    e,
                    fallback
                );
                let bytes = render_csv(&sheets[0])?;
                self.storage.write_file(&fallback, &bytes).await?;
                Ok(fallback)
            }
        }
    }
}

#[cfg(feature = "browser")]
fn launch_browser<C: ConfigProvider>(config: &C) -> Option<Arc<dyn PageFetcher>> {
    match crate::adapters::browser::BrowserFetcher::launch(config.crawl()) {
        Ok(browser) => {
            tracing::info!("🌐 Headless browser ready for JavaScript-rendered pages");
            Some(Arc::new(browser))
        }
        Err(e) => {
            tracing::warn!("⚠️ {}. Continuing with plain HTTP", e);
            None
        }
    }
}

#[cfg(not(feature = "browser"))]
fn launch_browser<C: ConfigProvider>(_config: &C) -> Option<Arc<dyn PageFetcher>> {
    tracing::warn!("⚠️ Built without the `browser` feature. Continuing with plain HTTP");
    None
}

fn output_row(input: &[String], result: &ExtractionResult, profiles_enabled: bool) -> Vec<Cell> {
    let mut row: Vec<Cell> = input.iter().map(|v| Cell::text(v.as_str())).collect();

    row.push(Cell::Number(result.row_number as f64));
    row.push(Cell::text(result.original_value.as_str()));
    row.push(Cell::text(result.instagram_url.as_str()));
    row.push(Cell::text(result.instagram_username.as_str()));
    row.push(Cell::text(result.status.as_str()));
    row.push(Cell::Number(result.pages_scanned as f64));
    row.push(Cell::text(result.found_on_page.as_str()));
    row.push(Cell::text(result.notes.as_str()));

    if profiles_enabled {
        match &result.profile {
            Some(profile) => {
                row.push(Cell::text(profile.display_name.clone().unwrap_or_default()));
                row.push(
                    profile
                        .followers
                        .map(|f| Cell::Number(f as f64))
                        .unwrap_or(Cell::Empty),
                );
                row.push(Cell::text(profile.status.as_str()));
            }
            None => row.extend([Cell::Empty, Cell::Empty, Cell::Empty]),
        }
    }

    row
}

#[async_trait::async_trait]
impl<S: Storage, C: ConfigProvider> Pipeline for InstagramPipeline<S, C> {
    async fn extract(&self) -> Result<InputTable> {
        let input_path = self.config.input_path();
        let format = SheetFormat::from_path(input_path)?;

        tracing::debug!("Reading input from: {}", input_path);
        let bytes = self.storage.read_file(input_path).await?;
        let mut table = read_table(bytes, format, self.config.sheet())?;

        if let Some(limit) = self.config.row_limit() {
            if table.rows.len() > limit {
                tracing::info!("Limiting run to the first {} of {} rows", limit, table.rows.len());
                table.rows.truncate(limit);
            }
        }

        tracing::debug!(
            "Loaded {} rows with columns: {}",
            table.rows.len(),
            table.headers.join(", ")
        );
        Ok(table)
    }

    async fn transform(&self, table: InputTable) -> Result<TransformResult> {
        let column = resolve_column(&table, self.config.column())?;
        tracing::info!(
            "Using column '{}' ({} rows, {} workers)",
            table.headers[column],
            table.rows.len(),
            self.config.workers()
        );

        let rows: Vec<SiteRow> = table
            .column_values(column)
            .enumerate()
            .map(|(idx, value)| SiteRow {
                row_number: idx + 1,
                value: value.to_string(),
            })
            .collect();
        let total = rows.len();

        let extractor = self.extractor.clone();
        let mut pending = stream::iter(rows)
            .map(move |row| {
                let extractor = extractor.clone();
                async move { extractor.process_row(&row).await }
            })
            .buffer_unordered(self.config.workers().max(1));

        let mut results = Vec::with_capacity(total);
        while let Some(result) = pending.next().await {
            results.push(result);
            if results.len() % PROGRESS_EVERY == 0 {
                tracing::info!("📊 Progress: {}/{} rows", results.len(), total);
            }
        }

        results.sort_by_key(|r| r.row_number);

        Ok(TransformResult {
            table,
            results,
            profiles_enabled: self.profiles_enabled(),
        })
    }

    async fn load(&self, result: &TransformResult) -> Result<String> {
        let output_path = self.config.output_path();
        let results = self.results_sheet(result);

        match SheetFormat::from_path(output_path)? {
            SheetFormat::Csv => {
                tracing::debug!("Writing {} rows as CSV", results.rows.len());
                let bytes = render_csv(&results)?;
                self.storage.write_file(output_path, &bytes).await?;
                Ok(output_path.to_string())
            }
            SheetFormat::Workbook => {
                let summary = ExtractionReport::from_results(&result.results).to_sheet();
                tracing::debug!("Writing {} rows as a workbook", results.rows.len());
                self.write_workbook(output_path, &[results, summary]).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtractSettings;
    use crate::domain::model::ExtractionStatus;
    use crate::utils::error::EtlError;
    use httpmock::prelude::*;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    #[derive(Clone, Default)]
    struct MockStorage {
        files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
        reject_xlsx: bool,
    }

    impl MockStorage {
        fn with_file(path: &str, data: &str) -> Self {
            let storage = Self::default();
            storage
                .files
                .try_lock()
                .unwrap()
                .insert(path.to_string(), data.as_bytes().to_vec());
            storage
        }

        async fn get_file(&self, path: &str) -> Option<Vec<u8>> {
            self.files.lock().await.get(path).cloned()
        }
    }

    impl Storage for MockStorage {
        async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
            let files = self.files.lock().await;
            files.get(path).cloned().ok_or_else(|| {
                EtlError::IoError(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("File not found: {}", path),
                ))
            })
        }

        async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
            if self.reject_xlsx && path.ends_with(".xlsx") {
                return Err(EtlError::IoError(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "read-only",
                )));
            }
            self.files.lock().await.insert(path.to_string(), data.to_vec());
            Ok(())
        }
    }

    fn settings(output: &str) -> ExtractSettings {
        let mut settings = ExtractSettings::new("input.csv", "Website");
        settings.output_path = output.to_string();
        settings.use_browser = false;
        settings.workers = 3;
        settings.crawl.page_delay_ms = 0;
        settings.crawl.retry_attempts = 0;
        settings.crawl.timeout_seconds = 5;
        settings.instagram.fetch_profiles = false;
        settings
    }

    const INPUT: &str = "Name,Website\nPadaria,https://www.instagram.com/padaria_central/\nVazio,\nCafé,@cafe_bar\n";

    #[tokio::test]
    async fn test_extract_applies_row_limit() {
        let storage = MockStorage::with_file("input.csv", INPUT);
        let mut config = settings("out.xlsx");
        config.limit = Some(2);

        let pipeline = InstagramPipeline::new(storage, config).unwrap();
        let table = pipeline.extract().await.unwrap();

        assert_eq!(table.headers, vec!["Name", "Website"]);
        assert_eq!(table.rows.len(), 2);
    }

    #[tokio::test]
    async fn test_transform_keeps_input_order() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/");
            then.status(200)
                .body(r#"<p>Siga-nos no Instagram: @doces_da_maria</p>"#);
        });

        let input = format!("{}Doces,{}\n", INPUT, server.url("/"));
        let storage = MockStorage::with_file("input.csv", &input);
        let pipeline = InstagramPipeline::new(storage, settings("out.xlsx")).unwrap();

        let table = pipeline.extract().await.unwrap();
        let result = pipeline.transform(table).await.unwrap();

        let statuses: Vec<ExtractionStatus> = result.results.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![
                ExtractionStatus::FoundDirect,
                ExtractionStatus::Empty,
                ExtractionStatus::FoundDirect,
                ExtractionStatus::FoundInPageText,
            ]
        );
        let rows: Vec<usize> = result.results.iter().map(|r| r.row_number).collect();
        assert_eq!(rows, vec![1, 2, 3, 4]);
        assert_eq!(result.results[3].instagram_username, "doces_da_maria");
    }

    #[tokio::test]
    async fn test_transform_missing_column_fails() {
        let storage = MockStorage::with_file("input.csv", INPUT);
        let mut config = settings("out.xlsx");
        config.column = "Instagram".to_string();

        let pipeline = InstagramPipeline::new(storage, config).unwrap();
        let table = pipeline.extract().await.unwrap();

        match pipeline.transform(table).await {
            Err(EtlError::ColumnNotFoundError { column, available }) => {
                assert_eq!(column, "Instagram");
                assert_eq!(available, vec!["Name", "Website"]);
            }
            other => panic!("unexpected: {:?}", other.map(|r| r.results.len())),
        }
    }

    #[tokio::test]
    async fn test_load_writes_results_and_summary_sheets() {
        let storage = MockStorage::with_file("input.csv", INPUT);
        let pipeline = InstagramPipeline::new(storage.clone(), settings("out/results.xlsx")).unwrap();

        let table = pipeline.extract().await.unwrap();
        let result = pipeline.transform(table).await.unwrap();
        let path = pipeline.load(&result).await.unwrap();
        assert_eq!(path, "out/results.xlsx");

        let bytes = storage.get_file("out/results.xlsx").await.unwrap();
        let sheet = read_table(bytes.clone(), SheetFormat::Workbook, Some(RESULTS_SHEET)).unwrap();
        assert_eq!(sheet.headers.len(), 2 + RESULT_COLUMNS.len());
        assert_eq!(sheet.headers[5], "Instagram Username");
        assert_eq!(sheet.rows[0][5], "padaria_central");
        assert_eq!(sheet.rows[1][6], "empty");
        assert_eq!(sheet.rows[2][0], "Café");

        let summary = read_table(bytes, SheetFormat::Workbook, Some("Summary")).unwrap();
        assert_eq!(summary.headers, vec!["Metric", "Value"]);
        assert!(summary.rows.iter().any(|r| r[0] == "Total rows" && r[1] == "3"));
    }

    #[tokio::test]
    async fn test_load_csv_includes_profile_columns() {
        let storage = MockStorage::with_file("input.csv", INPUT);
        let pipeline = InstagramPipeline::new(storage.clone(), settings("out.csv")).unwrap();

        let table = pipeline.extract().await.unwrap();
        let mut result = pipeline.transform(table).await.unwrap();
        result.profiles_enabled = true;
        pipeline.load(&result).await.unwrap();

        let bytes = storage.get_file("out.csv").await.unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let header = text.trim_start_matches('\u{feff}').lines().next().unwrap();
        assert!(header.ends_with("Notes,Display Name,Followers,Profile Status"));
    }

    #[tokio::test]
    async fn test_load_falls_back_to_csv_when_xlsx_write_fails() {
        let mut storage = MockStorage::with_file("input.csv", INPUT);
        storage.reject_xlsx = true;
        let pipeline = InstagramPipeline::new(storage.clone(), settings("results.xlsx")).unwrap();

        let table = pipeline.extract().await.unwrap();
        let result = pipeline.transform(table).await.unwrap();
        let path = pipeline.load(&result).await.unwrap();

        assert_eq!(path, "results.csv");
        assert!(storage.get_file("results.xlsx").await.is_none());
        assert!(storage.get_file("results.csv").await.is_some());
    }
}
