use crate::domain::model::{InputTable, TransformResult};
use crate::utils::error::Result;
use async_trait::async_trait;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

pub trait ConfigProvider: Send + Sync {
    fn input_path(&self) -> &str;
    fn column(&self) -> &str;
    fn output_path(&self) -> &str;
    fn sheet(&self) -> Option<&str>;
    fn row_limit(&self) -> Option<usize>;
    fn workers(&self) -> usize;
    fn crawl(&self) -> &crate::config::CrawlSettings;
    fn instagram(&self) -> &crate::config::InstagramSettings;
    fn use_browser(&self) -> bool;
}

/// A fetched document after redirects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    pub final_url: String,
    pub status: u16,
    pub body: String,
}

impl FetchedPage {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedPage>;

    fn name(&self) -> &'static str;
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn extract(&self) -> Result<InputTable>;
    async fn transform(&self, table: InputTable) -> Result<TransformResult>;
    async fn load(&self, result: &TransformResult) -> Result<String>;
}
