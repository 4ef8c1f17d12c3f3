pub mod crawler;
pub mod etl;
pub mod extractor;
pub mod page_scan;
pub mod pipeline;
pub mod profile;
pub mod rate_limit;
pub mod report;
pub mod username;

pub use crate::domain::model::{
    ExtractionResult, ExtractionStatus, InputTable, ProfileInfo, ProfileStatus, SiteRow,
    TransformResult,
};
pub use crate::domain::ports::{ConfigProvider, FetchedPage, PageFetcher, Pipeline, Storage};
pub use crate::utils::error::Result;
