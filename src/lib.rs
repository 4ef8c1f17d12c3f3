pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use config::{cli::LocalStorage, ExtractSettings};

#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use core::{
    etl::{EtlEngine, RunOutcome},
    pipeline::InstagramPipeline,
    report::ExtractionReport,
};
pub use utils::error::{EtlError, Result};
