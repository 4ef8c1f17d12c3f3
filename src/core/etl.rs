use crate::core::report::ExtractionReport;
use crate::core::Pipeline;
use crate::utils::error::Result;
use crate::utils::monitor::SystemMonitor;

/// What a finished run produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub output_path: String,
    pub report: ExtractionReport,
}

pub struct EtlEngine<P: Pipeline> {
    pipeline: P,
    monitor: SystemMonitor,
}

impl<P: Pipeline> EtlEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self::new_with_monitoring(pipeline, false)
    }

    pub fn new_with_monitoring(pipeline: P, monitor_enabled: bool) -> Self {
        Self {
            pipeline,
            monitor: SystemMonitor::new(monitor_enabled),
        }
    }

    pub async fn run(&self) -> Result<RunOutcome> {
        tracing::info!("🚀 Starting Instagram extraction");
        self.monitor.log_stats("Start");

        // Extract
        tracing::info!("📥 Reading input sheet...");
        let table = self.pipeline.extract().await?;
        tracing::info!("Loaded {} rows", table.rows.len());
        self.monitor.log_stats("Extract");

        // Transform
        tracing::info!("🔎 Resolving Instagram profiles...");
        let transformed = self.pipeline.transform(table).await?;
        let found = transformed
            .results
            .iter()
            .filter(|r| r.has_username())
            .count();
        tracing::info!(
            "Processed {} rows, {} with a valid username",
            transformed.results.len(),
            found
        );
        self.monitor.log_stats("Transform");

        // Load
        tracing::info!("💾 Writing results...");
        let output_path = self.pipeline.load(&transformed).await?;
        tracing::info!("Output saved to: {}", output_path);
        self.monitor.log_stats("Load");
        self.monitor.log_final_stats();

        Ok(RunOutcome {
            output_path,
            report: ExtractionReport::from_results(&transformed.results),
        })
    }
}
