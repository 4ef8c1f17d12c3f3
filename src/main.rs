use clap::Parser;
use insta_etl::utils::error::{EtlError, ErrorSeverity};
use insta_etl::utils::{logger, validation::Validate};
use insta_etl::{CliConfig, EtlEngine, InstagramPipeline, LocalStorage};

/// 到達 main 的錯誤一律以非零結束
fn exit_code(e: &EtlError) -> i32 {
    match e.severity() {
        ErrorSeverity::Low | ErrorSeverity::High => 1, // 處理或設定錯誤
        ErrorSeverity::Medium => 2,                     // 可重試的網路錯誤
        ErrorSeverity::Critical => 3,                   // 系統錯誤
    }
}

fn fail(stage: &str, e: EtlError) -> ! {
    tracing::error!(
        "❌ {} failed: {} (Category: {:?}, Severity: {:?})",
        stage,
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 建議: {}", e.recovery_suggestion());

    std::process::exit(exit_code(&e))
}

#[tokio::main]
async fn main() {
    let cli = CliConfig::parse();

    // 初始化日誌
    logger::init_cli_logger(cli.verbose, cli.log_format);

    tracing::info!("Starting insta-etl");
    if cli.verbose {
        tracing::debug!("CLI config: {:?}", cli);
    }

    // 合併設定檔並驗證
    let settings = match cli.resolve() {
        Ok(settings) => settings,
        Err(e) => fail("Loading configuration", e),
    };
    if let Err(e) = settings.validate() {
        fail("Configuration validation", e);
    }

    if cli.monitor {
        tracing::info!("🔍 System monitoring enabled");
    }

    let pipeline = match InstagramPipeline::new(LocalStorage::current_dir(), settings) {
        Ok(pipeline) => pipeline,
        Err(e) => fail("Pipeline setup", e),
    };
    let engine = EtlEngine::new_with_monitoring(pipeline, cli.monitor);

    match engine.run().await {
        Ok(outcome) => {
            println!("{}", outcome.report);
            tracing::info!("✅ Extraction completed successfully!");
            println!("✅ Extraction completed successfully!");
            println!("📁 Output saved to: {}", outcome.output_path);
        }
        Err(e) => fail("Extraction", e),
    }
}
