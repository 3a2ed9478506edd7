use animal_etl::utils::{logger, validation::Validate};
use animal_etl::{
    CliConfig, EtlEngine, EtlError, RunCoordinator, RunStatus, RunSummary, TomlConfig,
    TracingErrorSink,
};
use animal_etl::{MemoryRecordStore, Result as EtlResult};
use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;

const STATUS_INTERVAL: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
    let cli = CliConfig::parse();

    // 初始化日誌
    if cli.json_logs {
        logger::init_json_logger(cli.verbose);
    } else {
        logger::init_cli_logger(cli.verbose);
    }

    tracing::info!("Starting animal-etl CLI");
    if cli.verbose {
        tracing::debug!("CLI config: {:?}", cli);
    }

    let exit_code = match run(&cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("❌ {:#}", e);
            if let Some(etl_error) = e.downcast_ref::<EtlError>() {
                tracing::error!(
                    "Category: {:?}, Severity: {:?}",
                    etl_error.category(),
                    etl_error.severity()
                );
                eprintln!("❌ {}", etl_error.user_friendly_message());
                eprintln!("💡 建議: {}", etl_error.recovery_suggestion());
            } else {
                eprintln!("❌ {:#}", e);
            }
            3
        }
    };

    std::process::exit(exit_code);
}

async fn run(cli: &CliConfig) -> anyhow::Result<i32> {
    let config = load_config(cli)?;

    if config.monitoring.enabled {
        tracing::info!("🔍 System monitoring enabled");
    }

    let coordinator = RunCoordinator::new(
        &config,
        Arc::new(MemoryRecordStore::new()),
        Arc::new(TracingErrorSink),
    )
    .context("failed to build the HTTP client")?;
    let engine = EtlEngine::new(coordinator);

    let handle = engine.spawn()?;
    tracing::info!("🚀 Run #{} started against {}", handle.run_id(), config.source.base_url);

    let wait = handle.wait();
    tokio::pin!(wait);
    let mut ticker = tokio::time::interval(STATUS_INTERVAL);
    ticker.tick().await;

    let stats = loop {
        tokio::select! {
            result = &mut wait => break result?,
            _ = ticker.tick() => {
                if let Some(status) = engine.status() {
                    tracing::info!(
                        "⏳ {} - found={} processed={} posted={} errors={} ({:.0}s)",
                        status.step,
                        status.total_found,
                        status.processed,
                        status.posted,
                        status.errors,
                        status.duration_secs
                    );
                }
            }
        }
    };

    let summary = RunSummary::from_stats(&stats);
    println!("{}", summary);

    let code = match summary.status {
        RunStatus::Completed => {
            println!("✅ ETL process completed successfully!");
            0
        }
        RunStatus::PartiallyCompleted => {
            println!("⚠️ ETL process completed with {} errors", summary.error_count);
            2
        }
        RunStatus::Failed | RunStatus::Running => {
            if let Some(reason) = &stats.fatal_error {
                eprintln!("❌ ETL process failed: {}", reason);
            }
            1
        }
    };
    Ok(code)
}

fn load_config(cli: &CliConfig) -> EtlResult<TomlConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("📄 Loading configuration from {}", path);
            TomlConfig::from_file(path)?
        }
        None => TomlConfig::default(),
    };

    cli.apply_overrides(&mut config);

    // 驗證配置
    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        return Err(e);
    }
    Ok(config)
}
