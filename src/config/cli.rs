use crate::config::toml_config::{RetryConfig, TomlConfig, DEFAULT_BASE_URL};
use crate::core::batch::MAX_BATCH_SIZE;
use crate::domain::ports::ConfigProvider;
use crate::utils::error::Result;
use crate::utils::validation::{validate_range, validate_url, Validate};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, Parser)]
#[command(name = "animal-etl")]
#[command(about = "Fetch animals from the source API, normalize them and post them home in batches")]
pub struct CliConfig {
    /// Base URL shared by the source and sink endpoints [default: http://localhost:3123]
    #[arg(long)]
    pub base_url: Option<String>,

    /// Path to a TOML configuration file
    #[arg(short, long)]
    pub config: Option<String>,

    /// Records per POST to the sink (1-100) [default: 100]
    #[arg(long)]
    pub batch_size: Option<usize>,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Emit logs as JSON lines")]
    pub json_logs: bool,

    #[arg(long, help = "Log CPU and memory usage per phase")]
    pub monitor: bool,
}

impl CliConfig {
    /// 命令列明確給的值覆蓋檔案設定
    pub fn apply_overrides(&self, config: &mut TomlConfig) {
        if let Some(base_url) = &self.base_url {
            config.source.base_url = base_url.clone();
            tracing::info!("🔧 base_url overridden to: {}", base_url);
        }
        if let Some(batch_size) = self.batch_size {
            config.batch.size = batch_size;
            tracing::info!("🔧 batch size overridden to: {}", batch_size);
        }
        if self.monitor {
            config.monitoring.enabled = true;
        }
    }
}

impl ConfigProvider for CliConfig {
    fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }

    fn batch_size(&self) -> usize {
        self.batch_size.unwrap_or(MAX_BATCH_SIZE)
    }

    fn read_timeout(&self) -> Duration {
        Duration::from_secs(30)
    }

    fn post_timeout(&self) -> Duration {
        Duration::from_secs(60)
    }

    fn retry(&self) -> RetryConfig {
        RetryConfig::default()
    }

    fn monitoring_enabled(&self) -> bool {
        self.monitor
    }
}

impl Validate for CliConfig {
    fn validate(&self) -> Result<()> {
        validate_url("base_url", self.base_url())?;
        validate_range("batch_size", self.batch_size(), 1, MAX_BATCH_SIZE)
    }
}
