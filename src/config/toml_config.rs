use crate::core::batch::MAX_BATCH_SIZE;
use crate::domain::ports::ConfigProvider;
use crate::utils::error::{EtlError, Result};
use crate::utils::validation::{
    validate_positive_number, validate_range, validate_url, validate_window, Validate,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://localhost:3123";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub sink: SinkConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_read_timeout")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    #[serde(default = "default_post_timeout")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    #[serde(default = "default_batch_size")]
    pub size: usize,
}

/// 退避設定，延遲以 `time_unit_ms` 為單位
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_time_unit_ms")]
    pub time_unit_ms: u64,

    #[serde(default = "default_max_attempts")]
    pub read_max_attempts: u32,
    #[serde(default = "default_read_min")]
    pub read_min: u64,
    #[serde(default = "default_read_max")]
    pub read_max: u64,

    #[serde(default = "default_max_attempts")]
    pub write_max_attempts: u32,
    #[serde(default = "default_write_min")]
    pub write_min: u64,
    #[serde(default = "default_write_max")]
    pub write_max: u64,

    /// 0 means retry the listing endpoint without an attempt cap.
    #[serde(default = "default_max_attempts")]
    pub pagination_max_attempts: u32,
    #[serde(default = "default_pagination_min")]
    pub pagination_min: u64,
    #[serde(default = "default_pagination_max")]
    pub pagination_max: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitoringConfig {
    #[serde(default)]
    pub enabled: bool,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_read_timeout() -> u64 {
    30
}

fn default_post_timeout() -> u64 {
    60
}

fn default_batch_size() -> usize {
    MAX_BATCH_SIZE
}

fn default_time_unit_ms() -> u64 {
    1000
}

fn default_max_attempts() -> u32 {
    5
}

fn default_read_min() -> u64 {
    1
}

fn default_read_max() -> u64 {
    8
}

fn default_write_min() -> u64 {
    2
}

fn default_write_max() -> u64 {
    10
}

fn default_pagination_min() -> u64 {
    2
}

fn default_pagination_max() -> u64 {
    60
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_seconds: default_read_timeout(),
        }
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_post_timeout(),
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            size: default_batch_size(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            time_unit_ms: default_time_unit_ms(),
            read_max_attempts: default_max_attempts(),
            read_min: default_read_min(),
            read_max: default_read_max(),
            write_max_attempts: default_max_attempts(),
            write_min: default_write_min(),
            write_max: default_write_max(),
            pagination_max_attempts: default_max_attempts(),
            pagination_min: default_pagination_min(),
            pagination_max: default_pagination_max(),
        }
    }
}

impl RetryConfig {
    pub fn time_unit(&self) -> Duration {
        Duration::from_millis(self.time_unit_ms)
    }

    pub fn validate(&self) -> Result<()> {
        validate_positive_number("retry.read_max_attempts", self.read_max_attempts.into(), 1)?;
        validate_positive_number("retry.write_max_attempts", self.write_max_attempts.into(), 1)?;
        validate_window("retry.read", self.read_min, self.read_max)?;
        validate_window("retry.write", self.write_min, self.write_max)?;
        validate_window("retry.pagination", self.pagination_min, self.pagination_max)?;
        Ok(())
    }
}

impl TomlConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(EtlError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| EtlError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${ANIMALS_BASE_URL})，找不到的變數保持原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| EtlError::ConfigError {
            message: format!("Invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.into_owned())
    }

    pub fn validate_config(&self) -> Result<()> {
        validate_url("source.base_url", &self.source.base_url)?;
        validate_positive_number("source.timeout_seconds", self.source.timeout_seconds, 1)?;
        validate_positive_number("sink.timeout_seconds", self.sink.timeout_seconds, 1)?;
        validate_range("batch.size", self.batch.size, 1, MAX_BATCH_SIZE)?;
        self.retry.validate()
    }
}

impl ConfigProvider for TomlConfig {
    fn base_url(&self) -> &str {
        &self.source.base_url
    }

    fn batch_size(&self) -> usize {
        self.batch.size
    }

    fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.source.timeout_seconds)
    }

    fn post_timeout(&self) -> Duration {
        Duration::from_secs(self.sink.timeout_seconds)
    }

    fn retry(&self) -> RetryConfig {
        self.retry.clone()
    }

    fn monitoring_enabled(&self) -> bool {
        self.monitoring.enabled
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
