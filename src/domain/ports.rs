use crate::config::RetryConfig;
use crate::domain::model::{ErrorRecord, PersistablePair};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::time::Duration;

pub trait ConfigProvider: Send + Sync {
    fn base_url(&self) -> &str;
    fn batch_size(&self) -> usize;
    fn read_timeout(&self) -> Duration;
    fn post_timeout(&self) -> Duration;
    fn retry(&self) -> RetryConfig;
    fn monitoring_enabled(&self) -> bool;
}

/// Idempotent persistence keyed by the source identifier.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// 只寫入尚未存在的記錄，回傳實際新增數量
    async fn insert_if_absent(&self, pairs: &[PersistablePair]) -> Result<usize>;
}

#[async_trait]
pub trait ErrorSink: Send + Sync {
    async fn record(&self, event: ErrorRecord);
}
