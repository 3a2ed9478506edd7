//! Run state machine: identifier fetch, per-record processing, batch posting.
//!
//! Record-level failures are logged and the run moves on. A failed listing
//! walk or batch flush ends the run as failed with the counters kept.

use crate::core::batch::{BatchPoster, MAX_BATCH_SIZE};
use crate::core::fetcher::{SourceFetcher, ANIMALS_PATH};
use crate::core::retry::{RetryPolicies, RetryPolicy};
use crate::core::stats::{RunStats, RunStep};
use crate::core::status::StatusBoard;
use crate::core::transform::transform_record;
use crate::domain::model::{ErrorRecord, Identifier, PersistablePair};
use crate::domain::ports::{ConfigProvider, ErrorSink, RecordStore};
use crate::utils::error::{EtlError, Result};
use crate::utils::monitor::SystemMonitor;
use crate::utils::validation::validate_range;
use chrono::Utc;
use reqwest::Client;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// 每處理幾筆記錄輸出一次進度
pub const PROGRESS_INTERVAL: usize = 50;

pub struct RunCoordinator {
    client: Client,
    base_url: String,
    fetcher: SourceFetcher,
    write_policy: RetryPolicy,
    read_attempts: u32,
    post_timeout: Duration,
    batch_size: usize,
    store: Arc<dyn RecordStore>,
    error_sink: Arc<dyn ErrorSink>,
    status: StatusBoard,
    monitor: SystemMonitor,
    last_run_id: AtomicU64,
}

impl RunCoordinator {
    pub fn new(
        config: &dyn ConfigProvider,
        store: Arc<dyn RecordStore>,
        error_sink: Arc<dyn ErrorSink>,
    ) -> Result<Self> {
        // 超過 sink 上限的門檻會讓每一批都被拒絕
        validate_range("batch.size", config.batch_size(), 1, MAX_BATCH_SIZE)?;

        let client = Client::builder().build()?;
        let policies = RetryPolicies::from(&config.retry());

        Ok(Self {
            fetcher: SourceFetcher::new(
                client.clone(),
                config.base_url(),
                &policies,
                config.read_timeout(),
            ),
            client,
            base_url: config.base_url().to_string(),
            read_attempts: policies.read.max_attempts().unwrap_or(1),
            write_policy: policies.write,
            post_timeout: config.post_timeout(),
            batch_size: config.batch_size(),
            store,
            error_sink,
            status: StatusBoard::new(),
            monitor: SystemMonitor::new(config.monitoring_enabled()),
            last_run_id: AtomicU64::new(0),
        })
    }

    /// Publishes snapshots to `board` instead of a private one.
    pub fn with_status_board(mut self, board: StatusBoard) -> Self {
        self.status = board;
        self
    }

    pub fn status_board(&self) -> &StatusBoard {
        &self.status
    }

    pub fn last_run_id(&self) -> u64 {
        self.last_run_id.load(Ordering::SeqCst)
    }

    pub(crate) fn next_run_id(&self) -> u64 {
        self.last_run_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Runs the pipeline once. Always returns the run's stats, fatal
    /// failures included.
    pub async fn run(&self) -> RunStats {
        self.run_with_id(self.next_run_id()).await
    }

    pub(crate) async fn run_with_id(&self, run_id: u64) -> RunStats {
        let mut stats = RunStats::new(run_id);
        tracing::info!("🚀 Starting ETL run #{}", run_id);
        self.status.publish(&stats);

        if let Err(e) = self.execute(&mut stats).await {
            tracing::error!("❌ Run #{} failed: {}", run_id, e);
            stats.fail(e.to_string());
        }

        self.status.publish(&stats);
        self.monitor.log_final_stats();
        tracing::info!(
            "🏁 Run #{} {}: found={} processed={} posted={} batches={} errors={} in {:.2}s",
            run_id,
            stats.status(),
            stats.records_found,
            stats.records_processed,
            stats.records_posted,
            stats.batches_posted,
            stats.error_count(),
            stats.duration().as_secs_f64()
        );
        stats
    }

    async fn execute(&self, stats: &mut RunStats) -> Result<()> {
        self.enter(stats, RunStep::FetchingIdentifiers);
        let identifiers = self.fetcher.fetch_all_identifiers(stats).await?;
        stats.records_found = identifiers.len();
        self.monitor.log_stats("Identifier fetch");

        if identifiers.is_empty() {
            tracing::warn!("⚠️ No animals found");
            stats.complete_without_data();
            return Ok(());
        }

        self.enter(stats, RunStep::Processing);
        let total = identifiers.len();
        let mut poster = BatchPoster::new(
            self.client.clone(),
            &self.base_url,
            self.write_policy.clone(),
            self.post_timeout,
            self.batch_size,
        );
        let mut pending: Vec<PersistablePair> = Vec::new();

        for (index, id) in identifiers.into_iter().enumerate() {
            stats.records_attempted += 1;

            match self.process_record(id).await {
                Ok(pair) => {
                    let full = poster.add(pair.transformed.clone());
                    pending.push(pair);
                    stats.records_processed += 1;

                    if full {
                        let batch_number = stats.batches_posted + 1;
                        self.enter(stats, RunStep::PostingBatch(batch_number));
                        self.flush(&mut poster, &mut pending, stats).await?;
                        stats.set_step(RunStep::Processing);
                    }
                }
                Err(e) => self.record_failure(id, &e, stats).await,
            }

            if (index + 1) % PROGRESS_INTERVAL == 0 {
                tracing::info!("⏳ Progress: {}/{} animals processed", index + 1, total);
            }
            self.status.publish(stats);
        }

        if !poster.is_empty() {
            self.enter(stats, RunStep::PostingFinalBatch);
            self.flush(&mut poster, &mut pending, stats).await?;
        }

        self.monitor.log_stats("Processing");
        stats.complete();
        Ok(())
    }

    fn enter(&self, stats: &mut RunStats, step: RunStep) {
        tracing::debug!("Run #{} entering '{}'", stats.run_id, step);
        stats.set_step(step);
        self.status.publish(stats);
    }

    async fn process_record(&self, id: Identifier) -> Result<PersistablePair> {
        let raw = self.fetcher.fetch_detail(id).await?;
        let transformed = transform_record(&raw);
        Ok(PersistablePair { raw, transformed })
    }

    async fn record_failure(&self, id: Identifier, error: &EtlError, stats: &mut RunStats) {
        let message = error.to_string();
        tracing::error!("❌ Error processing animal {}: {}", id, message);
        stats.add_error(format!("Record {}: {}", id, message));

        let retry_attempt = if error.is_transient() {
            self.read_attempts
        } else {
            1
        };
        self.error_sink
            .record(ErrorRecord {
                endpoint: format!("{}/{}", ANIMALS_PATH, id),
                error_kind: error.kind_name().to_string(),
                message,
                http_status: error.http_status(),
                retry_attempt,
                occurred_at: Utc::now(),
            })
            .await;
    }

    // 批次送出失敗直接往上拋，由 run 轉成 Failed
    async fn flush(
        &self,
        poster: &mut BatchPoster,
        pending: &mut Vec<PersistablePair>,
        stats: &mut RunStats,
    ) -> Result<()> {
        poster.flush(stats).await?;

        let batch = std::mem::take(pending);
        if let Err(e) = self.store.insert_if_absent(&batch).await {
            tracing::warn!("⚠️ Failed to store batch of {} records: {}", batch.len(), e);
            stats.add_error(format!("Store: {}", e));
        }
        Ok(())
    }
}
