use crate::core::retry::RetryPolicy;
use crate::core::stats::RunStats;
use crate::domain::model::TransformedRecord;
use crate::utils::error::{EtlError, Result};
use reqwest::Client;
use std::time::Duration;

/// Hard limit the sink accepts per request.
pub const MAX_BATCH_SIZE: usize = 100;
pub const HOME_PATH: &str = "/animals/v1/home";

/// 累積轉換後的記錄，滿了就整批 POST 到 sink
pub struct BatchPoster {
    client: Client,
    endpoint: String,
    policy: RetryPolicy,
    timeout: Duration,
    threshold: usize,
    buffer: Vec<TransformedRecord>,
}

impl BatchPoster {
    pub fn new(
        client: Client,
        base_url: &str,
        policy: RetryPolicy,
        timeout: Duration,
        threshold: usize,
    ) -> Self {
        Self {
            client,
            endpoint: format!("{}{}", base_url.trim_end_matches('/'), HOME_PATH),
            policy,
            timeout,
            threshold: threshold.max(1),
            buffer: Vec::with_capacity(threshold.clamp(1, MAX_BATCH_SIZE)),
        }
    }

    /// Buffers a record. Returns `true` once the batch reached its threshold.
    pub fn add(&mut self, record: TransformedRecord) -> bool {
        self.buffer.push(record);
        self.is_full()
    }

    pub fn is_full(&self) -> bool {
        self.buffer.len() >= self.threshold
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn pending(&self) -> &[TransformedRecord] {
        &self.buffer
    }

    /// Posts the buffered batch and updates the run counters.
    ///
    /// Returns `Ok(None)` without any request when nothing is buffered. On
    /// failure the batch stays buffered and the error is handed back.
    pub async fn flush(&mut self, stats: &mut RunStats) -> Result<Option<u16>> {
        if self.buffer.is_empty() {
            return Ok(None);
        }

        let status = self.post_batch(&self.buffer).await?;
        stats.record_batch_posted(self.buffer.len());
        self.buffer.clear();
        Ok(Some(status))
    }

    pub async fn post_batch(&self, batch: &[TransformedRecord]) -> Result<u16> {
        if batch.len() > MAX_BATCH_SIZE {
            return Err(EtlError::BatchTooLarge {
                size: batch.len(),
                max: MAX_BATCH_SIZE,
            });
        }

        tracing::info!("📤 Posting batch of {} records", batch.len());

        let status = self
            .policy
            .run("post batch", || async move {
                let response = self
                    .client
                    .post(&self.endpoint)
                    .timeout(self.timeout)
                    .json(batch)
                    .send()
                    .await?;

                let status = response.status();
                if status.is_success() {
                    return Ok(status.as_u16());
                }

                let body = response.text().await.ok();
                tracing::error!(
                    "HTTP error posting batch: {} (response: {})",
                    status,
                    body.as_deref().unwrap_or("<unreadable>")
                );
                Err(EtlError::Http {
                    url: self.endpoint.clone(),
                    status: status.as_u16(),
                    body,
                })
            })
            .await?;

        tracing::info!("✅ Successfully posted batch of {} records", batch.len());
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn record(id: u64) -> TransformedRecord {
        serde_json::from_value(json!({"id": id, "friends": [], "born_at": "2021-01-01T00:00:00+00:00"}))
            .unwrap()
    }

    fn poster(base_url: &str) -> BatchPoster {
        BatchPoster::new(
            Client::new(),
            base_url,
            RetryPolicy::write().with_time_unit(Duration::ZERO),
            Duration::from_secs(5),
            MAX_BATCH_SIZE,
        )
    }

    #[tokio::test]
    async fn test_full_batch_is_accepted() {
        let server = MockServer::start_async().await;
        let home = server
            .mock_async(|when, then| {
                when.method(POST).path(HOME_PATH);
                then.status(201);
            })
            .await;

        let mut poster = poster(&server.base_url());
        let mut stats = RunStats::new(1);
        let mut full = false;
        for id in 1..=100 {
            full = poster.add(record(id));
        }
        assert!(full);

        let status = poster.flush(&mut stats).await.unwrap();

        home.assert_async().await;
        assert_eq!(status, Some(201));
        assert!(poster.is_empty());
        assert_eq!(stats.batches_posted, 1);
        assert_eq!(stats.records_posted, 100);
    }

    #[tokio::test]
    async fn test_oversized_batch_never_reaches_transport() {
        let server = MockServer::start_async().await;
        let home = server
            .mock_async(|when, then| {
                when.method(POST).path(HOME_PATH);
                then.status(200);
            })
            .await;

        let mut poster = poster(&server.base_url());
        let mut stats = RunStats::new(1);
        for id in 1..=101 {
            poster.add(record(id));
        }

        let err = poster.flush(&mut stats).await.unwrap_err();

        assert!(matches!(err, EtlError::BatchTooLarge { size: 101, max: 100 }));
        assert!(!err.is_transient());
        home.assert_hits_async(0).await;
        assert_eq!(poster.len(), 101);
        assert_eq!(stats.batches_posted, 0);
    }

    #[tokio::test]
    async fn test_server_errors_retry_then_keep_batch() {
        let server = MockServer::start_async().await;
        let home = server
            .mock_async(|when, then| {
                when.method(POST).path(HOME_PATH);
                then.status(503).body("busy");
            })
            .await;

        let mut poster = poster(&server.base_url());
        let mut stats = RunStats::new(1);
        poster.add(record(1));
        poster.add(record(2));

        let err = poster.flush(&mut stats).await.unwrap_err();

        home.assert_hits_async(5).await;
        assert!(matches!(err, EtlError::Http { status: 503, .. }));
        assert_eq!(poster.len(), 2);
        assert_eq!(stats.records_posted, 0);
        assert_eq!(stats.batches_posted, 0);
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let server = MockServer::start_async().await;
        let home = server
            .mock_async(|when, then| {
                when.method(POST).path(HOME_PATH);
                then.status(422);
            })
            .await;

        let mut poster = poster(&server.base_url());
        let mut stats = RunStats::new(1);
        poster.add(record(1));

        let err = poster.flush(&mut stats).await.unwrap_err();

        home.assert_hits_async(1).await;
        assert_eq!(err.http_status(), Some(422));
    }

    #[tokio::test]
    async fn test_body_is_json_array_of_records() {
        let server = MockServer::start_async().await;
        let home = server
            .mock_async(|when, then| {
                when.method(POST).path(HOME_PATH).json_body(json!([
                    {"id": 1, "friends": [], "born_at": "2021-01-01T00:00:00+00:00"},
                    {"id": 2, "friends": [], "born_at": "2021-01-01T00:00:00+00:00"}
                ]));
                then.status(200);
            })
            .await;

        let mut poster = poster(&format!("{}/", server.base_url()));
        let mut stats = RunStats::new(1);
        poster.add(record(1));
        poster.add(record(2));

        assert_eq!(poster.flush(&mut stats).await.unwrap(), Some(200));
        home.assert_async().await;
    }

    #[tokio::test]
    async fn test_empty_flush_sends_nothing() {
        let server = MockServer::start_async().await;
        let home = server
            .mock_async(|when, then| {
                when.method(POST).path(HOME_PATH);
                then.status(200);
            })
            .await;

        let mut poster = poster(&server.base_url());
        let mut stats = RunStats::new(1);

        assert_eq!(poster.flush(&mut stats).await.unwrap(), None);
        home.assert_hits_async(0).await;
        assert_eq!(stats.batches_posted, 0);
    }

    #[test]
    fn test_threshold_triggers_full() {
        let mut poster = BatchPoster::new(
            Client::new(),
            "http://localhost:3123",
            RetryPolicy::write(),
            Duration::from_secs(60),
            2,
        );
        assert!(!poster.add(record(1)));
        assert!(poster.add(record(2)));
        assert_eq!(poster.pending().len(), 2);
    }
}
