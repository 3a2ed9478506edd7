use crate::domain::model::ErrorRecord;
use crate::domain::ports::ErrorSink;
use async_trait::async_trait;
use std::sync::Mutex;

/// Keeps every error event in memory.
#[derive(Debug, Default)]
pub struct MemoryErrorSink {
    events: Mutex<Vec<ErrorRecord>>,
}

impl MemoryErrorSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ErrorRecord> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn len(&self) -> usize {
        match self.events.lock() {
            Ok(events) => events.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ErrorSink for MemoryErrorSink {
    async fn record(&self, event: ErrorRecord) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

/// Emits error events as structured log lines.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingErrorSink;

#[async_trait]
impl ErrorSink for TracingErrorSink {
    async fn record(&self, event: ErrorRecord) {
        tracing::warn!(
            endpoint = %event.endpoint,
            error_kind = %event.error_kind,
            http_status = ?event.http_status,
            retry_attempt = event.retry_attempt,
            occurred_at = %event.occurred_at.to_rfc3339(),
            "📝 {}",
            event.message
        );
    }
}
