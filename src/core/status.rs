use crate::core::stats::RunStats;
use serde::Serialize;
use std::sync::{Arc, RwLock};

/// Point-in-time view of a run for status surfaces.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub run_id: u64,
    pub step: String,
    pub total_found: usize,
    pub processed: usize,
    pub posted: usize,
    pub batches: usize,
    pub errors: usize,
    pub duration_secs: f64,
}

impl From<&RunStats> for StatusSnapshot {
    fn from(stats: &RunStats) -> Self {
        Self {
            run_id: stats.run_id,
            step: stats.current_step.to_string(),
            total_found: stats.records_found,
            processed: stats.records_processed,
            posted: stats.records_posted,
            batches: stats.batches_posted,
            errors: stats.error_count(),
            duration_secs: stats.duration().as_secs_f64(),
        }
    }
}

/// 最新一次 run 的狀態，後寫入者覆蓋
#[derive(Debug, Clone, Default)]
pub struct StatusBoard {
    latest: Arc<RwLock<Option<StatusSnapshot>>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, stats: &RunStats) {
        match self.latest.write() {
            Ok(mut latest) => *latest = Some(StatusSnapshot::from(stats)),
            Err(poisoned) => *poisoned.into_inner() = Some(StatusSnapshot::from(stats)),
        }
    }

    pub fn latest(&self) -> Option<StatusSnapshot> {
        match self.latest.read() {
            Ok(latest) => latest.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}
