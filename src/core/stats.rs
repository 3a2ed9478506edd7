use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};
use std::fmt;
use std::time::Duration;

/// Step label of a run, as shown on status surfaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStep {
    Initializing,
    FetchingIdentifiers,
    Processing,
    PostingBatch(usize),
    PostingFinalBatch,
    NoData,
    Completed,
    Failed,
}

impl RunStep {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStep::NoData | RunStep::Completed | RunStep::Failed)
    }
}

impl fmt::Display for RunStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStep::Initializing => write!(f, "Initializing"),
            RunStep::FetchingIdentifiers => write!(f, "Fetching animal IDs"),
            RunStep::Processing => write!(f, "Processing animals"),
            RunStep::PostingBatch(n) => write!(f, "Posting batch {}", n),
            RunStep::PostingFinalBatch => write!(f, "Posting final batch"),
            RunStep::NoData => write!(f, "No data found"),
            RunStep::Completed => write!(f, "Completed"),
            RunStep::Failed => write!(f, "Failed"),
        }
    }
}

impl Serialize for RunStep {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    PartiallyCompleted,
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::PartiallyCompleted => "partially completed",
            RunStatus::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Counters and error log of a single run. Owned by the run that fills it.
#[derive(Debug, Clone, Serialize)]
pub struct RunStats {
    pub run_id: u64,
    pub records_found: usize,
    /// 嘗試處理的 identifier 數，含失敗的
    pub records_attempted: usize,
    pub records_processed: usize,
    pub records_posted: usize,
    pub batches_posted: usize,
    pub errors: Vec<String>,
    pub current_step: RunStep,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub fatal_error: Option<String>,
}

impl RunStats {
    pub fn new(run_id: u64) -> Self {
        Self {
            run_id,
            records_found: 0,
            records_attempted: 0,
            records_processed: 0,
            records_posted: 0,
            batches_posted: 0,
            errors: Vec::new(),
            current_step: RunStep::Initializing,
            started_at: Utc::now(),
            finished_at: None,
            fatal_error: None,
        }
    }

    /// Appends a timestamped entry to the error log.
    pub fn add_error(&mut self, message: impl AsRef<str>) {
        let stamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        self.errors.push(format!("{}: {}", stamp, message.as_ref()));
    }

    pub fn set_step(&mut self, step: RunStep) {
        if self.is_finalized() {
            tracing::debug!("Ignoring step change to '{}' after finalization", step);
            return;
        }
        self.current_step = step;
    }

    pub fn record_batch_posted(&mut self, records: usize) {
        self.batches_posted += 1;
        self.records_posted += records;
    }

    pub fn complete(&mut self) -> bool {
        self.finalize(RunStep::Completed)
    }

    pub fn complete_without_data(&mut self) -> bool {
        self.finalize(RunStep::NoData)
    }

    pub fn fail(&mut self, message: impl Into<String>) -> bool {
        let message = message.into();
        if self.is_finalized() {
            return false;
        }
        self.add_error(format!("Process failed: {}", message));
        self.fatal_error = Some(message);
        self.finalize(RunStep::Failed)
    }

    // 結束時間與最終狀態只能寫一次
    fn finalize(&mut self, step: RunStep) -> bool {
        if self.is_finalized() {
            tracing::warn!(
                "Run {} already finalized as '{}', ignoring '{}'",
                self.run_id,
                self.current_step,
                step
            );
            return false;
        }
        self.finished_at = Some(Utc::now());
        self.current_step = step;
        true
    }

    pub fn is_finalized(&self) -> bool {
        self.finished_at.is_some()
    }

    pub fn status(&self) -> RunStatus {
        match self.current_step {
            RunStep::Failed => RunStatus::Failed,
            RunStep::Completed | RunStep::NoData if self.errors.is_empty() => RunStatus::Completed,
            RunStep::Completed | RunStep::NoData => RunStatus::PartiallyCompleted,
            _ => RunStatus::Running,
        }
    }

    pub fn duration(&self) -> Duration {
        let end = self.finished_at.unwrap_or_else(Utc::now);
        (end - self.started_at).to_std().unwrap_or_default()
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }
}
