use crate::core::stats::{RunStats, RunStatus};
use serde::Serialize;
use std::fmt;

/// How many error entries a summary keeps.
pub const SUMMARY_ERROR_LIMIT: usize = 10;

/// Final report of one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: u64,
    pub status: RunStatus,
    pub step: String,
    pub duration_secs: f64,
    pub records_found: usize,
    pub records_attempted: usize,
    pub records_processed: usize,
    pub records_posted: usize,
    pub batches_posted: usize,
    pub error_count: usize,
    pub recent_errors: Vec<String>,
    pub success_rate: f64,
}

impl RunSummary {
    pub fn from_stats(stats: &RunStats) -> Self {
        let skip = stats.errors.len().saturating_sub(SUMMARY_ERROR_LIMIT);
        let success_rate = if stats.records_found == 0 {
            0.0
        } else {
            stats.records_processed as f64 / stats.records_found as f64 * 100.0
        };

        Self {
            run_id: stats.run_id,
            status: stats.status(),
            step: stats.current_step.to_string(),
            duration_secs: stats.duration().as_secs_f64(),
            records_found: stats.records_found,
            records_attempted: stats.records_attempted,
            records_processed: stats.records_processed,
            records_posted: stats.records_posted,
            batches_posted: stats.batches_posted,
            error_count: stats.error_count(),
            recent_errors: stats.errors[skip..].to_vec(),
            success_rate,
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Run #{} {} ({})", self.run_id, self.status, self.step)?;
        writeln!(f, "  Duration:          {:.2}s", self.duration_secs)?;
        writeln!(f, "  Animals found:     {}", self.records_found)?;
        writeln!(f, "  Animals processed: {}", self.records_processed)?;
        writeln!(f, "  Animals posted:    {}", self.records_posted)?;
        writeln!(f, "  Batches posted:    {}", self.batches_posted)?;
        writeln!(f, "  Success rate:      {:.1}%", self.success_rate)?;
        write!(f, "  Errors:            {}", self.error_count)?;

        if !self.recent_errors.is_empty() {
            write!(f, "\n  Recent errors:")?;
            for error in &self.recent_errors {
                write!(f, "\n    - {}", error)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_keeps_last_ten_errors() {
        let mut stats = RunStats::new(1);
        stats.records_found = 20;
        stats.records_processed = 8;
        for i in 0..12 {
            stats.add_error(format!("Record {}: not found", i));
        }
        stats.complete();

        let summary = RunSummary::from_stats(&stats);

        assert_eq!(summary.error_count, 12);
        assert_eq!(summary.recent_errors.len(), 10);
        assert!(summary.recent_errors[0].ends_with("Record 2: not found"));
        assert_eq!(summary.status, RunStatus::PartiallyCompleted);
        assert!((summary.success_rate - 40.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_summary_without_records() {
        let mut stats = RunStats::new(2);
        stats.complete_without_data();

        let summary = RunSummary::from_stats(&stats);

        assert_eq!(summary.success_rate, 0.0);
        assert_eq!(summary.status, RunStatus::Completed);
        assert_eq!(summary.step, "No data found");
    }

    #[test]
    fn test_summary_display() {
        let mut stats = RunStats::new(5);
        stats.records_found = 2;
        stats.records_processed = 2;
        stats.record_batch_posted(2);
        stats.complete();

        let text = RunSummary::from_stats(&stats).to_string();

        assert!(text.starts_with("Run #5 completed (Completed)"));
        assert!(text.contains("Animals posted:    2"));
        assert!(text.contains("Success rate:      100.0%"));
        assert!(!text.contains("Recent errors"));
    }

    #[test]
    fn test_summary_serializes_status() {
        let mut stats = RunStats::new(1);
        stats.fail("boom");
        let value = serde_json::to_value(RunSummary::from_stats(&stats)).unwrap();
        assert_eq!(value["status"], "failed");
        assert_eq!(value["error_count"], 1);
    }
}
