use crate::core::coordinator::RunCoordinator;
use crate::core::stats::RunStats;
use crate::core::status::StatusSnapshot;
use crate::utils::error::{EtlError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Runs the pipeline inline or on a background task, one run at a time.
pub struct EtlEngine {
    coordinator: Arc<RunCoordinator>,
    running: Arc<AtomicBool>,
}

impl EtlEngine {
    pub fn new(coordinator: RunCoordinator) -> Self {
        Self {
            coordinator: Arc::new(coordinator),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub async fn run(&self) -> RunStats {
        self.coordinator.run().await
    }

    /// Starts a run on a tokio task. Fails with [`EtlError::RunInProgress`]
    /// while a run spawned by this engine is still going.
    pub fn spawn(&self) -> Result<RunHandle> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::warn!("⚠️ ETL run already in progress, rejecting new run");
            return Err(EtlError::RunInProgress);
        }

        let guard = RunningGuard(self.running.clone());
        let coordinator = self.coordinator.clone();
        let run_id = coordinator.next_run_id();

        let task = tokio::spawn(async move {
            // task 結束（含 panic）時釋放
            let _guard = guard;
            coordinator.run_with_id(run_id).await
        });

        Ok(RunHandle { run_id, task })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> Option<StatusSnapshot> {
        self.coordinator.status_board().latest()
    }
}

struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Handle to a spawned run.
pub struct RunHandle {
    run_id: u64,
    task: JoinHandle<RunStats>,
}

impl RunHandle {
    pub fn run_id(&self) -> u64 {
        self.run_id
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub async fn wait(self) -> Result<RunStats> {
        self.task.await.map_err(|e| EtlError::TaskFailed {
            message: e.to_string(),
        })
    }
}
