pub mod batch;
pub mod coordinator;
pub mod etl;
pub mod fetcher;
pub mod retry;
pub mod stats;
pub mod status;
pub mod summary;
pub mod transform;

pub use batch::{BatchPoster, MAX_BATCH_SIZE};
pub use coordinator::RunCoordinator;
pub use etl::{EtlEngine, RunHandle};
pub use fetcher::SourceFetcher;
pub use retry::{RetryPolicies, RetryPolicy};
pub use stats::{RunStats, RunStatus, RunStep};
pub use status::{StatusBoard, StatusSnapshot};
pub use summary::RunSummary;
pub use transform::transform_record;

pub use crate::domain::model::{RawRecord, TransformedRecord};
pub use crate::domain::ports::{ConfigProvider, ErrorSink, RecordStore};
pub use crate::utils::error::Result;
