pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use crate::config::CliConfig;
pub use crate::config::{RetryConfig, TomlConfig};

pub use crate::adapters::{MemoryErrorSink, MemoryRecordStore, TracingErrorSink};
pub use crate::core::{EtlEngine, RunCoordinator, RunHandle, RunStats, RunStatus, RunSummary};
pub use crate::utils::error::{EtlError, Result};
