// Adapters layer: concrete implementations of the domain ports
pub mod audit;
pub mod store;

pub use audit::{MemoryErrorSink, TracingErrorSink};
pub use store::MemoryRecordStore;
