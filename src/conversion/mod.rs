//! Conversion orchestration.
//!
//! - [`Converter`]: the single façade over the backend chosen at startup
//! - [`JobTracker`]: job lifecycle, bounded concurrency, cancellation
//! - [`BatchCoordinator`]: request validation, output naming, batch results

mod batch;
mod converter;
mod tracker;

pub use batch::{BatchCoordinator, BatchPlan};
pub use converter::{BackendEvent, Converter};
pub use tracker::{JobHandle, JobRecorder, JobTracker, MemoryRecorder, NoopRecorder};
