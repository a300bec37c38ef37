//! fc-core: shared types, IDs, errors, configuration, and event system.
//!
//! This crate is the foundational dependency for the other fc-* crates,
//! providing type-safe identifiers, a unified error type, the media and job
//! data model, application configuration, and a broadcast event bus.

pub mod batch;
pub mod config;
pub mod error;
pub mod events;
pub mod ids;
pub mod job;
pub mod media;

// Re-export the most commonly used items at the crate root.
pub use batch::{BatchRequest, BatchResult, ConversionResult, NamingMode};
pub use error::{Error, Result};
pub use ids::*;
pub use job::{ConversionJob, JobStatus, ProgressSnapshot};
pub use media::*;
