//! # fc-av
//!
//! Conversion backends and external tool management for the file converter.
//!
//! This crate provides:
//!
//! - **Binary resolution** ([`BinaryResolver`]) -- locate a usable ffmpeg,
//!   extracting an embedded copy into the application data directory when
//!   one was bundled at build time.
//! - **Command execution** ([`ToolCommand`]) -- async builder with timeout,
//!   streamed stderr, and cancellation support.
//! - **Progress parsing** ([`ProgressParser`]) -- turn ffmpeg's
//!   `-progress` output into percentages.
//! - **Backends** ([`Backend`]) -- the ffmpeg subprocess adapter
//!   ([`ProcessBackend`]) and the in-process framework adapter
//!   ([`NativeBackend`]).

pub mod backend;
pub mod command;
pub mod progress;
pub mod resolver;

// ---- Re-exports for convenience ----

pub use backend::{
    Backend, BackendInfo, ConvertRequest, ExportSession, FrameworkError, ImageFramework,
    MediaFramework, NativeBackend, Outcome, ProcessBackend, ProgressSender,
};
pub use command::{StreamOutcome, ToolCommand, ToolOutput};
pub use progress::ProgressParser;
pub use resolver::{BinaryResolver, EmbeddedPayload};
