//! The single-conversion contract shared by every backend.
//!
//! A backend turns one [`ConvertRequest`] into progress reports and exactly
//! one [`Outcome`]. Which backend runs is decided once at startup.

pub mod native;
pub mod process;

use std::path::PathBuf;

use async_trait::async_trait;
use fc_core::config::BackendKind;
use fc_core::{ConversionJob, FileKind, JobId};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

pub use native::{ExportSession, FrameworkError, ImageFramework, MediaFramework, NativeBackend};
pub use process::ProcessBackend;

/// What a backend needs to convert one file.
#[derive(Debug, Clone)]
pub struct ConvertRequest {
    pub job_id: JobId,
    pub input: PathBuf,
    pub output: PathBuf,
    pub input_format: String,
    pub output_format: String,
    pub kind: FileKind,
}

impl From<&ConversionJob> for ConvertRequest {
    fn from(job: &ConversionJob) -> Self {
        Self {
            job_id: job.id,
            input: job.input_path.clone(),
            output: job.output_path.clone(),
            input_format: job.input_format.clone(),
            output_format: job.output_format.clone(),
            kind: job.kind,
        }
    }
}

/// Terminal result of a single conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed { output_size: u64 },
    Failed { reason: String },
    /// Cancellation was requested and honored before the conversion finished.
    Cancelled,
}

impl Outcome {
    pub fn failed(reason: impl Into<String>) -> Self {
        Outcome::Failed {
            reason: reason.into(),
        }
    }
}

/// Callback through which a backend reports how far one conversion got.
///
/// Values are percentages. Non-finite values are dropped and the rest are
/// clamped to `0.0..=100.0`; ordering is the receiver's concern.
pub struct ProgressSender {
    callback: Box<dyn Fn(f32) + Send + Sync>,
}

impl ProgressSender {
    pub fn new(callback: impl Fn(f32) + Send + Sync + 'static) -> Self {
        Self {
            callback: Box::new(callback),
        }
    }

    /// A sender for callers that do not watch progress.
    pub fn noop() -> Self {
        Self::new(|_| {})
    }

    pub fn send(&self, percent: f32) {
        if percent.is_finite() {
            (self.callback)(percent.clamp(0.0, 100.0));
        }
    }
}

impl std::fmt::Debug for ProgressSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressSender").finish_non_exhaustive()
    }
}

/// Diagnostic description of the active backend.
#[derive(Debug, Clone, Serialize)]
pub struct BackendInfo {
    pub name: String,
    pub kind: BackendKind,
    pub version: Option<String>,
    /// Resolved executable (process backend only).
    pub executable: Option<PathBuf>,
}

/// One physical conversion mechanism.
#[async_trait]
pub trait Backend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Short identity, e.g. "ffmpeg".
    fn name(&self) -> &str;

    /// Make the backend usable. The process backend resolves its executable
    /// here.
    ///
    /// # Errors
    ///
    /// Returns [`fc_core::Error::Resolution`] when the backend cannot be used.
    async fn prepare(&self) -> fc_core::Result<()> {
        Ok(())
    }

    /// Human-readable version string.
    async fn version(&self) -> fc_core::Result<String>;

    /// The executable conversions run, if the backend has one.
    fn executable(&self) -> Option<PathBuf> {
        None
    }

    /// Convert one file. Never panics on backend failure; every failure is an
    /// [`Outcome::Failed`].
    async fn convert(
        &self,
        request: &ConvertRequest,
        progress: &ProgressSender,
        cancel: &CancellationToken,
    ) -> Outcome;

    /// Gather [`BackendInfo`], tolerating a failing version query.
    async fn info(&self) -> BackendInfo {
        let version = match self.version().await {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(backend = self.name(), "version query failed: {e}");
                None
            }
        };
        BackendInfo {
            name: self.name().to_string(),
            kind: self.kind(),
            version,
            executable: self.executable(),
        }
    }
}
