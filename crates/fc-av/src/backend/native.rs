//! In-process backend over a platform media framework.
//!
//! The framework runs on a blocking thread and publishes fractional progress
//! through a shared [`ExportSession`], which the adapter polls and rescales
//! to 0--100. Cancellation is a request: the framework notices the flag and
//! stops on its own.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fc_core::config::BackendKind;
use fc_core::FileKind;
use image::{DynamicImage, ImageFormat};
use tokio_util::sync::CancellationToken;

use super::{Backend, ConvertRequest, Outcome, ProgressSender};
use crate::command::ToolCommand;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Failure reported by a [`MediaFramework`].
#[derive(Debug, thiserror::Error)]
pub enum FrameworkError {
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("export cancelled")]
    Cancelled,
    #[error("{0}")]
    Failed(String),
}

impl From<std::io::Error> for FrameworkError {
    fn from(e: std::io::Error) -> Self {
        FrameworkError::Failed(e.to_string())
    }
}

/// Progress and cancellation state shared with a running export.
#[derive(Debug, Default)]
pub struct ExportSession {
    progress_bits: AtomicU32,
    cancelled: AtomicBool,
}

impl ExportSession {
    /// Record progress as a fraction in 0.0..=1.0.
    pub fn set_progress(&self, fraction: f32) {
        let fraction = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.progress_bits.store(fraction.to_bits(), Ordering::Release);
    }

    pub fn progress(&self) -> f32 {
        f32::from_bits(self.progress_bits.load(Ordering::Acquire))
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// A platform media API capable of exporting one file.
pub trait MediaFramework: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Whether an input of `kind` can be exported as `target`.
    fn supports(&self, kind: FileKind, target: &str) -> bool;

    /// Perform the export, blocking the calling thread. Returns the output
    /// size in bytes.
    fn export(&self, request: &ConvertRequest, session: &ExportSession)
        -> Result<u64, FrameworkError>;
}

/// Still-image conversion through the `image` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageFramework;

impl ImageFramework {
    fn target_format(target: &str) -> Option<ImageFormat> {
        if !fc_core::IMAGE_OUTPUT_FORMATS.contains(&target) {
            return None;
        }
        ImageFormat::from_extension(target)
    }
}

impl MediaFramework for ImageFramework {
    fn name(&self) -> &str {
        "image"
    }

    fn supports(&self, kind: FileKind, target: &str) -> bool {
        kind == FileKind::Image && Self::target_format(target).is_some()
    }

    fn export(
        &self,
        request: &ConvertRequest,
        session: &ExportSession,
    ) -> Result<u64, FrameworkError> {
        let format = Self::target_format(&request.output_format).ok_or_else(|| {
            FrameworkError::Unsupported(format!("cannot encode {}", request.output_format))
        })?;

        session.set_progress(0.05);
        let decoded = image::open(&request.input)
            .map_err(|e| FrameworkError::Failed(format!("decode failed: {e}")))?;
        if session.is_cancelled() {
            return Err(FrameworkError::Cancelled);
        }
        session.set_progress(0.5);

        // JPEG has no alpha channel.
        let encoded = match format {
            ImageFormat::Jpeg => DynamicImage::ImageRgb8(decoded.to_rgb8()),
            _ => decoded,
        };
        if session.is_cancelled() {
            return Err(FrameworkError::Cancelled);
        }

        if let Some(parent) = request.output.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        encoded
            .save_with_format(&request.output, format)
            .map_err(|e| FrameworkError::Failed(format!("encode failed: {e}")))?;
        session.set_progress(1.0);

        Ok(std::fs::metadata(&request.output)?.len())
    }
}

/// Backend adapter over a [`MediaFramework`]. No subprocess, no extraction.
pub struct NativeBackend {
    framework: Arc<dyn MediaFramework>,
    poll_interval: Duration,
}

impl std::fmt::Debug for NativeBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeBackend")
            .field("framework", &self.framework.name())
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

impl NativeBackend {
    pub fn new(framework: Arc<dyn MediaFramework>) -> Self {
        Self {
            framework,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

impl Default for NativeBackend {
    fn default() -> Self {
        Self::new(Arc::new(ImageFramework))
    }
}

/// Best-effort host OS version.
async fn host_os_version() -> String {
    let version = match std::env::consts::OS {
        "linux" => tokio::fs::read_to_string("/proc/sys/kernel/osrelease")
            .await
            .ok(),
        "macos" => ToolCommand::new(PathBuf::from("sw_vers"))
            .arg("-productVersion")
            .timeout(Duration::from_secs(5))
            .execute()
            .await
            .ok()
            .map(|out| out.stdout),
        _ => None,
    };
    version
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

#[async_trait]
impl Backend for NativeBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Native
    }

    fn name(&self) -> &str {
        self.framework.name()
    }

    /// The framework has no version of its own; report the host OS instead.
    async fn version(&self) -> fc_core::Result<String> {
        Ok(format!(
            "{} ({} {})",
            self.framework.name(),
            std::env::consts::OS,
            host_os_version().await
        ))
    }

    async fn convert(
        &self,
        request: &ConvertRequest,
        progress: &ProgressSender,
        cancel: &CancellationToken,
    ) -> Outcome {
        if !self.framework.supports(request.kind, &request.output_format) {
            return Outcome::failed(format!(
                "unsupported: {} cannot convert {} input to {}",
                self.framework.name(),
                request.kind,
                request.output_format
            ));
        }
        if cancel.is_cancelled() {
            return Outcome::Cancelled;
        }

        let session = Arc::new(ExportSession::default());
        let mut task = {
            let framework = Arc::clone(&self.framework);
            let request = request.clone();
            let session = Arc::clone(&session);
            tokio::task::spawn_blocking(move || framework.export(&request, &session))
        };

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut last_reported = 0.0_f32;

        let joined = loop {
            tokio::select! {
                joined = &mut task => break joined,
                _ = cancel.cancelled(), if !session.is_cancelled() => {
                    tracing::info!(job_id = %request.job_id, "requesting framework cancellation");
                    session.cancel();
                }
                _ = ticker.tick() => {
                    let pct = session.progress() * 100.0;
                    if pct > last_reported {
                        last_reported = pct;
                        progress.send(pct);
                    }
                }
            }
        };

        let outcome = match joined {
            Ok(Ok(output_size)) => {
                if last_reported < 100.0 {
                    progress.send(100.0);
                }
                Outcome::Completed { output_size }
            }
            Ok(Err(FrameworkError::Cancelled)) => Outcome::Cancelled,
            Ok(Err(e)) => Outcome::failed(e.to_string()),
            Err(e) => Outcome::failed(format!("framework task failed: {e}")),
        };

        if !matches!(outcome, Outcome::Completed { .. }) {
            if let Err(e) = tokio::fs::remove_file(&request.output).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %request.output.display(), "failed to remove partial output: {e}");
                }
            }
        }
        outcome
    }
}
