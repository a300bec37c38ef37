//! ffmpeg subprocess backend.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fc_core::config::{BackendKind, Config};
use fc_core::FileKind;
use tokio_util::sync::CancellationToken;

use super::{Backend, ConvertRequest, Outcome, ProgressSender};
use crate::command::{StreamOutcome, ToolCommand};
use crate::progress::ProgressParser;
use crate::resolver::BinaryResolver;

/// Stderr lines quoted in a failure message.
const ERROR_CONTEXT_LINES: usize = 3;

/// Runs each conversion as an ffmpeg child process.
#[derive(Debug)]
pub struct ProcessBackend {
    resolver: Arc<BinaryResolver>,
    data_dir: PathBuf,
    ffmpeg_override: Option<PathBuf>,
    overwrite: bool,
    job_timeout: Duration,
    version_timeout: Duration,
}

impl ProcessBackend {
    pub fn new(resolver: Arc<BinaryResolver>, data_dir: PathBuf) -> Self {
        Self {
            resolver,
            data_dir,
            ffmpeg_override: None,
            overwrite: true,
            job_timeout: Duration::from_secs(86_400),
            version_timeout: Duration::from_secs(10),
        }
    }

    pub fn from_config(config: &Config, resolver: Arc<BinaryResolver>) -> Self {
        Self {
            ffmpeg_override: config.tools.ffmpeg_path.clone(),
            overwrite: config.conversion.overwrite_output,
            job_timeout: Duration::from_secs(config.conversion.job_timeout_secs),
            version_timeout: Duration::from_secs(config.tools.version_timeout_secs),
            ..Self::new(resolver, config.data_dir())
        }
    }

    /// Use this executable instead of resolving one.
    pub fn with_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.ffmpeg_override = Some(path.into());
        self
    }

    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = timeout;
        self
    }

    fn usable_override(&self) -> Option<PathBuf> {
        self.ffmpeg_override.as_ref().filter(|p| p.exists()).cloned()
    }

    async fn ffmpeg(&self) -> fc_core::Result<PathBuf> {
        if let Some(path) = self.usable_override() {
            return Ok(path);
        }
        if let Some(path) = self.resolver.resolved_path() {
            return Ok(path);
        }
        let resolver = Arc::clone(&self.resolver);
        let data_dir = self.data_dir.clone();
        tokio::task::spawn_blocking(move || resolver.resolve(&data_dir))
            .await
            .map_err(|e| fc_core::Error::Internal(format!("resolver task failed: {e}")))?
    }
}

/// ffmpeg arguments for one conversion.
pub fn build_args(request: &ConvertRequest, overwrite: bool) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-hide_banner".into(),
        if overwrite { "-y" } else { "-n" }.into(),
        "-progress".into(),
        "pipe:2".into(),
        "-nostats".into(),
        "-i".into(),
        request.input.to_string_lossy().to_string(),
    ];

    let format = request.output_format.as_str();
    let extra: &[&str] = match (format, request.kind) {
        ("mp4" | "mov", _) => &[
            "-c:v", "libx264", "-pix_fmt", "yuv420p", "-c:a", "aac", "-movflags", "+faststart",
        ],
        ("webm", _) => &["-c:v", "libvpx-vp9", "-c:a", "libopus"],
        ("gif", FileKind::Video) => &["-vf", "fps=10,scale=480:-1:flags=lanczos"],
        ("gif", _) => &[],
        (_, _) if fc_core::IMAGE_OUTPUT_FORMATS.contains(&format) => &["-frames:v", "1"],
        _ => &[],
    };
    args.extend(extra.iter().map(|s| s.to_string()));

    args.push(request.output.to_string_lossy().to_string());
    args
}

/// Last meaningful stderr lines, skipping `key=value` progress output.
fn error_context(stderr_tail: &[String]) -> String {
    let meaningful: Vec<&str> = stderr_tail
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty() && !is_progress_line(l))
        .collect();
    let start = meaningful.len().saturating_sub(ERROR_CONTEXT_LINES);
    meaningful[start..].join("; ")
}

fn is_progress_line(line: &str) -> bool {
    line.split_once('=')
        .map(|(key, _)| !key.is_empty() && !key.contains(char::is_whitespace))
        .unwrap_or(false)
}

async fn remove_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!(path = %path.display(), "removed partial output"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), "failed to remove partial output: {e}"),
    }
}

#[async_trait]
impl Backend for ProcessBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Process
    }

    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn prepare(&self) -> fc_core::Result<()> {
        let path = self.ffmpeg().await?;
        tracing::info!(path = %path.display(), "ffmpeg backend ready");
        Ok(())
    }

    async fn version(&self) -> fc_core::Result<String> {
        let ffmpeg = self.ffmpeg().await?;
        let output = ToolCommand::new(ffmpeg)
            .arg("-version")
            .timeout(self.version_timeout)
            .execute()
            .await?;
        output
            .stdout
            .lines()
            .next()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .ok_or_else(|| fc_core::Error::tool("ffmpeg", "empty -version output"))
    }

    fn executable(&self) -> Option<PathBuf> {
        self.usable_override()
            .or_else(|| self.resolver.resolved_path())
    }

    async fn convert(
        &self,
        request: &ConvertRequest,
        progress: &ProgressSender,
        cancel: &CancellationToken,
    ) -> Outcome {
        if !request.input.is_file() {
            return Outcome::failed(format!("input file not found: {}", request.input.display()));
        }

        let ffmpeg = match self.ffmpeg().await {
            Ok(path) => path,
            Err(e) => return Outcome::failed(e.to_string()),
        };

        if let Some(parent) = request.output.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return Outcome::failed(format!(
                    "cannot create output directory {}: {e}",
                    parent.display()
                ));
            }
        }

        // Without -y a pre-existing output belongs to the user.
        let owns_output = self.overwrite || !request.output.exists();

        let mut cmd = ToolCommand::new(ffmpeg);
        cmd.timeout(self.job_timeout);
        cmd.args(build_args(request, self.overwrite));

        tracing::info!(
            job_id = %request.job_id,
            input = %request.input.display(),
            output = %request.output.display(),
            "ffmpeg conversion starting"
        );

        let mut parser = ProgressParser::new();
        let result = cmd
            .execute_with_stderr_callback(
                |line| {
                    if let Some(pct) = parser.feed(line) {
                        progress.send(pct);
                    }
                },
                Some(cancel.clone()),
            )
            .await;

        let outcome = match result {
            Err(e) => Outcome::failed(e.to_string()),
            Ok(StreamOutcome::Cancelled) => Outcome::Cancelled,
            Ok(StreamOutcome::Exited {
                status,
                stderr_tail,
            }) if !status.success() => {
                let context = error_context(&stderr_tail);
                if context.is_empty() {
                    Outcome::failed(format!("ffmpeg exited with status {status}"))
                } else {
                    Outcome::failed(format!("ffmpeg exited with status {status}: {context}"))
                }
            }
            Ok(StreamOutcome::Exited { .. }) => match tokio::fs::metadata(&request.output).await {
                Ok(meta) if meta.len() > 0 => Outcome::Completed {
                    output_size: meta.len(),
                },
                _ => Outcome::failed("ffmpeg exited successfully but produced no output"),
            },
        };

        if !matches!(outcome, Outcome::Completed { .. }) && owns_output {
            remove_partial(&request.output).await;
        }

        tracing::info!(job_id = %request.job_id, ?outcome, "ffmpeg conversion finished");
        outcome
    }
}
