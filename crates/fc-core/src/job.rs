//! Conversion job record and its lifecycle.
//!
//! ```text
//! pending --start--> processing --progress*--> completed
//!    |                    |                 \
//!    |                    |                  -> failed
//!    |                    --cancel-------------> cancelled
//!    --fail (backend unresolvable)-------------> failed
//! ```
//!
//! Transitions are the only mutations. Terminal jobs never change again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::ids::JobId;
use crate::media::{normalize_format, FileDescriptor, FileKind};

/// Lifecycle status of a conversion job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// `completed`, `failed` and `cancelled` admit no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether the lifecycle graph has an edge from `self` to `next`.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Failed)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Processing, Cancelled)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Processing => write!(f, "processing"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// One single-file conversion and its tracked state.
///
/// `output_size` is present only when completed and `error_message` only when
/// failed; the transition methods keep both invariants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionJob {
    pub id: JobId,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub input_format: String,
    pub output_format: String,
    pub kind: FileKind,
    pub input_size: u64,
    pub output_size: Option<u64>,
    pub status: JobStatus,
    pub error_message: Option<String>,
    /// 0 to 100, non-decreasing while processing.
    pub progress: f32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ConversionJob {
    /// Create a pending job for a described input file.
    pub fn new(input: &FileDescriptor, output_path: PathBuf, output_format: &str) -> Self {
        Self {
            id: JobId::new(),
            input_path: input.path.clone(),
            output_path,
            input_format: input.extension.clone(),
            output_format: normalize_format(output_format),
            kind: input.kind,
            input_size: input.size,
            output_size: None,
            status: JobStatus::Pending,
            error_message: None,
            progress: 0.0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// A fresh pending job with the same paths and formats.
    pub fn retry(&self) -> Self {
        Self {
            id: JobId::new(),
            input_path: self.input_path.clone(),
            output_path: self.output_path.clone(),
            input_format: self.input_format.clone(),
            output_format: self.output_format.clone(),
            kind: self.kind,
            input_size: self.input_size,
            output_size: None,
            status: JobStatus::Pending,
            error_message: None,
            progress: 0.0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn transition(&mut self, to: JobStatus) -> Result<()> {
        if !self.status.can_transition_to(to) {
            return Err(Error::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    /// pending -> processing.
    pub fn start(&mut self) -> Result<()> {
        self.transition(JobStatus::Processing)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// Record a progress value. Returns `true` if the stored value changed.
    ///
    /// Values are clamped to 0..=100. Lower values, non-finite values and
    /// updates outside `processing` are ignored.
    pub fn update_progress(&mut self, progress: f32) -> bool {
        if self.status != JobStatus::Processing || !progress.is_finite() {
            return false;
        }
        let progress = progress.clamp(0.0, 100.0);
        if progress <= self.progress {
            return false;
        }
        self.progress = progress;
        true
    }

    /// processing -> completed.
    pub fn complete(&mut self, output_size: u64) -> Result<()> {
        self.transition(JobStatus::Completed)?;
        self.progress = 100.0;
        self.output_size = Some(output_size);
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// pending|processing -> failed. An empty message is replaced so the
    /// failed status always carries one.
    pub fn fail(&mut self, message: &str) -> Result<()> {
        self.transition(JobStatus::Failed)?;
        let message = message.trim();
        self.error_message = Some(if message.is_empty() {
            "unknown error".to_string()
        } else {
            message.to_string()
        });
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// processing -> cancelled.
    pub fn cancel(&mut self) -> Result<()> {
        self.transition(JobStatus::Cancelled)?;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Completion time minus start time, once both are known.
    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }

    /// [`duration`](Self::duration) in whole milliseconds, 0 when unknown.
    pub fn duration_ms(&self) -> u64 {
        self.duration()
            .map(|d| d.num_milliseconds().max(0) as u64)
            .unwrap_or(0)
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            id: self.id,
            input_path: self.input_path.clone(),
            progress: self.progress,
            status: self.status,
        }
    }
}

/// Latest known progress of a job, as returned by status queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub id: JobId,
    pub input_path: PathBuf,
    pub progress: f32,
    pub status: JobStatus,
}
