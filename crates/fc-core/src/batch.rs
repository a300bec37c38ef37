//! Batch request and result records.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::ids::BatchId;
use crate::job::{ConversionJob, JobStatus};

/// How output files are named.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamingMode {
    /// Input base name with the target extension.
    #[default]
    #[serde(alias = "keep-original-name")]
    Original,
    /// Caller-supplied names, matched to inputs by position.
    #[serde(alias = "use-custom-names")]
    Custom,
}

impl fmt::Display for NamingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Original => write!(f, "original"),
            Self::Custom => write!(f, "custom"),
        }
    }
}

impl FromStr for NamingMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "original" | "keep-original-name" => Ok(Self::Original),
            "custom" | "use-custom-names" => Ok(Self::Custom),
            other => Err(Error::Validation(format!("unknown naming mode: {other}"))),
        }
    }
}

/// A multi-file conversion request.
///
/// `None` fields fall back to the user's settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequest {
    pub files: Vec<PathBuf>,
    pub output_format: String,
    #[serde(default)]
    pub output_directory: Option<PathBuf>,
    #[serde(default)]
    pub naming_mode: Option<NamingMode>,
    #[serde(default)]
    pub custom_names: Vec<String>,
    #[serde(default)]
    pub make_copies: Option<bool>,
}

impl BatchRequest {
    pub fn new(files: Vec<PathBuf>, output_format: impl Into<String>) -> Self {
        Self {
            files,
            output_format: output_format.into(),
            ..Default::default()
        }
    }

    pub fn output_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_directory = Some(dir.into());
        self
    }

    pub fn custom_names(mut self, names: Vec<String>) -> Self {
        self.naming_mode = Some(NamingMode::Custom);
        self.custom_names = names;
        self
    }

    pub fn make_copies(mut self, make_copies: bool) -> Self {
        self.make_copies = Some(make_copies);
        self
    }
}

/// Outcome of one file in a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionResult {
    pub success: bool,
    pub status: JobStatus,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    /// 0 unless the job completed.
    pub output_size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub duration_ms: u64,
}

impl ConversionResult {
    /// Summarize a terminal job.
    pub fn from_job(job: &ConversionJob) -> Self {
        let error_message = match job.status {
            JobStatus::Failed => job.error_message.clone(),
            JobStatus::Cancelled => Some("cancelled".to_string()),
            _ => None,
        };
        Self {
            success: job.status == JobStatus::Completed,
            status: job.status,
            input_path: job.input_path.clone(),
            output_path: job.output_path.clone(),
            output_size: job.output_size.unwrap_or(0),
            error_message,
            duration_ms: job.duration_ms(),
        }
    }

    /// A failure recorded for a file whose job could not be submitted.
    pub fn rejected(input_path: PathBuf, output_path: PathBuf, message: impl Into<String>) -> Self {
        Self {
            success: false,
            status: JobStatus::Failed,
            input_path,
            output_path,
            output_size: 0,
            error_message: Some(message.into()),
            duration_ms: 0,
        }
    }
}

/// Aggregate outcome of a batch. Results keep the request's input order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    pub batch_id: BatchId,
    pub total_files: usize,
    pub success_count: usize,
    /// Failed and cancelled files.
    pub fail_count: usize,
    pub results: Vec<ConversionResult>,
    pub total_duration_ms: u64,
}

impl BatchResult {
    pub fn new(batch_id: BatchId, results: Vec<ConversionResult>, total_duration_ms: u64) -> Self {
        let success_count = results.iter().filter(|r| r.success).count();
        Self {
            batch_id,
            total_files: results.len(),
            success_count,
            fail_count: results.len() - success_count,
            results,
            total_duration_ms,
        }
    }
}
