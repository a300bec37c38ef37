//! Unified error type for the file converter.
//!
//! Library code funnels its failures into [`Error`]. Cancellation is not an
//! error: backends report it as a separate outcome and jobs record it as the
//! `cancelled` status.

use std::fmt;

use crate::job::JobStatus;

/// Unified error type covering all failure modes in the converter.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No usable backend artifact was found, or extracting it failed.
    #[error("Resolution error: {0}")]
    Resolution(String),

    /// A request was malformed and rejected before any job was created.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The backend reported a failure for one job.
    #[error("Conversion error [{job}]: {message}")]
    Conversion {
        /// Identifier of the job that failed.
        job: String,
        /// Human-readable error description.
        message: String,
    },

    /// An external tool (ffmpeg) returned an error.
    #[error("Tool error [{tool}]: {message}")]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// The active backend cannot handle the requested input or target.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// A job was asked to move along an edge its lifecycle does not allow.
    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition {
        /// Status the job was in.
        from: JobStatus,
        /// Status that was requested.
        to: JobStatus,
    },

    /// The requested entity could not be found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g. "job").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// The same job identity is already being converted.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable, lowercase tag for this error's category.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Resolution(_) => "resolution",
            Error::Validation(_) => "validation",
            Error::Conversion { .. } => "conversion",
            Error::Tool { .. } => "tool",
            Error::Unsupported(_) => "unsupported",
            Error::InvalidTransition { .. } => "invalid_transition",
            Error::NotFound { .. } => "not_found",
            Error::Conflict(_) => "conflict",
            Error::Io { .. } => "io",
            Error::Internal(_) => "internal",
        }
    }

    /// Convenience constructor for [`Error::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Error::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Conversion`].
    pub fn conversion(job: impl fmt::Display, message: impl Into<String>) -> Self {
        Error::Conversion {
            job: job.to_string(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Resolution`].
    pub fn resolution(message: impl Into<String>) -> Self {
        Error::Resolution(message.into())
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
