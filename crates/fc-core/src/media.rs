//! File classification by extension.
//!
//! Classification is a pure function of the lowercase extension. The same
//! tables decide which output formats are offered for a file and whether a
//! batch's target format is known at all.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{Error, Result};

/// Input extensions classified as video.
pub const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "webm", "avi", "mkv", "mov", "wmv", "flv", "m4v", "mpeg", "mpg", "3gp", "mts",
    "m2ts", "ts", "vob", "ogv", "rm", "rmvb", "asf", "divx", "f4v",
];

/// Input extensions classified as image.
pub const IMAGE_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "webp", "gif", "bmp", "tiff", "tif", "ico", "svg",
];

/// Output formats offered for video inputs.
pub const VIDEO_OUTPUT_FORMATS: &[&str] = &["mp4", "webm", "avi", "mkv", "mov", "gif"];

/// Output formats offered for image inputs.
pub const IMAGE_OUTPUT_FORMATS: &[&str] = &["png", "jpg", "jpeg", "webp", "gif", "bmp", "tiff"];

/// Broad category of a media file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Video,
    Image,
    Unknown,
}

impl FileKind {
    /// Classify an extension (with or without the leading dot).
    pub fn from_extension(ext: &str) -> Self {
        let ext = normalize_format(ext);
        if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            FileKind::Video
        } else if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            FileKind::Image
        } else {
            FileKind::Unknown
        }
    }

    /// Classify a path by its extension.
    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(Self::from_extension)
            .unwrap_or(FileKind::Unknown)
    }

    /// Output formats available for this kind of input.
    pub fn output_formats(self) -> &'static [&'static str] {
        match self {
            FileKind::Video => VIDEO_OUTPUT_FORMATS,
            FileKind::Image => IMAGE_OUTPUT_FORMATS,
            FileKind::Unknown => &[],
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Video => write!(f, "video"),
            Self::Image => write!(f, "image"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

impl FromStr for FileKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "video" => Ok(Self::Video),
            "image" => Ok(Self::Image),
            "unknown" => Ok(Self::Unknown),
            other => Err(Error::Validation(format!("unknown file kind: {other}"))),
        }
    }
}

/// Lowercase a format name and strip a leading dot.
pub fn normalize_format(format: &str) -> String {
    format.trim().trim_start_matches('.').to_ascii_lowercase()
}

/// Whether `format` appears in any output format list.
pub fn is_known_output_format(format: &str) -> bool {
    let format = normalize_format(format);
    VIDEO_OUTPUT_FORMATS.contains(&format.as_str())
        || IMAGE_OUTPUT_FORMATS.contains(&format.as_str())
}

/// Snapshot of a file on disk, classified by extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub path: PathBuf,
    /// Display name (final path component).
    pub name: String,
    /// Lowercase extension without the dot; empty when the file has none.
    pub extension: String,
    pub size: u64,
    pub kind: FileKind,
}

impl FileDescriptor {
    /// Read a descriptor from the filesystem, failing if metadata is unreadable.
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path)?;
        if metadata.is_dir() {
            return Err(Error::Validation(format!(
                "{} is a directory",
                path.display()
            )));
        }
        Ok(Self::with_size(path, metadata.len()))
    }

    /// Describe a path without requiring it to exist. Size is 0 when the
    /// metadata cannot be read.
    pub fn describe(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        Self::with_size(path, size)
    }

    fn with_size(path: &Path, size: u64) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let extension = path
            .extension()
            .map(|e| normalize_format(&e.to_string_lossy()))
            .unwrap_or_default();
        Self {
            path: path.to_path_buf(),
            name,
            kind: FileKind::from_extension(&extension),
            extension,
            size,
        }
    }

    /// Output formats available for this file.
    pub fn output_formats(&self) -> &'static [&'static str] {
        self.kind.output_formats()
    }
}
