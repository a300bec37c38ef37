//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from JSON and carries the
//! sub-configs for the data directory, tools, conversion and user settings.
//! Every section defaults sensibly so a completely empty `{}` file is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::batch::NamingMode;
use crate::error::Result;
use crate::Error;

/// Directory name appended to the per-OS data directory.
pub const APP_DIR_NAME: &str = "FileConverter";

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub app: AppConfig,
    pub tools: ToolsConfig,
    pub conversion: ConversionConfig,
    pub settings: UserSettings,
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None` or the file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.conversion.max_concurrent_jobs == 0 {
            warnings.push("conversion.max_concurrent_jobs is 0; 1 will be used".into());
        }

        if let Some(ref path) = self.tools.ffmpeg_path {
            if !path.exists() {
                warnings.push(format!(
                    "tools.ffmpeg_path {} does not exist; falling back to discovery",
                    path.display()
                ));
            }
        }

        let themes = ["system", "light", "dark"];
        if !themes.contains(&self.settings.theme.as_str()) {
            warnings.push(format!(
                "settings.theme '{}' is not recognized (valid: {})",
                self.settings.theme,
                themes.join(", ")
            ));
        }

        warnings
    }

    /// The configured data directory, or the per-OS default.
    pub fn data_dir(&self) -> PathBuf {
        self.app.data_dir.clone().unwrap_or_else(default_data_dir)
    }
}

/// Per-OS application data directory with [`APP_DIR_NAME`] appended.
///
/// Windows uses `%LOCALAPPDATA%` (then `%APPDATA%`), macOS uses
/// `~/Library/Application Support`, everything else `$XDG_DATA_HOME` or
/// `~/.local/share`. Falls back to the current directory when none resolve.
pub fn default_data_dir() -> PathBuf {
    let env_dir = |key: &str| {
        std::env::var_os(key)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
    };
    let home = || env_dir("HOME").or_else(|| env_dir("USERPROFILE"));

    let base = match std::env::consts::OS {
        "windows" => env_dir("LOCALAPPDATA").or_else(|| env_dir("APPDATA")),
        "macos" => home().map(|h| h.join("Library").join("Application Support")),
        _ => env_dir("XDG_DATA_HOME").or_else(|| home().map(|h| h.join(".local").join("share"))),
    };

    base.unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Application paths.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub data_dir: Option<PathBuf>,
}

/// Which backend performs conversions. Fixed for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// External ffmpeg subprocess.
    #[default]
    Process,
    /// In-process media framework.
    Native,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Process => write!(f, "process"),
            Self::Native => write!(f, "native"),
        }
    }
}

/// External tool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Explicit ffmpeg executable; wins over extraction and discovery.
    pub ffmpeg_path: Option<PathBuf>,
    pub backend: BackendKind,
    #[serde(default = "default_version_timeout")]
    pub version_timeout_secs: u64,
}

fn default_version_timeout() -> u64 {
    10
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            backend: BackendKind::default(),
            version_timeout_secs: default_version_timeout(),
        }
    }
}

/// Conversion scheduling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
    #[serde(default = "default_true")]
    pub overwrite_output: bool,
    #[serde(default = "default_job_timeout")]
    pub job_timeout_secs: u64,
    /// Terminal jobs kept in memory for history queries.
    #[serde(default = "default_history_size")]
    pub history_size: usize,
}

fn default_max_concurrent_jobs() -> usize {
    num_cpus::get().clamp(1, 4)
}

fn default_true() -> bool {
    true
}

fn default_job_timeout() -> u64 {
    86_400
}

fn default_history_size() -> usize {
    1000
}

impl ConversionConfig {
    /// Concurrency limit with a floor of 1.
    pub fn concurrency(&self) -> usize {
        self.max_concurrent_jobs.max(1)
    }
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: default_max_concurrent_jobs(),
            overwrite_output: default_true(),
            job_timeout_secs: default_job_timeout(),
            history_size: default_history_size(),
        }
    }
}

/// User preferences consumed when a batch request leaves them unset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UserSettings {
    pub last_output_directory: Option<PathBuf>,
    pub default_naming_mode: NamingMode,
    #[serde(default = "default_true")]
    pub default_make_copies: bool,
    #[serde(default = "default_theme")]
    pub theme: String,
}

fn default_theme() -> String {
    "system".into()
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            last_output_directory: None,
            default_naming_mode: NamingMode::Original,
            default_make_copies: true,
            theme: default_theme(),
        }
    }
}
