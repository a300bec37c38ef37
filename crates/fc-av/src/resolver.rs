//! Locating or materializing the ffmpeg executable.
//!
//! A build may embed ffmpeg payloads keyed by (OS, architecture). When one
//! matches the running platform it is extracted into `<data_dir>/bin` the
//! first time [`BinaryResolver::resolve`] is called; every later or
//! concurrent caller shares that outcome, success or failure. Without a
//! payload the resolver probes well-known install locations and finally
//! falls back to the search path.
//!
//! Staleness is judged by byte size alone. A same-size corrupt file is not
//! detected.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;

/// Subdirectory of the data directory that receives extracted binaries.
pub const BIN_DIR: &str = "bin";

/// Payloads below this size are build placeholders, not real executables.
pub const MIN_PAYLOAD_SIZE: u64 = 1024 * 1024;

/// One embedded executable for a single platform.
#[derive(Clone, Copy)]
pub struct EmbeddedPayload {
    /// `std::env::consts::OS` value, e.g. `linux`.
    pub os: &'static str,
    /// `std::env::consts::ARCH` value, e.g. `x86_64`.
    pub arch: &'static str,
    pub file_name: &'static str,
    pub bytes: &'static [u8],
}

impl EmbeddedPayload {
    /// `<os>_<arch>` identifier.
    pub fn platform(&self) -> String {
        platform_id(self.os, self.arch)
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

impl std::fmt::Debug for EmbeddedPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddedPayload")
            .field("platform", &self.platform())
            .field("file_name", &self.file_name)
            .field("size", &self.size())
            .finish()
    }
}

include!(concat!(env!("OUT_DIR"), "/embedded_payloads.rs"));

fn platform_id(os: &str, arch: &str) -> String {
    format!("{os}_{arch}")
}

/// Resolves the ffmpeg executable at most once per resolver.
#[derive(Debug)]
pub struct BinaryResolver {
    payloads: Vec<EmbeddedPayload>,
    os: String,
    arch: String,
    min_payload_size: u64,
    resolved: OnceLock<Result<PathBuf, String>>,
    extractions: AtomicUsize,
}

impl Default for BinaryResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl BinaryResolver {
    /// Resolver over the payloads built into this binary, for the host platform.
    pub fn new() -> Self {
        Self::with_payloads(EMBEDDED_PAYLOADS.to_vec())
    }

    /// Resolver over an explicit payload table, for the host platform.
    pub fn with_payloads(payloads: Vec<EmbeddedPayload>) -> Self {
        Self {
            payloads,
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            min_payload_size: MIN_PAYLOAD_SIZE,
            resolved: OnceLock::new(),
            extractions: AtomicUsize::new(0),
        }
    }

    /// Pretend to run on another platform.
    pub fn platform(mut self, os: impl Into<String>, arch: impl Into<String>) -> Self {
        self.os = os.into();
        self.arch = arch.into();
        self
    }

    /// Override the placeholder threshold.
    pub fn min_payload_size(mut self, bytes: u64) -> Self {
        self.min_payload_size = bytes;
        self
    }

    /// `<os>_<arch>` of the platform this resolver serves.
    pub fn current_platform(&self) -> String {
        platform_id(&self.os, &self.arch)
    }

    /// The usable payload for the current platform, if any.
    pub fn current_payload(&self) -> Option<&EmbeddedPayload> {
        self.payloads
            .iter()
            .find(|p| p.os == self.os && p.arch == self.arch && self.is_usable(p))
    }

    fn is_usable(&self, payload: &EmbeddedPayload) -> bool {
        payload.size() > 0 && payload.size() >= self.min_payload_size
    }

    /// Whether an embedded executable exists for the current platform.
    pub fn has_embedded(&self) -> bool {
        self.current_payload().is_some()
    }

    /// Platform identifiers that carry a usable payload.
    pub fn supported_platforms(&self) -> Vec<String> {
        let mut platforms: Vec<String> = self
            .payloads
            .iter()
            .filter(|p| self.is_usable(p))
            .map(EmbeddedPayload::platform)
            .collect();
        platforms.sort();
        platforms.dedup();
        platforms
    }

    /// Number of extractions this resolver has performed.
    pub fn extraction_count(&self) -> usize {
        self.extractions.load(Ordering::SeqCst)
    }

    /// The cached resolution, if [`resolve`](Self::resolve) has succeeded.
    pub fn resolved_path(&self) -> Option<PathBuf> {
        self.resolved.get().and_then(|r| r.as_ref().ok().cloned())
    }

    /// Return the ffmpeg path, extracting the embedded payload on first use.
    ///
    /// Concurrent callers block on the same in-flight resolution. The first
    /// call's `app_data_dir` wins; the outcome is cached for the resolver's
    /// lifetime, including failures.
    ///
    /// # Errors
    ///
    /// Returns [`fc_core::Error::Resolution`] if extraction failed.
    pub fn resolve(&self, app_data_dir: &Path) -> fc_core::Result<PathBuf> {
        self.resolved
            .get_or_init(|| self.resolve_uncached(app_data_dir))
            .clone()
            .map_err(fc_core::Error::Resolution)
    }

    fn resolve_uncached(&self, app_data_dir: &Path) -> Result<PathBuf, String> {
        let Some(payload) = self.current_payload() else {
            let path = probe_install_locations(&self.os);
            tracing::info!(
                platform = %self.current_platform(),
                path = %path.display(),
                "No embedded ffmpeg; using discovered executable"
            );
            return Ok(path);
        };

        let bin_dir = app_data_dir.join(BIN_DIR);
        match self.extract_if_stale(payload, &bin_dir) {
            Ok(path) => Ok(path),
            Err(e) => {
                tracing::error!(bin_dir = %bin_dir.display(), "ffmpeg extraction failed: {e}");
                Err(format!(
                    "failed to extract ffmpeg for {} into {}: {e}",
                    payload.platform(),
                    bin_dir.display()
                ))
            }
        }
    }

    fn extract_if_stale(
        &self,
        payload: &EmbeddedPayload,
        bin_dir: &Path,
    ) -> std::io::Result<PathBuf> {
        fs::create_dir_all(bin_dir)?;
        let dest = bin_dir.join(payload.file_name);

        if !needs_extraction(&dest, payload.size()) {
            tracing::debug!(path = %dest.display(), "Extracted ffmpeg is current");
            return Ok(dest);
        }

        tracing::info!(
            path = %dest.display(),
            bytes = payload.size(),
            "Extracting embedded ffmpeg"
        );

        // Write beside the destination and rename so readers never observe a
        // partially written executable.
        let mut tmp = tempfile::NamedTempFile::new_in(bin_dir)?;
        tmp.write_all(payload.bytes)?;
        tmp.as_file().sync_all()?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(tmp.path(), fs::Permissions::from_mode(0o755))?;
        }

        tmp.persist(&dest).map_err(|e| e.error)?;
        self.extractions.fetch_add(1, Ordering::SeqCst);
        tracing::info!(path = %dest.display(), "Extracted embedded ffmpeg");
        Ok(dest)
    }
}

/// Missing, unreadable, or wrong-size destinations are re-extracted.
fn needs_extraction(dest: &Path, expected_size: u64) -> bool {
    match fs::metadata(dest) {
        Ok(meta) => {
            if !meta.is_file() || meta.len() != expected_size {
                tracing::info!(
                    path = %dest.display(),
                    found = meta.len(),
                    expected = expected_size,
                    "Extracted ffmpeg is stale"
                );
                return true;
            }
            false
        }
        Err(_) => true,
    }
}

fn executable_name(os: &str) -> &'static str {
    if os == "windows" {
        "ffmpeg.exe"
    } else {
        "ffmpeg"
    }
}

/// Well-known install locations, in probe order.
fn install_candidates(os: &str) -> Vec<PathBuf> {
    match os {
        "windows" => ["ProgramFiles", "ProgramFiles(x86)"]
            .iter()
            .filter_map(|var| std::env::var_os(var))
            .map(|base| PathBuf::from(base).join("ffmpeg").join("bin").join("ffmpeg.exe"))
            .collect(),
        "macos" => vec![
            PathBuf::from("/usr/local/bin/ffmpeg"),
            PathBuf::from("/opt/homebrew/bin/ffmpeg"),
        ],
        _ => vec![
            PathBuf::from("/usr/bin/ffmpeg"),
            PathBuf::from("/usr/local/bin/ffmpeg"),
        ],
    }
}

/// Probe install locations, then `PATH`, then assume the bare name works.
fn probe_install_locations(os: &str) -> PathBuf {
    let name = executable_name(os);
    install_candidates(os)
        .into_iter()
        .find(|p| p.is_file())
        .or_else(|| which::which(name).ok())
        .unwrap_or_else(|| PathBuf::from(name))
}
