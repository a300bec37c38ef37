//! Generates the embedded ffmpeg payload table.
//!
//! With the `embed-ffmpeg` feature, every `binaries/<os>_<arch>/ffmpeg[.exe]`
//! becomes one table entry. Without it the table is empty and resolution
//! falls back to discovery.

use std::env;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

fn main() {
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap_or_default());
    let binaries = manifest_dir.join("binaries");
    println!("cargo:rerun-if-changed={}", binaries.display());
    println!("cargo:rerun-if-env-changed=CARGO_FEATURE_EMBED_FFMPEG");

    let mut entries = String::new();
    if env::var_os("CARGO_FEATURE_EMBED_FFMPEG").is_some() {
        for (os, arch, file) in scan(&binaries) {
            let _ = writeln!(
                entries,
                "    EmbeddedPayload {{ os: {os:?}, arch: {arch:?}, file_name: {name:?}, bytes: include_bytes!({path:?}) }},",
                name = file.file_name().and_then(|n| n.to_str()).unwrap_or("ffmpeg"),
                path = file.display().to_string(),
            );
        }
    }

    let out = PathBuf::from(env::var("OUT_DIR").unwrap_or_default()).join("embedded_payloads.rs");
    let source = format!("pub(crate) static EMBEDDED_PAYLOADS: &[EmbeddedPayload] = &[\n{entries}];\n");
    if let Err(e) = fs::write(&out, source) {
        panic!("failed to write {}: {e}", out.display());
    }
}

fn scan(binaries: &Path) -> Vec<(String, String, PathBuf)> {
    let Ok(dirs) = fs::read_dir(binaries) else {
        return Vec::new();
    };
    let mut found = Vec::new();
    for dir in dirs.flatten() {
        let name = dir.file_name().to_string_lossy().to_string();
        // `macos_aarch64` splits at the first underscore; arch names like
        // `x86_64` keep theirs.
        let Some((os, arch)) = name.split_once('_') else {
            continue;
        };
        for candidate in ["ffmpeg", "ffmpeg.exe"] {
            let file = dir.path().join(candidate);
            if file.is_file() {
                println!("cargo:rerun-if-changed={}", file.display());
                found.push((os.to_string(), arch.to_string(), file));
            }
        }
    }
    found.sort();
    found
}
