//! CLI end-to-end tests
//!
//! Tests for the fileconverter command-line interface. Conversions use the
//! native backend so no ffmpeg is required.

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::tempdir;

/// Get a command for the fileconverter binary
#[allow(deprecated)]
fn fileconverter_cmd() -> Command {
    let mut cmd = Command::cargo_bin("fileconverter").unwrap();
    cmd.env_remove("RUST_LOG").env_remove("DEBUG");
    cmd
}

fn native_config(dir: &Path) -> PathBuf {
    let path = dir.join("config.json");
    let config = serde_json::json!({
        "app": { "data_dir": dir.join("data") },
        "tools": { "backend": "native" },
        "conversion": { "max_concurrent_jobs": 2 }
    });
    fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();
    path
}

fn write_png(path: &Path) {
    let img = image::RgbImage::from_pixel(4, 4, image::Rgb([10, 200, 30]));
    img.save_with_format(path, image::ImageFormat::Png).unwrap();
}

#[test]
fn test_cli_no_args_shows_help() {
    let mut cmd = fileconverter_cmd();
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_cli_help_flag() {
    let mut cmd = fileconverter_cmd();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("fileconverter"))
        .stdout(predicate::str::contains("Usage"));
}

#[test]
fn test_cli_version_command() {
    let mut cmd = fileconverter_cmd();
    cmd.arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(format!(
            "fileconverter {}",
            env!("CARGO_PKG_VERSION")
        )));
}

#[test]
fn test_cli_formats_for_video() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("clip.MOV");
    fs::write(&file, b"movie").unwrap();

    let mut cmd = fileconverter_cmd();
    cmd.args(["formats", file.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Kind: video"))
        .stdout(predicate::str::contains("mp4, webm, avi, mkv, mov, gif"));
}

#[test]
fn test_cli_formats_for_unknown_kind() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("notes.txt");
    fs::write(&file, b"text").unwrap();

    let mut cmd = fileconverter_cmd();
    cmd.args(["formats", file.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("No conversions available"));
}

#[test]
fn test_cli_formats_missing_file() {
    let mut cmd = fileconverter_cmd();
    cmd.args(["formats", "/nonexistent/file.mov"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Cannot read"));
}

#[test]
fn test_cli_validate_config() {
    let dir = tempdir().unwrap();
    let config = native_config(dir.path());

    let mut cmd = fileconverter_cmd();
    cmd.args(["validate", config.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"))
        .stdout(predicate::str::contains("Backend: native"));
}

#[test]
fn test_cli_validate_rejects_malformed_json() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("broken.json");
    fs::write(&config, "{ not json").unwrap();

    let mut cmd = fileconverter_cmd();
    cmd.args(["validate", config.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("config parse error"));
}

#[test]
fn test_cli_check_backend_native() {
    let dir = tempdir().unwrap();
    let config = native_config(dir.path());

    let mut cmd = fileconverter_cmd();
    cmd.args(["--config", config.to_str().unwrap(), "check-backend"])
        .assert()
        .success()
        .stdout(predicate::str::contains("image (native backend)"))
        .stdout(predicate::str::contains("Backend is ready"));
}

#[test]
fn test_cli_convert_rejects_unknown_format() {
    let dir = tempdir().unwrap();
    let config = native_config(dir.path());
    let input = dir.path().join("a.png");
    write_png(&input);

    let mut cmd = fileconverter_cmd();
    cmd.args(["--config", config.to_str().unwrap(), "convert"])
        .arg(&input)
        .args(["--format", "xyz"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown target format"));
    assert!(input.exists());
}

#[test]
fn test_cli_convert_rejects_name_count_mismatch() {
    let dir = tempdir().unwrap();
    let config = native_config(dir.path());
    let a = dir.path().join("a.png");
    let b = dir.path().join("b.png");
    write_png(&a);
    write_png(&b);

    let mut cmd = fileconverter_cmd();
    cmd.args(["--config", config.to_str().unwrap(), "convert"])
        .args([&a, &b])
        .args(["--format", "jpg", "--name", "only-one"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("custom names"));
    assert!(!dir.path().join("only-one.jpg").exists());
}

#[test]
fn test_cli_convert_images_natively() {
    let dir = tempdir().unwrap();
    let config = native_config(dir.path());
    let out = dir.path().join("out");
    let a = dir.path().join("a.png");
    let b = dir.path().join("b.png");
    write_png(&a);
    write_png(&b);

    let mut cmd = fileconverter_cmd();
    let assert = cmd
        .args(["--config", config.to_str().unwrap(), "convert"])
        .args([&a, &b])
        .args(["--format", "jpg", "--json", "--output-dir"])
        .arg(&out)
        .assert()
        .success();

    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    let result: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(result["totalFiles"], 2);
    assert_eq!(result["successCount"], 2);
    assert_eq!(result["failCount"], 0);
    assert_eq!(
        result["results"][0]["outputPath"],
        out.join("a.jpg").to_str().unwrap()
    );
    assert!(out.join("a.jpg").exists());
    assert!(out.join("b.jpg").exists());
    assert!(a.exists(), "inputs are kept without --move");
}

#[test]
fn test_cli_convert_move_and_partial_failure() {
    let dir = tempdir().unwrap();
    let config = native_config(dir.path());
    let good = dir.path().join("good.png");
    let video = dir.path().join("clip.mov");
    write_png(&good);
    fs::write(&video, b"movie").unwrap();

    // The native image backend cannot convert video, so one file fails.
    let mut cmd = fileconverter_cmd();
    cmd.args(["--config", config.to_str().unwrap(), "convert"])
        .args([&good, &video])
        .args(["--format", "gif", "--move"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("Converted 1/2 files"))
        .stdout(predicate::str::contains("unsupported"))
        .stderr(predicate::str::contains("1 of 2 files failed"));

    assert!(!good.exists(), "converted input is moved");
    assert!(dir.path().join("good.gif").exists());
    assert!(video.exists(), "failed input is kept");
}
