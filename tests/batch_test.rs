//! Batch coordination integration tests.
//!
//! Runs whole batches through the coordinator against a [`ScriptedBackend`]
//! and checks the assembled results, naming, concurrency and move semantics.

mod common;

use std::path::PathBuf;
use std::time::Duration;

use assert_matches::assert_matches;
use common::{paths, ScriptedBackend, TestHarness, FAKE_OUTPUT_SIZE};
use fc_core::config::UserSettings;
use fc_core::events::EventPayload;
use fc_core::{BatchRequest, Error, JobStatus};

// ---------------------------------------------------------------------------
// Partial failure
// ---------------------------------------------------------------------------

#[tokio::test]
async fn one_failure_does_not_abort_the_batch() {
    let harness = TestHarness::new(ScriptedBackend::new().fail_on("b.png"));
    let request = BatchRequest::new(paths(&["/in/a.mov", "/in/b.png", "/in/c.avi"]), "mp4")
        .output_directory("/out");

    let result = harness.coordinator.run(&request).await.unwrap();

    assert_eq!(result.total_files, 3);
    assert_eq!(result.success_count, 2);
    assert_eq!(result.fail_count, 1);

    let outputs: Vec<_> = result.results.iter().map(|r| r.output_path.clone()).collect();
    assert_eq!(outputs, paths(&["/out/a.mp4", "/out/b.mp4", "/out/c.mp4"]));

    let [a, b, c] = &result.results[..] else {
        panic!("expected three results");
    };
    assert!(a.success && c.success);
    assert_eq!(a.output_size, FAKE_OUTPUT_SIZE);
    assert_eq!(c.output_size, FAKE_OUTPUT_SIZE);
    assert!(!b.success);
    assert_eq!(b.status, JobStatus::Failed);
    assert_eq!(b.output_size, 0);
    assert!(b
        .error_message
        .as_deref()
        .is_some_and(|m| m.contains("scripted failure")));

    assert_eq!(harness.recorder.len(), 3);
}

#[tokio::test]
async fn results_keep_input_order() {
    let backend = ScriptedBackend::new()
        .delay("first.mov", Duration::from_millis(120))
        .delay("second.mov", Duration::from_millis(60));
    let harness = TestHarness::with_options(backend, UserSettings::default(), 3);
    let request = BatchRequest::new(
        paths(&["/in/first.mov", "/in/second.mov", "/in/third.mov"]),
        "webm",
    )
    .output_directory("/out");

    let result = harness.coordinator.run(&request).await.unwrap();

    let inputs: Vec<_> = result.results.iter().map(|r| r.input_path.clone()).collect();
    assert_eq!(inputs, paths(&["/in/first.mov", "/in/second.mov", "/in/third.mov"]));
    assert_eq!(result.success_count + result.fail_count, result.total_files);
    assert!(result.total_duration_ms >= 100);
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn custom_name_mismatch_creates_no_jobs() {
    let harness = TestHarness::new(ScriptedBackend::new());
    let request = BatchRequest::new(paths(&["/in/a.mov", "/in/b.mov", "/in/c.mov"]), "mp4")
        .custom_names(vec!["one".into(), "two".into()]);

    assert_matches!(
        harness.coordinator.run(&request).await,
        Err(Error::Validation(_))
    );
    assert!(harness.tracker.list().is_empty());
    assert_eq!(harness.backend.calls(), 0);
}

#[tokio::test]
async fn custom_names_are_applied_by_position() {
    let harness = TestHarness::new(ScriptedBackend::new());
    let request = BatchRequest::new(paths(&["/in/a.mov", "/in/b.mov"]), "gif")
        .output_directory("/out")
        .custom_names(vec!["intro".into(), "outro.GIF".into()]);

    let result = harness.coordinator.run(&request).await.unwrap();
    let outputs: Vec<_> = result.results.iter().map(|r| r.output_path.clone()).collect();
    assert_eq!(outputs, paths(&["/out/intro.gif", "/out/outro.GIF"]));
}

#[tokio::test]
async fn unresolvable_backend_rejects_the_batch() {
    let harness = TestHarness::new(ScriptedBackend::new().unresolvable("ffmpeg not found"));
    let request = BatchRequest::new(paths(&["/in/a.mov"]), "mp4");

    let err = harness.coordinator.run(&request).await.unwrap_err();
    assert_matches!(err, Error::Resolution(ref m) if m.contains("ffmpeg not found"));
    assert_eq!(harness.backend.calls(), 0);
    assert!(harness.tracker.list().is_empty());
}

// ---------------------------------------------------------------------------
// Scheduling
// ---------------------------------------------------------------------------

#[tokio::test]
async fn concurrency_is_bounded() {
    let mut backend = ScriptedBackend::new();
    let names: Vec<String> = (0..8).map(|i| format!("clip{i}.mov")).collect();
    for name in &names {
        backend = backend.delay(name, Duration::from_millis(40));
    }
    let harness = TestHarness::with_options(backend, UserSettings::default(), 2);
    let files: Vec<PathBuf> = names.iter().map(|n| PathBuf::from(format!("/in/{n}"))).collect();
    let request = BatchRequest::new(files, "mp4").output_directory("/out");

    let result = harness.coordinator.run(&request).await.unwrap();

    assert_eq!(result.success_count, 8);
    assert_eq!(harness.backend.calls(), 8);
    assert!(harness.backend.peak() <= 2, "peak was {}", harness.backend.peak());
    assert!(harness.backend.peak() >= 1);
}

#[tokio::test]
async fn batch_events_bracket_the_run() {
    let harness = TestHarness::new(ScriptedBackend::new());
    let mut events = harness.tracker.subscribe();
    let request = BatchRequest::new(paths(&["/in/a.png", "/in/b.png"]), "jpg").output_directory("/out");

    let result = harness.coordinator.run(&request).await.unwrap();

    let mut received = Vec::new();
    while let Ok(event) = events.try_recv() {
        received.push(event.payload);
    }
    assert_matches!(
        received.first(),
        Some(EventPayload::BatchStarted { total_files: 2, .. })
    );
    assert_matches!(
        received.last(),
        Some(EventPayload::BatchCompleted { result: r }) if r.batch_id == result.batch_id
    );
    assert_eq!(received.iter().filter(|p| p.is_terminal()).count(), 2);
}

// ---------------------------------------------------------------------------
// Copy vs move
// ---------------------------------------------------------------------------

#[tokio::test]
async fn move_deletes_only_converted_inputs() {
    let dir = tempfile::tempdir().unwrap();
    let good = dir.path().join("good.png");
    let bad = dir.path().join("bad.png");
    std::fs::write(&good, b"png").unwrap();
    std::fs::write(&bad, b"png").unwrap();

    let harness = TestHarness::new(ScriptedBackend::new().fail_on("bad.png").write_outputs());
    let request = BatchRequest::new(vec![good.clone(), bad.clone()], "webp")
        .output_directory(dir.path().join("out"))
        .make_copies(false);

    let result = harness.coordinator.run(&request).await.unwrap();

    assert_eq!(result.success_count, 1);
    assert!(!good.exists(), "converted input should be removed");
    assert!(bad.exists(), "failed input must be kept");
    assert!(dir.path().join("out/good.webp").exists());
}

#[tokio::test]
async fn copies_keep_inputs_by_default() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("keep.png");
    std::fs::write(&input, b"png").unwrap();

    let harness = TestHarness::new(ScriptedBackend::new().write_outputs());
    let request = BatchRequest::new(vec![input.clone()], "jpg").output_directory(dir.path());

    let result = harness.coordinator.run(&request).await.unwrap();

    assert_eq!(result.success_count, 1);
    assert!(input.exists());
}

#[tokio::test]
async fn outputs_never_overwrite_another_input() {
    let dir = tempfile::tempdir().unwrap();
    let png = dir.path().join("a.png");
    let jpg = dir.path().join("a.jpg");
    std::fs::write(&png, b"original png").unwrap();
    std::fs::write(&jpg, b"original jpg").unwrap();

    let harness = TestHarness::with_options(
        ScriptedBackend::new().write_outputs(),
        UserSettings::default(),
        1,
    );
    let request = BatchRequest::new(vec![png.clone(), jpg.clone()], "png");

    let result = harness.coordinator.run(&request).await.unwrap();

    assert_eq!(result.success_count, 2);
    let outputs: Vec<_> = result.results.iter().map(|r| r.output_path.clone()).collect();
    assert_eq!(outputs, vec![dir.path().join("a-1.png"), dir.path().join("a-2.png")]);
    assert_eq!(std::fs::read(&png).unwrap(), b"original png");
    assert_eq!(std::fs::read(&jpg).unwrap(), b"original jpg");
}

#[tokio::test]
async fn move_never_deletes_another_jobs_output() {
    let dir = tempfile::tempdir().unwrap();
    let png = dir.path().join("a.png");
    let jpg = dir.path().join("a.jpg");
    std::fs::write(&png, b"original png").unwrap();
    std::fs::write(&jpg, b"original jpg").unwrap();

    let harness = TestHarness::new(ScriptedBackend::new().write_outputs());
    let request = BatchRequest::new(vec![png.clone(), jpg.clone()], "png").make_copies(false);

    let result = harness.coordinator.run(&request).await.unwrap();

    assert_eq!(result.success_count, 2);
    assert!(!png.exists() && !jpg.exists(), "both inputs are moved");
    for r in &result.results {
        assert!(r.output_path.exists(), "{} was removed", r.output_path.display());
    }
}

#[tokio::test]
async fn missing_input_fails_only_that_file() {
    let dir = tempfile::tempdir().unwrap();
    let present = dir.path().join("here.png");
    std::fs::write(&present, b"png").unwrap();

    // The scripted backend does not check inputs; the failure must come from
    // the backend for the missing file, not from batch validation.
    let harness = TestHarness::new(ScriptedBackend::new().fail_on("gone.png"));
    let request = BatchRequest::new(vec![dir.path().join("gone.png"), present], "jpg");

    let result = harness.coordinator.run(&request).await.unwrap();
    assert_eq!(result.total_files, 2);
    assert_eq!(result.fail_count, 1);
    assert!(!result.results[0].success);
    assert!(result.results[1].success);
}
