//! Shared test harness for integration tests.
//!
//! Provides [`ScriptedBackend`], an in-memory [`Backend`] whose behaviour is
//! driven by input file names, and [`TestHarness`], which wires it into a
//! [`Converter`], [`JobTracker`] and [`BatchCoordinator`].

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use fc_av::{Backend, ConvertRequest, Outcome, ProgressSender};
use fc_core::config::{BackendKind, UserSettings};
use fc_core::{ConversionJob, FileDescriptor};
use fileconverter::conversion::{BatchCoordinator, Converter, JobTracker, MemoryRecorder};
use tokio_util::sync::CancellationToken;

/// Output size reported when the backend does not write real files.
pub const FAKE_OUTPUT_SIZE: u64 = 1024;

/// A backend that follows a script instead of converting anything.
#[derive(Default)]
pub struct ScriptedBackend {
    /// File names that always fail.
    fail_on: HashSet<String>,
    /// File names that fail on their first attempt only.
    flaky: Mutex<HashSet<String>>,
    /// File names that run until cancelled.
    hang_on: HashSet<String>,
    /// Extra time spent per file name.
    delays: HashMap<String, Duration>,
    /// Progress values reported, in order, before finishing.
    steps: Vec<f32>,
    /// Write a real output file instead of reporting a fixed size.
    write_outputs: bool,
    prepare_error: Option<String>,

    calls: AtomicUsize,
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            steps: vec![25.0, 50.0, 75.0, 100.0],
            ..Default::default()
        }
    }

    pub fn fail_on(mut self, name: &str) -> Self {
        self.fail_on.insert(name.to_string());
        self
    }

    pub fn flaky(self, name: &str) -> Self {
        self.flaky
            .lock()
            .unwrap()
            .insert(name.to_string());
        self
    }

    pub fn hang_on(mut self, name: &str) -> Self {
        self.hang_on.insert(name.to_string());
        self
    }

    pub fn delay(mut self, name: &str, delay: Duration) -> Self {
        self.delays.insert(name.to_string(), delay);
        self
    }

    pub fn steps(mut self, steps: &[f32]) -> Self {
        self.steps = steps.to_vec();
        self
    }

    pub fn write_outputs(mut self) -> Self {
        self.write_outputs = true;
        self
    }

    pub fn unresolvable(mut self, message: &str) -> Self {
        self.prepare_error = Some(message.to_string());
        self
    }

    /// Conversions started so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of conversions observed running at once.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn file_name(path: &Path) -> String {
        path.file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    async fn run(
        &self,
        request: &ConvertRequest,
        progress: &ProgressSender,
        cancel: &CancellationToken,
    ) -> Outcome {
        let name = Self::file_name(&request.input);

        if self.hang_on.contains(&name) {
            progress.send(5.0);
            cancel.cancelled().await;
            return Outcome::Cancelled;
        }

        let delay = self.delays.get(&name).copied().unwrap_or_default();
        let pause = delay / (self.steps.len().max(1) as u32);
        for step in &self.steps {
            tokio::select! {
                _ = cancel.cancelled() => return Outcome::Cancelled,
                _ = tokio::time::sleep(pause) => {}
            }
            progress.send(*step);
        }

        if self.fail_on.contains(&name) {
            return Outcome::failed(format!("scripted failure for {name}"));
        }
        if self.flaky.lock().unwrap().remove(&name) {
            return Outcome::failed(format!("transient failure for {name}"));
        }

        if self.write_outputs {
            if let Some(parent) = request.output.parent() {
                tokio::fs::create_dir_all(parent).await.unwrap();
            }
            tokio::fs::write(&request.output, b"converted").await.unwrap();
            return Outcome::Completed { output_size: 9 };
        }
        Outcome::Completed {
            output_size: FAKE_OUTPUT_SIZE,
        }
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Native
    }

    fn name(&self) -> &str {
        "scripted"
    }

    async fn prepare(&self) -> fc_core::Result<()> {
        match self.prepare_error {
            Some(ref message) => Err(fc_core::Error::resolution(message.clone())),
            None => Ok(()),
        }
    }

    async fn version(&self) -> fc_core::Result<String> {
        Ok("scripted 1.0".into())
    }

    async fn convert(
        &self,
        request: &ConvertRequest,
        progress: &ProgressSender,
        cancel: &CancellationToken,
    ) -> Outcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);

        let outcome = self.run(request, progress, cancel).await;

        self.running.fetch_sub(1, Ordering::SeqCst);
        outcome
    }
}

/// A fully wired conversion stack around a [`ScriptedBackend`].
pub struct TestHarness {
    pub backend: Arc<ScriptedBackend>,
    pub tracker: Arc<JobTracker>,
    pub coordinator: BatchCoordinator,
    pub recorder: Arc<MemoryRecorder>,
}

impl TestHarness {
    pub fn new(backend: ScriptedBackend) -> Self {
        Self::with_options(backend, UserSettings::default(), 2)
    }

    pub fn with_options(backend: ScriptedBackend, settings: UserSettings, concurrency: usize) -> Self {
        let backend = Arc::new(backend);
        let converter = Arc::new(Converter::new(backend.clone()));
        let recorder = Arc::new(MemoryRecorder::new());
        let tracker = Arc::new(JobTracker::new(converter, concurrency).with_recorder(recorder.clone()));
        let coordinator = BatchCoordinator::new(Arc::clone(&tracker), settings);
        Self {
            backend,
            tracker,
            coordinator,
            recorder,
        }
    }

    /// A pending job for `input` converting to `format` next to it.
    pub fn job(input: &str, format: &str) -> ConversionJob {
        let input = PathBuf::from(input);
        let output = input.with_extension(format!("out.{format}"));
        ConversionJob::new(&FileDescriptor::describe(&input), output, format)
    }
}

pub fn paths(items: &[&str]) -> Vec<PathBuf> {
    items.iter().map(PathBuf::from).collect()
}

/// Poll until `check` holds, failing the test after two seconds.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !check() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
