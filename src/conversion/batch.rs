//! Multi-file batch coordination.
//!
//! The [`BatchCoordinator`] validates a [`BatchRequest`], plans one output
//! path per input, submits every job to the [`JobTracker`] and assembles the
//! [`BatchResult`] in input order once all of them are terminal.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use fc_core::config::UserSettings;
use fc_core::events::EventPayload;
use fc_core::{
    is_known_output_format, normalize_format, BatchId, BatchRequest, BatchResult,
    ConversionJob, ConversionResult, Error, FileDescriptor, NamingMode, Result,
};
use futures::future::join_all;

use super::tracker::JobTracker;

/// A validated batch, ready to dispatch.
#[derive(Debug, Clone)]
pub struct BatchPlan {
    pub jobs: Vec<ConversionJob>,
    /// Whether inputs survive a successful conversion.
    pub make_copies: bool,
}

pub struct BatchCoordinator {
    tracker: Arc<JobTracker>,
    settings: UserSettings,
}

impl BatchCoordinator {
    pub fn new(tracker: Arc<JobTracker>, settings: UserSettings) -> Self {
        Self { tracker, settings }
    }

    pub fn tracker(&self) -> &Arc<JobTracker> {
        &self.tracker
    }

    /// Validate `request` and compute every output path. No job is created
    /// when this fails.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for an empty input list, an unknown
    /// target format, or custom names that do not line up with the inputs.
    pub fn plan(&self, request: &BatchRequest) -> Result<BatchPlan> {
        if request.files.is_empty() {
            return Err(Error::Validation("batch has no input files".into()));
        }

        let format = normalize_format(&request.output_format);
        if format.is_empty() || !is_known_output_format(&format) {
            return Err(Error::Validation(format!(
                "unknown target format: {:?}",
                request.output_format
            )));
        }

        let naming = request.naming_mode.unwrap_or(self.settings.default_naming_mode);
        if naming == NamingMode::Custom {
            if request.custom_names.len() != request.files.len() {
                return Err(Error::Validation(format!(
                    "{} custom names given for {} files",
                    request.custom_names.len(),
                    request.files.len()
                )));
            }
            for name in &request.custom_names {
                validate_custom_name(name)?;
            }
        }

        let make_copies = request
            .make_copies
            .unwrap_or(self.settings.default_make_copies);

        // Every input is off limits as an output, not only a job's own.
        let mut taken: HashSet<PathBuf> = request.files.iter().cloned().collect();
        let jobs = request
            .files
            .iter()
            .enumerate()
            .map(|(index, input)| {
                let dir = self.output_dir(request, input);
                let file_name = match naming {
                    NamingMode::Original => original_file_name(input, &format),
                    NamingMode::Custom => custom_file_name(&request.custom_names[index], &format),
                };
                let output = unique_output_path(dir.join(file_name), &mut taken);
                ConversionJob::new(&FileDescriptor::describe(input), output, &format)
            })
            .collect();

        Ok(BatchPlan { jobs, make_copies })
    }

    /// Request directory, then the last used one, then the input's own.
    fn output_dir(&self, request: &BatchRequest, input: &Path) -> PathBuf {
        request
            .output_directory
            .clone()
            .or_else(|| self.settings.last_output_directory.clone())
            .unwrap_or_else(|| {
                input
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_default()
            })
    }

    /// Convert every file in `request`. Individual failures are reported in
    /// the result; they never abort the batch.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for a malformed request and
    /// [`Error::Resolution`] when the backend is unusable. In both cases no
    /// job is dispatched.
    pub async fn run(&self, request: &BatchRequest) -> Result<BatchResult> {
        let plan = self.plan(request)?;
        self.tracker.converter().ready().await?;

        let batch_id = BatchId::new();
        let total = plan.jobs.len();
        let make_copies = plan.make_copies;
        tracing::info!(%batch_id, total, format = %normalize_format(&request.output_format), make_copies, "batch started");
        self.tracker.events().broadcast(EventPayload::BatchStarted {
            batch_id,
            total_files: total,
        });

        let started = Instant::now();
        let mut pending = Vec::with_capacity(total);
        for job in plan.jobs {
            let input = job.input_path.clone();
            let output = job.output_path.clone();
            let submitted = self
                .tracker
                .submit(job)
                .await
                .map_err(|e| ConversionResult::rejected(input, output, e.to_string()));
            pending.push(submitted);
        }

        let results = join_all(pending.into_iter().map(|submitted| async move {
            let result = match submitted {
                Ok(handle) => handle.wait().await,
                Err(rejected) => rejected,
            };
            if result.success && !make_copies {
                remove_input(&result).await;
            }
            result
        }))
        .await;

        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let result = BatchResult::new(batch_id, results, elapsed_ms);
        tracing::info!(
            %batch_id,
            total = result.total_files,
            succeeded = result.success_count,
            failed = result.fail_count,
            duration_ms = result.total_duration_ms,
            "batch finished"
        );
        self.tracker.events().broadcast(EventPayload::BatchCompleted {
            result: result.clone(),
        });
        Ok(result)
    }
}

fn validate_custom_name(name: &str) -> Result<()> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(Error::Validation("custom name is empty".into()));
    }
    if trimmed.contains(['/', '\\']) || trimmed == "." || trimmed == ".." {
        return Err(Error::Validation(format!(
            "custom name {name:?} must be a plain file name"
        )));
    }
    Ok(())
}

fn original_file_name(input: &Path, format: &str) -> String {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "output".to_string());
    format!("{stem}.{format}")
}

fn custom_file_name(name: &str, format: &str) -> String {
    let name = name.trim();
    let suffix = format!(".{format}");
    let has_extension = name.len() > suffix.len()
        && name
            .get(name.len() - suffix.len()..)
            .is_some_and(|tail| tail.eq_ignore_ascii_case(&suffix));
    if has_extension {
        name.to_string()
    } else {
        format!("{name}{suffix}")
    }
}

/// `candidate`, or `stem-1.ext`, `stem-2.ext`, ... when it is already taken
/// by an earlier output or by any input of the batch.
fn unique_output_path(candidate: PathBuf, taken: &mut HashSet<PathBuf>) -> PathBuf {
    let mut path = candidate.clone();
    let mut counter = 1;
    while taken.contains(&path) {
        let stem = candidate
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let name = match candidate.extension() {
            Some(ext) => format!("{stem}-{counter}.{}", ext.to_string_lossy()),
            None => format!("{stem}-{counter}"),
        };
        path = candidate.with_file_name(name);
        counter += 1;
    }
    taken.insert(path.clone());
    path
}

/// Delete a converted input (move semantics). Failures are only logged.
async fn remove_input(result: &ConversionResult) {
    if result.input_path == result.output_path {
        return;
    }
    match tokio::fs::remove_file(&result.input_path).await {
        Ok(()) => tracing::info!(input = %result.input_path.display(), "removed converted input"),
        Err(e) => tracing::warn!(
            input = %result.input_path.display(),
            "failed to remove converted input: {e}"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversion::Converter;
    use assert_matches::assert_matches;
    use fc_av::NativeBackend;

    fn coordinator(settings: UserSettings) -> BatchCoordinator {
        let converter = Arc::new(Converter::new(Arc::new(NativeBackend::default())));
        BatchCoordinator::new(Arc::new(JobTracker::new(converter, 2)), settings)
    }

    fn outputs(plan: &BatchPlan) -> Vec<PathBuf> {
        plan.jobs.iter().map(|j| j.output_path.clone()).collect()
    }

    fn files(paths: &[&str]) -> Vec<PathBuf> {
        paths.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn original_names_in_output_dir() {
        let request = BatchRequest::new(files(&["/in/a.mov", "/in/b.png", "/in/c.avi"]), "mp4")
            .output_directory("/out");
        let plan = coordinator(UserSettings::default()).plan(&request).unwrap();
        assert_eq!(
            outputs(&plan),
            files(&["/out/a.mp4", "/out/b.mp4", "/out/c.mp4"])
        );
        assert!(plan.jobs.iter().all(|j| j.output_format == "mp4"));
        assert!(plan.make_copies);
    }

    #[test]
    fn custom_names_keep_position() {
        let request = BatchRequest::new(files(&["/in/a.mov", "/in/b.mov"]), ".WEBM")
            .output_directory("/out")
            .custom_names(vec!["first".into(), "second.webm".into()]);
        let plan = coordinator(UserSettings::default()).plan(&request).unwrap();
        assert_eq!(outputs(&plan), files(&["/out/first.webm", "/out/second.webm"]));
    }

    #[test]
    fn custom_name_count_must_match() {
        let request = BatchRequest::new(files(&["/in/a.mov", "/in/b.mov"]), "mp4")
            .custom_names(vec!["only-one".into()]);
        assert_matches!(
            coordinator(UserSettings::default()).plan(&request),
            Err(Error::Validation(_))
        );
    }

    #[test]
    fn rejects_bad_requests() {
        let c = coordinator(UserSettings::default());
        assert_matches!(c.plan(&BatchRequest::new(vec![], "mp4")), Err(Error::Validation(_)));
        assert_matches!(
            c.plan(&BatchRequest::new(files(&["/in/a.mov"]), "xyz")),
            Err(Error::Validation(_))
        );
        assert_matches!(
            c.plan(&BatchRequest::new(files(&["/in/a.mov"]), "mp4").custom_names(vec!["../x".into()])),
            Err(Error::Validation(_))
        );
        assert_matches!(
            c.plan(&BatchRequest::new(files(&["/in/a.mov"]), "mp4").custom_names(vec!["  ".into()])),
            Err(Error::Validation(_))
        );
    }

    #[test]
    fn output_dir_falls_back_to_settings_then_input() {
        let settings = UserSettings {
            last_output_directory: Some("/last".into()),
            ..Default::default()
        };
        let plan = coordinator(settings)
            .plan(&BatchRequest::new(files(&["/in/a.mov"]), "mp4"))
            .unwrap();
        assert_eq!(outputs(&plan), files(&["/last/a.mp4"]));

        let plan = coordinator(UserSettings::default())
            .plan(&BatchRequest::new(files(&["/in/a.mov"]), "mp4"))
            .unwrap();
        assert_eq!(outputs(&plan), files(&["/in/a.mp4"]));
    }

    #[test]
    fn collisions_get_suffixes() {
        let request = BatchRequest::new(
            files(&["/x/clip.mov", "/y/clip.avi", "/z/clip.mkv"]),
            "mp4",
        )
        .output_directory("/out");
        let plan = coordinator(UserSettings::default()).plan(&request).unwrap();
        assert_eq!(
            outputs(&plan),
            files(&["/out/clip.mp4", "/out/clip-1.mp4", "/out/clip-2.mp4"])
        );

        let same = BatchRequest::new(files(&["/in/a.png"]), "png");
        let plan = coordinator(UserSettings::default()).plan(&same).unwrap();
        assert_eq!(outputs(&plan), files(&["/in/a-1.png"]));
    }

    #[test]
    fn outputs_never_land_on_other_inputs() {
        let request = BatchRequest::new(files(&["/in/a.png", "/in/a.jpg", "/in/a-1.gif"]), "png");
        let plan = coordinator(UserSettings::default()).plan(&request).unwrap();
        assert_eq!(
            outputs(&plan),
            files(&["/in/a-1.png", "/in/a-2.png", "/in/a-1-1.png"])
        );
    }

    #[test]
    fn settings_supply_defaults() {
        let settings = UserSettings {
            default_naming_mode: NamingMode::Custom,
            default_make_copies: false,
            ..Default::default()
        };
        let c = coordinator(settings);
        assert_matches!(
            c.plan(&BatchRequest::new(files(&["/in/a.mov"]), "mp4")),
            Err(Error::Validation(_))
        );

        let mut request = BatchRequest::new(files(&["/in/a.mov"]), "mp4");
        request.naming_mode = Some(NamingMode::Original);
        assert!(!c.plan(&request).unwrap().make_copies);
    }

    #[test]
    fn custom_extension_is_case_insensitive() {
        assert_eq!(custom_file_name("Clip.MP4", "mp4"), "Clip.MP4");
        assert_eq!(custom_file_name("clip.final", "mp4"), "clip.final.mp4");
        assert_eq!(custom_file_name(".mp4", "mp4"), ".mp4.mp4");
    }
}
