//! Run orchestration for cuesplice.
//!
//! Loads cues, groups and plans them, realizes every planned segment one at a
//! time through a [`MediaBackend`], assembles the timeline and hands the
//! concat manifest to the backend.

use crate::config::Settings;
use crate::cues::{CueStore, LoadedCues};
use crate::error::{Result, SpliceError};
use crate::grouping::group_cues;
use crate::media::{FfmpegBackend, MediaBackend, ToneStyle};
use crate::planner::{self, DroppedGroup, Plan, PlannedSegment, Segment};
use crate::timeline::{
    assemble, ClipMode, Fallback, Manifest, MediaRef, OmittedSegment, Realization,
    RealizationOutcome, RealizationState, Timeline, TimelineEntry,
};
use indicatif::ProgressBar;
use serde::Serialize;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Length of the silence used when narration and its placeholder both fail.
const SPEECH_FALLBACK_SILENCE: f64 = 1.0;

/// File name of the concat manifest inside the work directory.
pub const MANIFEST_NAME: &str = "concat.txt";

/// Inputs for one run.
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// Video or audio file the clips are cut from.
    pub source: PathBuf,
    pub subtitles: PathBuf,
    pub output: PathBuf,
    /// Working directory for intermediate files; a timestamped directory
    /// under the configured work dir when `None`.
    pub work_dir: Option<PathBuf>,
}

/// Cues, groups and plan for a subtitle file, before any media work.
#[derive(Debug)]
pub struct Prepared {
    pub cues: LoadedCues,
    pub groups_total: usize,
    pub groups_selected: usize,
    pub plan: Plan,
}

/// A segment whose realization failed.
#[derive(Debug, Clone, Serialize)]
pub struct FailureRecord {
    pub id: usize,
    pub group_number: usize,
    pub kind: &'static str,
    pub error: String,
    /// Description of the fallback that was realized, if any.
    pub fallback: Option<String>,
}

/// A clip whose probed length differs from the planned one.
#[derive(Debug, Clone, Serialize)]
pub struct DurationMismatch {
    pub id: usize,
    pub group_number: usize,
    pub expected: f64,
    pub actual: f64,
}

/// Summary of a completed run.
#[derive(Debug, Serialize)]
pub struct RunReport {
    /// The spliced file, or one file per group when splitting.
    pub outputs: Vec<PathBuf>,
    pub manifest: PathBuf,
    pub work_dir: PathBuf,
    pub cues: usize,
    pub rejected_cues: usize,
    pub groups_total: usize,
    pub groups_selected: usize,
    pub dropped: Vec<DroppedGroup>,
    pub planned_segments: usize,
    pub timeline_entries: usize,
    /// Timeline entries that are fallbacks.
    pub substituted: usize,
    pub failures: Vec<FailureRecord>,
    pub omitted: Vec<OmittedSegment>,
    pub duration_mismatches: Vec<DurationMismatch>,
    /// Whether the run's intermediate files were removed.
    pub cleaned_up: bool,
    pub elapsed: Duration,
}

/// Realization results before assembly.
#[derive(Debug, Default)]
pub(crate) struct Realized {
    pub outcomes: Vec<RealizationOutcome>,
    pub mismatches: Vec<DurationMismatch>,
}

/// Deterministic file name for a planned segment.
pub fn segment_file_name(planned: &PlannedSegment, suffix: Option<&str>, ext: &str) -> String {
    match suffix {
        Some(suffix) => format!(
            "{:04}_g{:03}_{}_{}.{}",
            planned.id,
            planned.group_number,
            planned.segment.kind(),
            suffix,
            ext
        ),
        None => format!(
            "{:04}_g{:03}_{}.{}",
            planned.id,
            planned.group_number,
            planned.segment.kind(),
            ext
        ),
    }
}

/// Per-group output path in split mode: `movie.mp3` becomes `movie_g003.mp3`.
pub fn group_output_path(output: &Path, group_number: usize, default_ext: &str) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "cuesplice".to_string());
    let ext = output
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| default_ext.to_string());
    output.with_file_name(format!("{}_g{:03}.{}", stem, group_number, ext))
}

/// The main pipeline.
pub struct Pipeline {
    settings: Settings,
    backend: Arc<dyn MediaBackend>,
    progress: Option<ProgressBar>,
}

impl Pipeline {
    /// Create a pipeline backed by ffmpeg and the configured speech engine.
    pub fn new(settings: Settings) -> Result<Self> {
        settings.validate()?;
        let backend = Arc::new(FfmpegBackend::new(
            settings.ffmpeg_config(),
            settings.speech_config(),
        ));
        Ok(Self {
            settings,
            backend,
            progress: None,
        })
    }

    /// Create a pipeline with a custom media backend.
    pub fn with_backend(settings: Settings, backend: Arc<dyn MediaBackend>) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            settings,
            backend,
            progress: None,
        })
    }

    /// Report per-segment progress on `bar`.
    pub fn with_progress(mut self, bar: ProgressBar) -> Self {
        self.progress = Some(bar);
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Load, group, select and plan without touching any media.
    #[instrument(skip_all, fields(subtitles = %subtitles.display()))]
    pub fn prepare(&self, subtitles: &Path) -> Result<Prepared> {
        let cues = CueStore::load(subtitles)?;
        if cues.store.is_empty() {
            return Err(SpliceError::InvalidInput(format!(
                "no usable cues in {}",
                subtitles.display()
            )));
        }

        let groups = group_cues(cues.store.cues(), &self.settings.grouping_config())?;
        let groups_total = groups.len();
        let selected = self.settings.selection()?.apply(groups)?;
        let groups_selected = selected.len();
        info!(
            "{} cues -> {} groups, {} selected",
            cues.store.len(),
            groups_total,
            groups_selected
        );

        let plan = planner::plan(&selected, cues.store.cues(), &self.settings.planner_config())?;

        Ok(Prepared {
            cues,
            groups_total,
            groups_selected,
            plan,
        })
    }

    /// Run the pipeline, stopping with [`SpliceError::Cancelled`] on Ctrl-C.
    pub async fn run(&self, request: &RunRequest) -> Result<RunReport> {
        let ctrl_c = async {
            if tokio::signal::ctrl_c().await.is_err() {
                // No signal handler available: never cancel.
                std::future::pending::<()>().await;
            }
        };
        self.run_until(request, ctrl_c).await
    }

    /// Run the pipeline, stopping with [`SpliceError::Cancelled`] as soon as
    /// `cancel` completes during realization.
    ///
    /// A cancelled run leaves intermediate files in the work directory and
    /// never writes the manifest.
    #[instrument(skip(self, request, cancel), fields(source = %request.source.display()))]
    pub async fn run_until<F>(&self, request: &RunRequest, cancel: F) -> Result<RunReport>
    where
        F: Future<Output = ()>,
    {
        let started = Instant::now();

        if !request.source.is_file() {
            return Err(SpliceError::InvalidInput(format!(
                "source file {} does not exist",
                request.source.display()
            )));
        }

        let prepared = self.prepare(&request.subtitles)?;
        if prepared.plan.clip_count() == 0 {
            return Err(SpliceError::NoSegments);
        }

        let work_dir = match &request.work_dir {
            Some(dir) => dir.clone(),
            None => self.settings.work_dir().join(format!(
                "run_{}",
                chrono::Local::now().format("%Y%m%d_%H%M%S")
            )),
        };
        let created_work_dir = !work_dir.exists();
        std::fs::create_dir_all(&work_dir)?;
        info!("Working directory: {}", work_dir.display());

        let realized = tokio::select! {
            result = self.realize_all(&prepared.plan, &request.source, &work_dir) => result?,
            _ = cancel => {
                warn!("Cancelled; intermediate files left in {}", work_dir.display());
                if let Some(bar) = &self.progress {
                    bar.abandon_with_message("cancelled");
                }
                return Err(SpliceError::Cancelled);
            }
        };

        let failures = failure_records(&realized.outcomes);
        let timeline = assemble(realized.outcomes, &self.settings.assembler_config())?;
        let manifest_path = work_dir.join(MANIFEST_NAME);
        timeline.manifest().write_to(&manifest_path)?;
        debug!("Manifest written to {}", manifest_path.display());

        let mut manifests = vec![manifest_path.clone()];
        let outputs = if self.settings.general.split {
            self.write_groups(&timeline, &request.output, &work_dir, &mut manifests)
                .await?
        } else {
            let output = self
                .backend
                .concatenate(&manifest_path, &request.output)
                .await?;
            info!("Wrote {}", output.display());
            vec![output]
        };

        let cleaned_up = self.settings.general.cleanup;
        if cleaned_up {
            clean_up(
                &prepared.plan,
                &work_dir,
                created_work_dir,
                &manifests,
                &outputs,
                self.backend.file_extension(),
            );
        }

        Ok(self.report(
            prepared,
            timeline,
            failures,
            realized.mismatches,
            outputs,
            manifest_path,
            work_dir,
            cleaned_up,
            started.elapsed(),
        ))
    }

    #[allow(clippy::too_many_arguments)]
    fn report(
        &self,
        prepared: Prepared,
        timeline: Timeline,
        failures: Vec<FailureRecord>,
        duration_mismatches: Vec<DurationMismatch>,
        outputs: Vec<PathBuf>,
        manifest: PathBuf,
        work_dir: PathBuf,
        cleaned_up: bool,
        elapsed: Duration,
    ) -> RunReport {
        RunReport {
            outputs,
            manifest,
            work_dir,
            cues: prepared.cues.store.len(),
            rejected_cues: prepared.cues.rejected.len(),
            groups_total: prepared.groups_total,
            groups_selected: prepared.groups_selected,
            dropped: prepared.plan.dropped,
            planned_segments: prepared.plan.segments.len(),
            timeline_entries: timeline.entries.len(),
            substituted: timeline.substituted_count(),
            failures,
            omitted: timeline.omitted,
            duration_mismatches,
            cleaned_up,
            elapsed,
        }
    }

    /// Splice each group's timeline entries into its own file next to
    /// `output`, recording the per-group manifests in `manifests`.
    async fn write_groups(
        &self,
        timeline: &Timeline,
        output: &Path,
        work_dir: &Path,
        manifests: &mut Vec<PathBuf>,
    ) -> Result<Vec<PathBuf>> {
        let mut outputs = Vec::new();
        for entries in timeline
            .entries
            .chunk_by(|a, b| a.group_number == b.group_number)
        {
            let group_number = entries[0].group_number;
            let manifest = Manifest {
                entries: entries.iter().map(|e: &TimelineEntry| e.media.clone()).collect(),
            };
            let manifest_path = work_dir.join(format!("concat_g{:03}.txt", group_number));
            manifest.write_to(&manifest_path)?;
            manifests.push(manifest_path.clone());

            let dest = group_output_path(output, group_number, self.backend.file_extension());
            let written = self.backend.concatenate(&manifest_path, &dest).await?;
            info!("Wrote group {} to {}", group_number, written.display());
            outputs.push(written);
        }
        Ok(outputs)
    }

    /// Realize every planned segment in order, one at a time.
    pub(crate) async fn realize_all(
        &self,
        plan: &Plan,
        source: &Path,
        work_dir: &Path,
    ) -> Result<Realized> {
        let mut realized = Realized::default();
        if let Some(bar) = &self.progress {
            bar.set_length(plan.segments.len() as u64);
        }

        for planned in &plan.segments {
            if let Some(bar) = &self.progress {
                bar.set_message(format!(
                    "group {} {}",
                    planned.group_number,
                    planned.segment.kind()
                ));
            }

            let outcome = self
                .realize_segment(planned, source, work_dir, &mut realized.mismatches)
                .await?;
            realized.outcomes.push(outcome);

            if let Some(bar) = &self.progress {
                bar.inc(1);
            }
        }

        if let Some(bar) = &self.progress {
            bar.finish_and_clear();
        }
        Ok(realized)
    }

    async fn realize_segment(
        &self,
        planned: &PlannedSegment,
        source: &Path,
        work_dir: &Path,
        mismatches: &mut Vec<DurationMismatch>,
    ) -> Result<RealizationOutcome> {
        let mut realization = Realization::new(planned.clone());
        realization.begin()?;

        let attempts = self.settings.media.retries + 1;
        let mut last_error = None;
        for attempt in 1..=attempts {
            match self.produce(planned, source, work_dir).await {
                Ok(media) => {
                    if let Some(mismatch) = self.check_duration(planned, &media).await {
                        mismatches.push(mismatch);
                    }
                    realization.complete(media)?;
                    last_error = None;
                    break;
                }
                Err(e) if e.is_segment_failure() => {
                    warn!(
                        "Segment {} (group {}, {}) failed, attempt {}/{}: {}",
                        planned.id,
                        planned.group_number,
                        planned.segment.kind(),
                        attempt,
                        attempts,
                        e
                    );
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        let fallback = match last_error {
            Some(error) => {
                realization.fail(error.to_string())?;
                self.fallback_for(planned, work_dir).await
            }
            None => None,
        };

        realization.into_outcome(fallback)
    }

    /// Produce the media for one segment.
    async fn produce(
        &self,
        planned: &PlannedSegment,
        source: &Path,
        work_dir: &Path,
    ) -> Result<MediaRef> {
        let dest = work_dir.join(segment_file_name(
            planned,
            None,
            self.backend.file_extension(),
        ));

        let path = match &planned.segment {
            Segment::OriginalAudioClip {
                start_sec, end_sec, ..
            } => {
                if self.settings.media.clip_mode == ClipMode::Trim {
                    return Ok(MediaRef::trimmed(source, *start_sec, *end_sec));
                }
                self.backend
                    .extract_clip(source, *start_sec, *end_sec, &dest)
                    .await?
            }
            Segment::ToneClip {
                style,
                duration,
                frequency,
            } => {
                self.backend
                    .synthesize_tone(*style, *duration, *frequency, &dest)
                    .await?
            }
            Segment::SilenceClip { duration } => {
                self.backend
                    .synthesize_tone(ToneStyle::Silence, *duration, 0.0, &dest)
                    .await?
            }
            Segment::SpeechClip { text, voice } => {
                self.backend.synthesize_speech(text, voice, &dest).await?
            }
        };

        Ok(MediaRef::file(path))
    }

    /// Probe extracted clips and report lengths outside the tolerance.
    async fn check_duration(
        &self,
        planned: &PlannedSegment,
        media: &MediaRef,
    ) -> Option<DurationMismatch> {
        if !matches!(planned.segment, Segment::OriginalAudioClip { .. }) || media.inpoint.is_some()
        {
            return None;
        }
        let expected = planned.segment.expected_duration()?;

        match self.backend.probe_duration(&media.path).await {
            Ok(actual) if (actual - expected).abs() > self.settings.media.duration_tolerance_seconds => {
                warn!(
                    "Segment {} (group {}): expected {:.3}s, got {:.3}s",
                    planned.id, planned.group_number, expected, actual
                );
                Some(DurationMismatch {
                    id: planned.id,
                    group_number: planned.group_number,
                    expected,
                    actual,
                })
            }
            Ok(_) => None,
            Err(e) => {
                warn!("Could not probe segment {}: {}", planned.id, e);
                None
            }
        }
    }

    /// Realize replacement media for a failed segment.
    ///
    /// Clips become silence of the same length; narration becomes the
    /// placeholder text, then silence. Tones and silences get no fallback.
    async fn fallback_for(&self, planned: &PlannedSegment, work_dir: &Path) -> Option<Fallback> {
        let ext = self.backend.file_extension().to_string();
        let silence = |duration: f64| {
            let dest = work_dir.join(segment_file_name(planned, Some("fallback"), &ext));
            async move {
                self.backend
                    .synthesize_tone(ToneStyle::Silence, duration, 0.0, &dest)
                    .await
                    .map(|path| Fallback {
                        media: MediaRef::file(path),
                        description: format!("silence {:.3}s", duration),
                    })
            }
        };

        let result = match &planned.segment {
            // Audio-only silence cannot be spliced between video clips.
            Segment::OriginalAudioClip { .. } if self.settings.video.enabled => return None,
            Segment::OriginalAudioClip {
                start_sec, end_sec, ..
            } => silence(end_sec - start_sec).await,
            Segment::SpeechClip { voice, .. } => {
                let text = self.settings.speech.placeholder_for(planned.group_number);
                let dest = work_dir.join(segment_file_name(planned, Some("placeholder"), &ext));
                match self.backend.synthesize_speech(&text, voice, &dest).await {
                    Ok(path) => Ok(Fallback {
                        media: MediaRef::file(path),
                        description: format!("placeholder \"{}\"", text),
                    }),
                    Err(e) => {
                        warn!("Placeholder speech for group {} failed: {}", planned.group_number, e);
                        silence(SPEECH_FALLBACK_SILENCE).await
                    }
                }
            }
            Segment::ToneClip { .. } | Segment::SilenceClip { .. } => return None,
        };

        match result {
            Ok(fallback) => {
                info!(
                    "Segment {} (group {}) falls back to {}",
                    planned.id, planned.group_number, fallback.description
                );
                Some(fallback)
            }
            Err(e) => {
                warn!("Fallback for segment {} failed: {}", planned.id, e);
                None
            }
        }
    }
}

/// Remove the files this run wrote into `work_dir`.
///
/// Only deterministic segment names and the run's manifests are touched;
/// outputs and unrelated files stay. The directory goes only when this run
/// created it and it ends up empty.
fn clean_up(
    plan: &Plan,
    work_dir: &Path,
    created_work_dir: bool,
    manifests: &[PathBuf],
    outputs: &[PathBuf],
    ext: &str,
) {
    let keep: Vec<PathBuf> = outputs
        .iter()
        .filter_map(|p| std::path::absolute(p).ok())
        .collect();
    let segment_files = plan.segments.iter().flat_map(move |planned| {
        [None, Some("fallback"), Some("placeholder")]
            .into_iter()
            .map(move |suffix| work_dir.join(segment_file_name(planned, suffix, ext)))
    });

    let mut removed = 0;
    for path in segment_files.chain(manifests.iter().cloned()) {
        if !path.exists() {
            continue;
        }
        let is_output = std::path::absolute(&path)
            .map(|abs| keep.contains(&abs))
            .unwrap_or(true);
        if is_output {
            continue;
        }
        match std::fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
        }
    }
    debug!("Removed {} intermediate files from {}", removed, work_dir.display());

    if created_work_dir {
        if let Err(e) = std::fs::remove_dir(work_dir) {
            debug!("Keeping {}: {}", work_dir.display(), e);
        }
    }
}

fn failure_records(outcomes: &[RealizationOutcome]) -> Vec<FailureRecord> {
    outcomes
        .iter()
        .filter_map(|outcome| match &outcome.state {
            RealizationState::Failed { error } => Some(FailureRecord {
                id: outcome.planned.id,
                group_number: outcome.planned.group_number,
                kind: outcome.planned.segment.kind(),
                error: error.clone(),
                fallback: outcome.fallback.as_ref().map(|f| f.description.clone()),
            }),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::VoiceParams;
    use crate::planner::Layout;
    use crate::timeline::FallbackPolicy;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Backend that writes each "media" file as its duration in text and
    /// concatenates by copying the manifest.
    #[derive(Default)]
    struct FakeBackend {
        fail_kinds: HashSet<&'static str>,
        fail_placeholder: bool,
        /// Added to every extracted clip's real length.
        clip_skew: f64,
        /// Delay per extraction, to exercise cancellation.
        extract_delay: Option<Duration>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeBackend {
        fn failing(kinds: &[&'static str]) -> Self {
            Self {
                fail_kinds: kinds.iter().copied().collect(),
                ..Self::default()
            }
        }

        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }

        fn write(dest: &Path, seconds: f64) -> Result<PathBuf> {
            std::fs::write(dest, format!("{:.3}", seconds))?;
            Ok(dest.to_path_buf())
        }
    }

    #[async_trait]
    impl MediaBackend for FakeBackend {
        async fn extract_clip(
            &self,
            _source: &Path,
            start_sec: f64,
            end_sec: f64,
            dest: &Path,
        ) -> Result<PathBuf> {
            self.record(format!("extract {:.3}-{:.3}", start_sec, end_sec));
            if let Some(delay) = self.extract_delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail_kinds.contains("clip") {
                return Err(SpliceError::Extraction("decoder error".into()));
            }
            Self::write(dest, end_sec - start_sec + self.clip_skew)
        }

        async fn synthesize_tone(
            &self,
            style: ToneStyle,
            duration_sec: f64,
            _frequency_hz: f64,
            dest: &Path,
        ) -> Result<PathBuf> {
            self.record(format!("tone {} {:.3}", style, duration_sec));
            let kind = if style == ToneStyle::Silence { "silence" } else { "tone" };
            if self.fail_kinds.contains(kind) {
                return Err(SpliceError::Synthesis("lavfi unavailable".into()));
            }
            Self::write(dest, duration_sec)
        }

        async fn synthesize_speech(
            &self,
            text: &str,
            _voice: &VoiceParams,
            dest: &Path,
        ) -> Result<PathBuf> {
            self.record(format!("speech {}", text));
            let placeholder = text.starts_with("Dialogue group");
            if (placeholder && self.fail_placeholder)
                || (!placeholder && self.fail_kinds.contains("speech"))
            {
                return Err(SpliceError::Synthesis("engine offline".into()));
            }
            Self::write(dest, 1.0)
        }

        async fn probe_duration(&self, path: &Path) -> Result<f64> {
            let text = std::fs::read_to_string(path)?;
            text.parse()
                .map_err(|_| SpliceError::Probe(format!("bad fake media {}", path.display())))
        }

        async fn concatenate(&self, manifest: &Path, dest: &Path) -> Result<PathBuf> {
            self.record("concat".into());
            if self.fail_kinds.contains("concat") {
                return Err(SpliceError::Concatenation("muxer error".into()));
            }
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(manifest, dest)?;
            Ok(dest.to_path_buf())
        }
    }

    const SRT: &str = "1\n00:00:01,000 --> 00:00:02,000\nHello\n\n\
                       2\n00:00:02,500 --> 00:00:03,000\nthere\n\n\
                       3\n00:00:10,000 --> 00:00:11,000\nBye\n";

    struct Fixture {
        dir: tempfile::TempDir,
        request: RunRequest,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("movie.mp4");
        std::fs::write(&source, b"video").unwrap();
        let subtitles = dir.path().join("movie.srt");
        std::fs::write(&subtitles, SRT).unwrap();
        let request = RunRequest {
            source,
            subtitles,
            output: dir.path().join("out").join("result.mp3"),
            work_dir: Some(dir.path().join("work")),
        };
        Fixture { dir, request }
    }

    fn settings(layout: Layout) -> Settings {
        let mut settings = Settings::default();
        settings.planner.layout = layout;
        settings
    }

    fn build(settings: Settings, backend: FakeBackend) -> (Pipeline, Arc<FakeBackend>) {
        let backend = Arc::new(backend);
        let pipeline = Pipeline::with_backend(settings, backend.clone()).unwrap();
        (pipeline, backend)
    }

    fn manifest_files(report: &RunReport) -> Vec<String> {
        std::fs::read_to_string(&report.manifest)
            .unwrap()
            .lines()
            .filter_map(|l| l.strip_prefix("file '"))
            .map(|l| {
                let path = l.trim_end_matches('\'');
                Path::new(path).file_name().unwrap().to_string_lossy().into_owned()
            })
            .collect()
    }

    #[tokio::test]
    async fn test_run_with_tones() {
        let fx = fixture();
        let (pipeline, backend) = build(settings(Layout::ToneBetweenGroups), FakeBackend::default());

        let report = pipeline.run_until(&fx.request, std::future::pending()).await.unwrap();

        assert_eq!(report.cues, 3);
        assert_eq!(report.groups_total, 2);
        assert_eq!(report.planned_segments, 3);
        assert_eq!(report.timeline_entries, 3);
        assert!(report.failures.is_empty());
        assert_eq!(
            manifest_files(&report),
            vec![
                "0000_g001_clip.mp3",
                "0001_g001_tone.mp3",
                "0002_g002_clip.mp3"
            ]
        );
        assert_eq!(report.outputs, vec![fx.request.output.clone()]);
        assert!(report.outputs[0].exists());
        assert!(!report.cleaned_up);

        let calls = backend.calls.lock().unwrap().clone();
        assert_eq!(calls[0], "extract 0.900-4.000");
        assert_eq!(calls.last().unwrap(), "concat");
    }

    #[tokio::test]
    async fn test_failed_clip_becomes_silence() {
        let fx = fixture();
        let (pipeline, _) = build(settings(Layout::None), FakeBackend::failing(&["clip"]));

        let report = pipeline.run_until(&fx.request, std::future::pending()).await.unwrap();

        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.failures[0].fallback.as_deref(), Some("silence 3.100s"));
        assert_eq!(
            manifest_files(&report),
            vec!["0000_g001_clip_fallback.mp3", "0001_g002_clip_fallback.mp3"]
        );
    }

    #[tokio::test]
    async fn test_failed_speech_uses_placeholder_then_silence() {
        let fx = fixture();
        let (pipeline, backend) = build(
            settings(Layout::SpeechThenClip),
            FakeBackend::failing(&["speech"]),
        );
        let report = pipeline.run_until(&fx.request, std::future::pending()).await.unwrap();
        assert_eq!(
            report.failures[0].fallback.as_deref(),
            Some("placeholder \"Dialogue group 1\"")
        );
        assert!(backend
            .calls
            .lock()
            .unwrap()
            .contains(&"speech Dialogue group 2".to_string()));

        let fx = fixture();
        let (pipeline, _) = build(
            settings(Layout::SpeechThenClip),
            FakeBackend {
                fail_placeholder: true,
                ..FakeBackend::failing(&["speech"])
            },
        );
        let report = pipeline.run_until(&fx.request, std::future::pending()).await.unwrap();
        assert_eq!(report.failures[0].fallback.as_deref(), Some("silence 1.000s"));
        assert_eq!(report.timeline_entries, 4);
    }

    #[tokio::test]
    async fn test_failed_tone_is_omitted() {
        let fx = fixture();
        let (pipeline, _) = build(settings(Layout::ToneBetweenGroups), FakeBackend::failing(&["tone"]));

        let report = pipeline.run_until(&fx.request, std::future::pending()).await.unwrap();

        assert_eq!(report.timeline_entries, 2);
        assert_eq!(report.omitted.len(), 1);
        assert_eq!(report.omitted[0].kind, "tone");
    }

    #[tokio::test]
    async fn test_omit_policy_with_all_clips_failing_is_no_segments() {
        let fx = fixture();
        let mut settings = settings(Layout::None);
        settings.fallback.policy = FallbackPolicy::Omit;
        let (pipeline, _) = build(settings, FakeBackend::failing(&["clip"]));

        let result = pipeline.run_until(&fx.request, std::future::pending()).await;
        assert!(matches!(result, Err(SpliceError::NoSegments)));
    }

    #[tokio::test]
    async fn test_retries_before_failing() {
        let fx = fixture();
        let mut settings = settings(Layout::None);
        settings.media.retries = 2;
        let (pipeline, backend) = build(settings, FakeBackend::failing(&["clip"]));

        pipeline.run_until(&fx.request, std::future::pending()).await.unwrap();

        let extracts = backend
            .calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with("extract"))
            .count();
        assert_eq!(extracts, 6);
    }

    #[tokio::test]
    async fn test_duration_mismatch_is_reported() {
        let fx = fixture();
        let (pipeline, _) = build(
            settings(Layout::None),
            FakeBackend {
                clip_skew: 0.5,
                ..FakeBackend::default()
            },
        );
        let report = pipeline.run_until(&fx.request, std::future::pending()).await.unwrap();
        assert_eq!(report.duration_mismatches.len(), 2);
        assert!((report.duration_mismatches[0].actual - 3.6).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_trim_mode_references_source() {
        let fx = fixture();
        let mut settings = settings(Layout::None);
        settings.media.clip_mode = ClipMode::Trim;
        let (pipeline, backend) = build(settings, FakeBackend::default());

        let report = pipeline.run_until(&fx.request, std::future::pending()).await.unwrap();

        let manifest = std::fs::read_to_string(&report.manifest).unwrap();
        assert!(manifest.contains("movie.mp4'\ninpoint 0.900\noutpoint 4.000\n"));
        assert!(!backend.calls.lock().unwrap().iter().any(|c| c.starts_with("extract")));
    }

    #[tokio::test]
    async fn test_cancel_leaves_no_manifest() {
        let fx = fixture();
        let (pipeline, _) = build(
            settings(Layout::None),
            FakeBackend {
                extract_delay: Some(Duration::from_secs(30)),
                ..FakeBackend::default()
            },
        );

        let result = pipeline
            .run_until(&fx.request, tokio::time::sleep(Duration::from_millis(20)))
            .await;

        assert!(matches!(result, Err(SpliceError::Cancelled)));
        assert!(!fx.dir.path().join("work").join(MANIFEST_NAME).exists());
        assert!(fx.dir.path().join("work").exists());
    }

    #[tokio::test]
    async fn test_concat_failure_ends_run() {
        let fx = fixture();
        let (pipeline, _) = build(settings(Layout::None), FakeBackend::failing(&["concat"]));
        let result = pipeline.run_until(&fx.request, std::future::pending()).await;
        assert!(matches!(result, Err(SpliceError::Concatenation(_))));
    }

    #[tokio::test]
    async fn test_missing_source_is_invalid_input() {
        let mut fx = fixture();
        fx.request.source = fx.dir.path().join("nope.mp4");
        let (pipeline, _) = build(settings(Layout::None), FakeBackend::default());
        let result = pipeline.run_until(&fx.request, std::future::pending()).await;
        assert!(matches!(result, Err(SpliceError::InvalidInput(_))));
    }

    #[test]
    fn test_prepare_selection() {
        let fx = fixture();
        let mut settings = settings(Layout::None);
        settings.grouping.selection = "range:2-2".into();
        let (pipeline, _) = build(settings, FakeBackend::default());

        let prepared = pipeline.prepare(&fx.request.subtitles).unwrap();
        assert_eq!(prepared.groups_total, 2);
        assert_eq!(prepared.groups_selected, 1);
        assert_eq!(prepared.plan.segments[0].group_number, 2);
    }

    #[tokio::test]
    async fn test_cleanup_keeps_unrelated_files_and_output() {
        let mut fx = fixture();
        let work = fx.dir.path().join("work");
        std::fs::create_dir_all(&work).unwrap();
        let notes = work.join("notes.txt");
        std::fs::write(&notes, "keep me").unwrap();
        fx.request.output = work.join("result.mp3");

        let mut settings = settings(Layout::ToneBetweenGroups);
        settings.general.cleanup = true;
        let (pipeline, _) = build(settings, FakeBackend::default());
        let report = pipeline.run_until(&fx.request, std::future::pending()).await.unwrap();

        assert!(report.cleaned_up);
        assert_eq!(std::fs::read_to_string(&notes).unwrap(), "keep me");
        assert!(fx.request.output.exists());
        assert!(!work.join("0000_g001_clip.mp3").exists());
        assert!(!work.join("0001_g001_tone.mp3").exists());
        assert!(!work.join(MANIFEST_NAME).exists());
    }

    #[tokio::test]
    async fn test_cleanup_removes_work_dir_it_created() {
        let mut fx = fixture();
        let work = fx.dir.path().join("fresh").join("work");
        fx.request.work_dir = Some(work.clone());

        let mut settings = settings(Layout::None);
        settings.general.cleanup = true;
        let (pipeline, _) = build(settings, FakeBackend::failing(&["clip"]));
        let report = pipeline.run_until(&fx.request, std::future::pending()).await.unwrap();

        assert_eq!(report.failures.len(), 2);
        assert!(!work.exists());
        assert!(fx.request.output.exists());
    }

    #[tokio::test]
    async fn test_split_writes_one_file_per_group() {
        let fx = fixture();
        let mut settings = settings(Layout::ToneBetweenGroups);
        settings.general.split = true;
        let (pipeline, backend) = build(settings, FakeBackend::default());

        let report = pipeline.run_until(&fx.request, std::future::pending()).await.unwrap();

        let out = fx.dir.path().join("out");
        assert_eq!(
            report.outputs,
            vec![out.join("result_g001.mp3"), out.join("result_g002.mp3")]
        );
        let first = std::fs::read_to_string(&report.outputs[0]).unwrap();
        assert!(first.contains("0000_g001_clip.mp3"));
        assert!(first.contains("0001_g001_tone.mp3"));
        assert!(!first.contains("g002"));
        let second = std::fs::read_to_string(&report.outputs[1]).unwrap();
        assert!(second.contains("0002_g002_clip.mp3"));
        assert!(!fx.request.output.exists());

        let concats = backend
            .calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| *c == "concat")
            .count();
        assert_eq!(concats, 2);
        assert_eq!(manifest_files(&report).len(), 3);
    }

    #[tokio::test]
    async fn test_video_mode_omits_failed_clips() {
        let fx = fixture();
        let mut settings = settings(Layout::None);
        settings.video.enabled = true;
        let (pipeline, backend) = build(settings, FakeBackend::failing(&["clip"]));

        let result = pipeline.run_until(&fx.request, std::future::pending()).await;

        assert!(matches!(result, Err(SpliceError::NoSegments)));
        assert!(!backend.calls.lock().unwrap().iter().any(|c| c.starts_with("tone")));
    }

    #[test]
    fn test_group_output_path() {
        assert_eq!(
            group_output_path(Path::new("/tmp/movie.mp3"), 3, "wav"),
            PathBuf::from("/tmp/movie_g003.mp3")
        );
        assert_eq!(
            group_output_path(Path::new("dialogue"), 12, "m4a"),
            PathBuf::from("dialogue_g012.m4a")
        );
    }

    #[test]
    fn test_segment_file_name() {
        let planned = PlannedSegment {
            id: 12,
            group_number: 3,
            segment: Segment::SilenceClip { duration: 1.0 },
        };
        assert_eq!(segment_file_name(&planned, None, "mp3"), "0012_g003_silence.mp3");
        assert_eq!(
            segment_file_name(&planned, Some("fallback"), "wav"),
            "0012_g003_silence_fallback.wav"
        );
    }
}
