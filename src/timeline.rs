//! Realization state and timeline assembly.
//!
//! Each planned segment goes through `Planned -> Realizing -> Realized | Failed`
//! exactly once. The assembler turns the outcomes into the final ordered list
//! of files and renders the concat manifest ffmpeg consumes.

use crate::error::{Result, SpliceError};
use crate::planner::PlannedSegment;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// What to do with a segment whose realization failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackPolicy {
    /// Use the fallback file when one was realized, otherwise omit.
    #[default]
    Substitute,
    /// Always omit failed segments.
    Omit,
}

impl std::str::FromStr for FallbackPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "substitute" => Ok(FallbackPolicy::Substitute),
            "omit" => Ok(FallbackPolicy::Omit),
            _ => Err(format!("Unknown fallback policy: {}. Use substitute or omit.", s)),
        }
    }
}

/// How original-audio clips reach the output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClipMode {
    /// Cut each clip into its own file.
    #[default]
    Extract,
    /// Reference the source file with `inpoint`/`outpoint` directives.
    Trim,
}

impl std::str::FromStr for ClipMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "extract" => Ok(ClipMode::Extract),
            "trim" => Ok(ClipMode::Trim),
            _ => Err(format!("Unknown clip mode: {}. Use extract or trim.", s)),
        }
    }
}

/// A file on disk, optionally restricted to a time range of it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaRef {
    pub path: PathBuf,
    pub inpoint: Option<f64>,
    pub outpoint: Option<f64>,
}

impl MediaRef {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            inpoint: None,
            outpoint: None,
        }
    }

    pub fn trimmed(path: impl Into<PathBuf>, inpoint: f64, outpoint: f64) -> Self {
        Self {
            path: path.into(),
            inpoint: Some(inpoint),
            outpoint: Some(outpoint),
        }
    }
}

/// Lifecycle of one segment.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RealizationState {
    Planned,
    Realizing,
    Realized { media: MediaRef },
    Failed { error: String },
}

impl RealizationState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RealizationState::Realized { .. } | RealizationState::Failed { .. }
        )
    }
}

/// A planned segment and where it is in its lifecycle.
#[derive(Debug, Clone)]
pub struct Realization {
    planned: PlannedSegment,
    state: RealizationState,
}

impl Realization {
    pub fn new(planned: PlannedSegment) -> Self {
        Self {
            planned,
            state: RealizationState::Planned,
        }
    }

    pub fn planned(&self) -> &PlannedSegment {
        &self.planned
    }

    pub fn state(&self) -> &RealizationState {
        &self.state
    }

    pub fn begin(&mut self) -> Result<()> {
        match self.state {
            RealizationState::Planned => {
                self.state = RealizationState::Realizing;
                Ok(())
            }
            _ => Err(self.bad_transition("begin")),
        }
    }

    pub fn complete(&mut self, media: MediaRef) -> Result<()> {
        match self.state {
            RealizationState::Realizing => {
                self.state = RealizationState::Realized { media };
                Ok(())
            }
            _ => Err(self.bad_transition("complete")),
        }
    }

    pub fn fail(&mut self, error: impl Into<String>) -> Result<()> {
        match self.state {
            RealizationState::Realizing => {
                self.state = RealizationState::Failed {
                    error: error.into(),
                };
                Ok(())
            }
            _ => Err(self.bad_transition("fail")),
        }
    }

    /// Finish the lifecycle, attaching the fallback realized for a failure.
    pub fn into_outcome(self, fallback: Option<Fallback>) -> Result<RealizationOutcome> {
        if !self.state.is_terminal() {
            return Err(self.bad_transition("finish"));
        }
        Ok(RealizationOutcome {
            planned: self.planned,
            state: self.state,
            fallback,
        })
    }

    fn bad_transition(&self, action: &str) -> SpliceError {
        SpliceError::InvalidInput(format!(
            "cannot {} segment {} in state {:?}",
            action, self.planned.id, self.state
        ))
    }
}

/// Replacement media for a failed segment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fallback {
    pub media: MediaRef,
    /// Human-readable description, e.g. `silence 3.100s`.
    pub description: String,
}

/// Terminal state of one segment plus its fallback, if any.
#[derive(Debug, Clone, Serialize)]
pub struct RealizationOutcome {
    pub planned: PlannedSegment,
    pub state: RealizationState,
    pub fallback: Option<Fallback>,
}

/// One line of the final timeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineEntry {
    pub id: usize,
    pub group_number: usize,
    pub kind: &'static str,
    pub media: MediaRef,
    /// Whether this entry is a fallback rather than the planned content.
    pub substituted: bool,
}

/// A segment that did not make it into the timeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OmittedSegment {
    pub id: usize,
    pub group_number: usize,
    pub kind: &'static str,
    pub reason: String,
}

/// Ordered output of the assembler.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Timeline {
    pub entries: Vec<TimelineEntry>,
    pub omitted: Vec<OmittedSegment>,
}

impl Timeline {
    pub fn substituted_count(&self) -> usize {
        self.entries.iter().filter(|e| e.substituted).count()
    }

    pub fn manifest(&self) -> Manifest {
        Manifest {
            entries: self.entries.iter().map(|e| e.media.clone()).collect(),
        }
    }
}

/// Assembler settings.
#[derive(Debug, Clone)]
pub struct AssemblerConfig {
    pub fallback: FallbackPolicy,
    /// Files smaller than this are treated as not realized.
    pub min_file_bytes: u64,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            fallback: FallbackPolicy::Substitute,
            min_file_bytes: 1,
        }
    }
}

/// Check that `media` points at a usable file.
fn check_media(media: &MediaRef, min_bytes: u64) -> std::result::Result<(), String> {
    match std::fs::metadata(&media.path) {
        Ok(meta) if !meta.is_file() => Err(format!("{} is not a file", media.path.display())),
        Ok(meta) if meta.len() < min_bytes => Err(format!(
            "{} has {} bytes, expected at least {}",
            media.path.display(),
            meta.len(),
            min_bytes
        )),
        Ok(_) => Ok(()),
        Err(e) => Err(format!("{}: {}", media.path.display(), e)),
    }
}

fn absolute(media: &MediaRef) -> Result<MediaRef> {
    Ok(MediaRef {
        path: std::path::absolute(&media.path)?,
        ..media.clone()
    })
}

/// Build the timeline from outcomes, preserving their order.
///
/// Realized segments whose file is missing or too small count as failed.
/// Failed segments are replaced by their fallback under
/// [`FallbackPolicy::Substitute`] and omitted otherwise.
pub fn assemble(outcomes: Vec<RealizationOutcome>, config: &AssemblerConfig) -> Result<Timeline> {
    let mut timeline = Timeline::default();

    for outcome in outcomes {
        let id = outcome.planned.id;
        let group_number = outcome.planned.group_number;
        let kind = outcome.planned.segment.kind();

        let failure = match &outcome.state {
            RealizationState::Realized { media } => match check_media(media, config.min_file_bytes) {
                Ok(()) => {
                    timeline.entries.push(TimelineEntry {
                        id,
                        group_number,
                        kind,
                        media: absolute(media)?,
                        substituted: false,
                    });
                    continue;
                }
                Err(reason) => reason,
            },
            RealizationState::Failed { error } => error.clone(),
            other => {
                return Err(SpliceError::InvalidInput(format!(
                    "segment {} reached the assembler in state {:?}",
                    id, other
                )))
            }
        };

        let fallback = match (config.fallback, &outcome.fallback) {
            (FallbackPolicy::Substitute, Some(fallback)) => {
                match check_media(&fallback.media, config.min_file_bytes) {
                    Ok(()) => Some(fallback),
                    Err(reason) => {
                        warn!("Fallback for segment {} unusable: {}", id, reason);
                        None
                    }
                }
            }
            _ => None,
        };

        match fallback {
            Some(fallback) => {
                debug!(
                    "Segment {} (group {}, {}) replaced by {}",
                    id, group_number, kind, fallback.description
                );
                timeline.entries.push(TimelineEntry {
                    id,
                    group_number,
                    kind,
                    media: absolute(&fallback.media)?,
                    substituted: true,
                });
            }
            None => {
                warn!(
                    "Omitting segment {} (group {}, {}): {}",
                    id, group_number, kind, failure
                );
                timeline.omitted.push(OmittedSegment {
                    id,
                    group_number,
                    kind,
                    reason: failure,
                });
            }
        }
    }

    if timeline.entries.is_empty() {
        return Err(SpliceError::NoSegments);
    }
    Ok(timeline)
}

/// ffmpeg concat-demuxer script.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    pub entries: Vec<MediaRef>,
}

impl Manifest {
    pub fn render(&self) -> String {
        let mut out = String::from("ffconcat version 1.0\n");
        for entry in &self.entries {
            out.push_str(&format!("file '{}'\n", escape_path(&entry.path)));
            if let Some(inpoint) = entry.inpoint {
                out.push_str(&format!("inpoint {:.3}\n", inpoint));
            }
            if let Some(outpoint) = entry.outpoint {
                out.push_str(&format!("outpoint {:.3}\n", outpoint));
            }
        }
        out
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.render())?;
        Ok(())
    }
}

/// Quote-safe form of a path inside a single-quoted concat directive.
fn escape_path(path: &Path) -> String {
    path.to_string_lossy().replace('\'', "'\\''")
}
