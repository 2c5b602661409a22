//! Segment planning: extraction windows and auxiliary segments per group.
//!
//! The planner turns selected groups into a flat, ordered list of segments in
//! playback order. The layout decides where tones, silences and narration go
//! relative to each group's original-audio clip.

use crate::cues::Cue;
use crate::error::{Result, SpliceError};
use crate::grouping::Group;
use crate::media::{ToneStyle, VoiceParams};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Placement of auxiliary segments around each group's clip.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layout {
    /// Clips only.
    None,
    /// A tone between consecutive groups.
    #[default]
    ToneBetweenGroups,
    /// Narration of the group's text, then the clip.
    SpeechThenClip,
    /// The clip, its narration, then a tone before the next group.
    ClipThenSpeechThenTone,
}

impl Layout {
    pub fn uses_speech(&self) -> bool {
        matches!(self, Layout::SpeechThenClip | Layout::ClipThenSpeechThenTone)
    }

    pub fn uses_tone(&self) -> bool {
        matches!(self, Layout::ToneBetweenGroups | Layout::ClipThenSpeechThenTone)
    }
}

impl std::str::FromStr for Layout {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "none" => Ok(Layout::None),
            "tone_between_groups" | "tones" => Ok(Layout::ToneBetweenGroups),
            "speech_then_clip" => Ok(Layout::SpeechThenClip),
            "clip_then_speech_then_tone" => Ok(Layout::ClipThenSpeechThenTone),
            _ => Err(format!(
                "Unknown layout: {}. Use none, tone_between_groups, speech_then_clip or clip_then_speech_then_tone.",
                s
            )),
        }
    }
}

impl std::fmt::Display for Layout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Layout::None => write!(f, "none"),
            Layout::ToneBetweenGroups => write!(f, "tone_between_groups"),
            Layout::SpeechThenClip => write!(f, "speech_then_clip"),
            Layout::ClipThenSpeechThenTone => write!(f, "clip_then_speech_then_tone"),
        }
    }
}

/// Separator tone parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToneSpec {
    pub style: ToneStyle,
    /// Duration in seconds.
    pub duration: f64,
    /// Frequency in Hz (ignored by styles without a pitch).
    pub frequency: f64,
}

impl Default for ToneSpec {
    fn default() -> Self {
        Self {
            style: ToneStyle::Beep,
            duration: 0.3,
            frequency: 800.0,
        }
    }
}

/// Configuration for the planner.
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    /// Seconds taken off the first cue's start, clamped at zero.
    pub lead_margin: f64,
    /// Seconds added after the last cue's end.
    pub trail_margin: f64,
    pub layout: Layout,
    pub tone: ToneSpec,
    /// Silence between a clip and its narration; zero disables it.
    pub speech_gap: f64,
    pub voice: VoiceParams,
    /// Fold line breaks and repeated spaces inside each cue's text.
    pub collapse_whitespace: bool,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            lead_margin: 0.1,
            trail_margin: 1.0,
            layout: Layout::default(),
            tone: ToneSpec::default(),
            speech_gap: 0.0,
            voice: VoiceParams::default(),
            collapse_whitespace: true,
        }
    }
}

impl PlannerConfig {
    fn validate(&self) -> Result<()> {
        let non_negative = [
            ("lead_margin", self.lead_margin),
            ("trail_margin", self.trail_margin),
            ("speech_gap", self.speech_gap),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(SpliceError::Config(format!(
                    "{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }
        if self.layout.uses_tone() && !(self.tone.duration > 0.0 && self.tone.duration.is_finite()) {
            return Err(SpliceError::Config(format!(
                "tone duration must be positive, got {}",
                self.tone.duration
            )));
        }
        Ok(())
    }
}

/// A planned unit of the output timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Segment {
    OriginalAudioClip {
        group: Group,
        start_sec: f64,
        end_sec: f64,
    },
    ToneClip {
        style: ToneStyle,
        duration: f64,
        frequency: f64,
    },
    SilenceClip {
        duration: f64,
    },
    SpeechClip {
        text: String,
        voice: VoiceParams,
    },
}

impl Segment {
    /// Short label used in file names and reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Segment::OriginalAudioClip { .. } => "clip",
            Segment::ToneClip { .. } => "tone",
            Segment::SilenceClip { .. } => "silence",
            Segment::SpeechClip { .. } => "speech",
        }
    }

    /// Duration known before realization; speech has none.
    pub fn expected_duration(&self) -> Option<f64> {
        match self {
            Segment::OriginalAudioClip {
                start_sec, end_sec, ..
            } => Some(end_sec - start_sec),
            Segment::ToneClip { duration, .. } | Segment::SilenceClip { duration } => {
                Some(*duration)
            }
            Segment::SpeechClip { .. } => None,
        }
    }
}

/// A segment with its position in the plan and the group it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedSegment {
    /// 0-based position in playback order.
    pub id: usize,
    /// 1-based number of the group this segment belongs to.
    pub group_number: usize,
    pub segment: Segment,
}

/// A group that produced no segments.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DroppedGroup {
    pub group_number: usize,
    pub start_sec: f64,
    pub end_sec: f64,
    pub reason: String,
}

/// Planner output.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Plan {
    pub segments: Vec<PlannedSegment>,
    pub dropped: Vec<DroppedGroup>,
}

impl Plan {
    /// Number of original-audio clips in the plan.
    pub fn clip_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s.segment, Segment::OriginalAudioClip { .. }))
            .count()
    }
}

/// Extraction window for a group after margins.
///
/// Fails with `InvalidSegment` when the window has no positive length.
pub fn clip_window(group: &Group, cues: &[Cue], config: &PlannerConfig) -> Result<(f64, f64)> {
    let (first_start, last_end) = group.span(cues);
    let start = (first_start - config.lead_margin).max(0.0);
    let end = last_end + config.trail_margin;

    if end <= start {
        return Err(SpliceError::InvalidSegment(format!(
            "window {:.3}s - {:.3}s has no positive duration",
            start, end
        )));
    }
    Ok((start, end))
}

/// Narration text for a group: cue texts joined by single spaces.
pub fn speech_text(group: &Group, cues: &[Cue], collapse_whitespace: bool) -> String {
    group
        .cues(cues)
        .map(|cue| {
            if collapse_whitespace {
                cue.text.split_whitespace().collect::<Vec<_>>().join(" ")
            } else {
                cue.text.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Plan segments for the selected groups, in ascending group order.
///
/// `groups` pairs each group with its 1-based number. Groups whose window
/// is empty after margins are dropped and reported, along with their
/// auxiliary segments.
pub fn plan(groups: &[(usize, Group)], cues: &[Cue], config: &PlannerConfig) -> Result<Plan> {
    config.validate()?;

    let mut dropped = Vec::new();
    let mut windows = Vec::with_capacity(groups.len());

    for (number, group) in groups {
        match clip_window(group, cues, config) {
            Ok((start, end)) => windows.push((*number, group, start, end)),
            Err(e) => {
                let (first_start, last_end) = group.span(cues);
                warn!("Dropping group {}: {}", number, e);
                dropped.push(DroppedGroup {
                    group_number: *number,
                    start_sec: (first_start - config.lead_margin).max(0.0),
                    end_sec: last_end + config.trail_margin,
                    reason: e.to_string(),
                });
            }
        }
    }

    let mut segments: Vec<PlannedSegment> = Vec::new();
    let mut push = |group_number: usize, segment: Segment| {
        let id = segments.len();
        segments.push(PlannedSegment {
            id,
            group_number,
            segment,
        });
    };

    let last = windows.len().saturating_sub(1);
    for (pos, (number, group, start, end)) in windows.into_iter().enumerate() {
        let clip = Segment::OriginalAudioClip {
            group: group.clone(),
            start_sec: start,
            end_sec: end,
        };
        let speech = || Segment::SpeechClip {
            text: speech_text(group, cues, config.collapse_whitespace),
            voice: config.voice.clone(),
        };
        let tone = || Segment::ToneClip {
            style: config.tone.style,
            duration: config.tone.duration,
            frequency: config.tone.frequency,
        };
        let between = pos < last;

        match config.layout {
            Layout::None => push(number, clip),
            Layout::ToneBetweenGroups => {
                push(number, clip);
                if between {
                    push(number, tone());
                }
            }
            Layout::SpeechThenClip => {
                push(number, speech());
                push(number, clip);
            }
            Layout::ClipThenSpeechThenTone => {
                push(number, clip);
                if config.speech_gap > 0.0 {
                    push(
                        number,
                        Segment::SilenceClip {
                            duration: config.speech_gap,
                        },
                    );
                }
                push(number, speech());
                if between {
                    push(number, tone());
                }
            }
        }
    }

    debug!(
        "Planned {} segments ({} groups dropped, layout {})",
        segments.len(),
        dropped.len(),
        config.layout
    );

    Ok(Plan { segments, dropped })
}
