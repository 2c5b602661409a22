//! CLI module for cuesplice.

pub mod commands;
mod output;
pub mod preflight;

pub use output::Output;

use crate::config::Settings;
use crate::grouping::OverlapPolicy;
use crate::media::{SpeechEngine, ToneStyle};
use crate::planner::Layout;
use crate::timeline::{ClipMode, FallbackPolicy};
use clap::{Args, Parser, Subcommand};

/// cuesplice - subtitle-driven audio extraction and splicing
///
/// Groups subtitle cues into dialogue groups, cuts each group's audio out of a
/// video, and splices the clips into one track with optional separator tones
/// and narrated text.
#[derive(Parser, Debug)]
#[command(name = "cuesplice")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Extract dialogue audio and splice it into one file
    Run {
        /// Video or audio file to cut clips from
        video: String,

        /// Subtitle file (.srt or .vtt)
        subtitles: String,

        /// Output file (default: timestamped name in the output directory)
        #[arg(short, long)]
        output: Option<String>,

        /// Working directory for intermediate files
        #[arg(long)]
        work_dir: Option<String>,

        /// Remove intermediate files after a successful run
        #[arg(long)]
        cleanup: bool,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        options: PlanOptions,

        #[command(flatten)]
        media: MediaOptions,
    },

    /// Show the groups and segments a run would produce, without media work
    Plan {
        /// Subtitle file (.srt or .vtt)
        subtitles: String,

        /// Output format (text, json)
        #[arg(long, default_value = "text")]
        format: String,

        #[command(flatten)]
        options: PlanOptions,
    },

    /// Generate a single separator tone
    Tone {
        /// Output audio file
        output: String,

        /// Tone style (beep, click, silence, fade, soft)
        #[arg(short, long)]
        style: Option<ToneStyle>,

        /// Duration in seconds
        #[arg(short, long)]
        duration: Option<f64>,

        /// Frequency in Hz
        #[arg(short, long)]
        frequency: Option<f64>,
    },

    /// Check system requirements and configuration
    Doctor,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Grouping and planning overrides shared by `run` and `plan`.
#[derive(Args, Debug, Default, Clone)]
pub struct PlanOptions {
    /// Largest gap in seconds between cues of one group
    #[arg(short = 'g', long)]
    pub max_gap: Option<f64>,

    /// Overlapping cues: merge or split
    #[arg(long)]
    pub overlap: Option<OverlapPolicy>,

    /// Groups to process: all, first:N, every:N, range:A-B
    #[arg(short, long)]
    pub select: Option<String>,

    /// Segment layout (none, tone_between_groups, speech_then_clip, clip_then_speech_then_tone)
    #[arg(short, long)]
    pub layout: Option<Layout>,

    /// Seconds before the first cue of each group
    #[arg(long)]
    pub lead_margin: Option<f64>,

    /// Seconds after the last cue of each group
    #[arg(long)]
    pub trail_margin: Option<f64>,

    /// Silence in seconds between a clip and its narration
    #[arg(long)]
    pub speech_gap: Option<f64>,

    /// Separator tone style
    #[arg(long)]
    pub tone: Option<ToneStyle>,

    /// Speech voice (Edge voice name, Piper model, espeak voice)
    #[arg(long)]
    pub voice: Option<String>,
}

/// Media overrides for `run`.
#[derive(Args, Debug, Default, Clone)]
pub struct MediaOptions {
    /// Speech engine (edge, piper, espeak)
    #[arg(long)]
    pub engine: Option<SpeechEngine>,

    /// How clips are produced (extract, trim)
    #[arg(long)]
    pub clip_mode: Option<ClipMode>,

    /// What to do with failed segments (substitute, omit)
    #[arg(long)]
    pub fallback: Option<FallbackPolicy>,

    /// Extra attempts per failed segment
    #[arg(long)]
    pub retries: Option<u32>,

    /// Timeout in seconds for each external call
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Keep the picture and write a video file (layout none only)
    #[arg(long = "video")]
    pub keep_video: bool,

    /// Write one file per dialogue group instead of a single splice
    #[arg(long)]
    pub split: bool,
}

impl PlanOptions {
    /// Apply flags on top of file settings.
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(v) = self.max_gap {
            settings.grouping.max_gap_seconds = v;
        }
        if let Some(v) = self.overlap {
            settings.grouping.overlap = v;
        }
        if let Some(v) = &self.select {
            settings.grouping.selection = v.clone();
        }
        if let Some(v) = self.layout {
            settings.planner.layout = v;
        }
        if let Some(v) = self.lead_margin {
            settings.planner.lead_margin_seconds = v;
        }
        if let Some(v) = self.trail_margin {
            settings.planner.trail_margin_seconds = v;
        }
        if let Some(v) = self.speech_gap {
            settings.planner.speech_gap_seconds = v;
        }
        if let Some(v) = self.tone {
            settings.tone.style = v;
        }
        if let Some(v) = &self.voice {
            settings.speech.voice = v.clone();
        }
    }
}

impl MediaOptions {
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(v) = self.engine {
            settings.speech.engine = v;
        }
        if let Some(v) = self.clip_mode {
            settings.media.clip_mode = v;
        }
        if let Some(v) = self.fallback {
            settings.fallback.policy = v;
        }
        if let Some(v) = self.retries {
            settings.media.retries = v;
        }
        if let Some(v) = self.timeout {
            settings.media.timeout_seconds = v;
        }
        if self.keep_video {
            settings.video.enabled = true;
        }
        if self.split {
            settings.general.split = true;
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Write the current configuration to the config file if none exists
    Init,

    /// Open configuration file in editor
    Edit,

    /// Show configuration file path
    Path,
}
