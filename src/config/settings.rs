//! Configuration settings for cuesplice.

use crate::error::{Result, SpliceError};
use crate::grouping::{GroupSelection, GroupingConfig, OverlapPolicy};
use crate::media::{
    FfmpegConfig, SpeechConfig, SpeechEngine, ToneStyle, VideoEncoding, VoiceParams,
};
use crate::planner::{Layout, PlannerConfig, ToneSpec};
use crate::timeline::{AssemblerConfig, ClipMode, FallbackPolicy};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub grouping: GroupingSettings,
    pub planner: PlannerSettings,
    pub tone: ToneSettings,
    pub speech: SpeechSettings,
    pub audio: AudioSettings,
    pub video: VideoSettings,
    pub media: MediaSettings,
    pub fallback: FallbackSettings,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Parent directory for per-run working directories.
    pub work_dir: String,
    /// Directory for output files when no explicit path is given.
    pub output_dir: String,
    /// Remove the files a run created in its working directory once the
    /// output is written.
    pub cleanup: bool,
    /// Write one file per group instead of a single spliced file.
    pub split: bool,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            work_dir: "/tmp/cuesplice".to_string(),
            output_dir: ".".to_string(),
            cleanup: false,
            split: false,
            log_level: "warn".to_string(),
        }
    }
}

/// Cue grouping settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupingSettings {
    /// Largest silence between cues that keeps them in one group.
    pub max_gap_seconds: f64,
    /// How overlapping cues are treated (merge, split).
    pub overlap: OverlapPolicy,
    /// Which groups to process: all, first:N, every:N or range:A-B.
    pub selection: String,
}

impl Default for GroupingSettings {
    fn default() -> Self {
        Self {
            max_gap_seconds: 2.0,
            overlap: OverlapPolicy::Merge,
            selection: "all".to_string(),
        }
    }
}

/// Segment planning settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerSettings {
    pub lead_margin_seconds: f64,
    pub trail_margin_seconds: f64,
    pub layout: Layout,
    /// Silence between a clip and its narration (0 disables).
    pub speech_gap_seconds: f64,
    pub collapse_whitespace: bool,
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            lead_margin_seconds: 0.1,
            trail_margin_seconds: 1.0,
            layout: Layout::ToneBetweenGroups,
            speech_gap_seconds: 0.0,
            collapse_whitespace: true,
        }
    }
}

/// Separator tone settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToneSettings {
    pub style: ToneStyle,
    pub duration_seconds: f64,
    pub frequency_hz: f64,
    /// Gain for beep and fade tones.
    pub volume: f64,
    pub click_volume: f64,
    pub soft_volume: f64,
}

impl Default for ToneSettings {
    fn default() -> Self {
        Self {
            style: ToneStyle::Beep,
            duration_seconds: 0.3,
            frequency_hz: 800.0,
            volume: 0.5,
            click_volume: 0.3,
            soft_volume: 0.3,
        }
    }
}

/// Text-to-speech settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechSettings {
    /// Speech engine (edge, piper, espeak).
    pub engine: SpeechEngine,
    /// Executable override; defaults to the engine's usual binary name.
    pub binary: Option<String>,
    /// Voice name, Piper model path or espeak voice code.
    pub voice: String,
    pub rate: String,
    pub pitch: String,
    /// Text spoken when narration of a group fails; `{n}` is the group number.
    pub placeholder: String,
}

impl Default for SpeechSettings {
    fn default() -> Self {
        let voice = VoiceParams::default();
        Self {
            engine: SpeechEngine::Edge,
            binary: None,
            voice: voice.voice,
            rate: voice.rate,
            pitch: voice.pitch,
            placeholder: "Dialogue group {n}".to_string(),
        }
    }
}

impl SpeechSettings {
    pub fn placeholder_for(&self, group_number: usize) -> String {
        self.placeholder.replace("{n}", &group_number.to_string())
    }
}

/// Common output format for every generated file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    pub sample_rate: u32,
    pub channels: u32,
    pub codec: String,
    pub quality: String,
    /// Extension matching the codec.
    pub extension: String,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            channels: 2,
            codec: "libmp3lame".to_string(),
            quality: "2".to_string(),
            extension: "mp3".to_string(),
        }
    }
}

/// Video output: clips keep the source's picture.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoSettings {
    pub enabled: bool,
    pub codec: String,
    pub preset: String,
    pub crf: u32,
    pub audio_codec: String,
    pub audio_bitrate: String,
    pub extension: String,
}

impl Default for VideoSettings {
    fn default() -> Self {
        let encoding = VideoEncoding::default();
        Self {
            enabled: false,
            codec: encoding.codec,
            preset: encoding.preset,
            crf: encoding.crf,
            audio_codec: encoding.audio_codec,
            audio_bitrate: encoding.audio_bitrate,
            extension: encoding.extension,
        }
    }
}

/// External tool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaSettings {
    pub ffmpeg: String,
    pub ffprobe: String,
    /// Limit for each extraction, synthesis and probe call.
    pub timeout_seconds: u64,
    pub concat_timeout_seconds: u64,
    /// Allowed difference between planned and probed clip length.
    pub duration_tolerance_seconds: f64,
    /// Files smaller than this count as not realized.
    pub min_file_bytes: u64,
    /// Extra attempts for a failed segment before it falls back.
    pub retries: u32,
    /// extract (one file per clip) or trim (inpoint/outpoint on the source).
    pub clip_mode: ClipMode,
}

impl Default for MediaSettings {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
            timeout_seconds: 60,
            concat_timeout_seconds: 600,
            duration_tolerance_seconds: 0.1,
            min_file_bytes: 1,
            retries: 0,
            clip_mode: ClipMode::Extract,
        }
    }
}

/// Failure handling settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FallbackSettings {
    /// substitute (fallback media) or omit.
    pub policy: FallbackPolicy,
}

impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    pub fn load_from(path: Option<&PathBuf>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let settings: Settings = toml::from_str(&content)?;
            Ok(settings)
        } else {
            Ok(Settings::default())
        }
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| SpliceError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("cuesplice")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    pub fn work_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.work_dir)
    }

    pub fn output_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.output_dir)
    }

    /// Extension of the files a run writes.
    pub fn output_extension(&self) -> &str {
        if self.video.enabled {
            &self.video.extension
        } else {
            &self.audio.extension
        }
    }

    /// Reject combinations the pipeline cannot honor.
    pub fn validate(&self) -> Result<()> {
        if self.media.clip_mode == ClipMode::Trim && self.planner.layout != Layout::None {
            return Err(SpliceError::Config(format!(
                "clip_mode = \"trim\" only works with layout = \"none\" (got {})",
                self.planner.layout
            )));
        }
        if self.video.enabled && self.planner.layout != Layout::None {
            return Err(SpliceError::Config(format!(
                "video output only works with layout = \"none\" (got {})",
                self.planner.layout
            )));
        }
        if self.audio.channels == 0 || self.audio.sample_rate == 0 {
            return Err(SpliceError::Config(
                "audio sample_rate and channels must be positive".into(),
            ));
        }
        if self.media.timeout_seconds == 0 || self.media.concat_timeout_seconds == 0 {
            return Err(SpliceError::Config("media timeouts must be positive".into()));
        }
        if !(self.media.duration_tolerance_seconds >= 0.0) {
            return Err(SpliceError::Config(
                "duration_tolerance_seconds must be non-negative".into(),
            ));
        }
        self.selection()?;
        Ok(())
    }

    pub fn selection(&self) -> Result<GroupSelection> {
        self.grouping
            .selection
            .parse()
            .map_err(SpliceError::Config)
    }

    pub fn grouping_config(&self) -> GroupingConfig {
        GroupingConfig {
            max_gap_seconds: self.grouping.max_gap_seconds,
            overlap: self.grouping.overlap,
        }
    }

    pub fn voice(&self) -> VoiceParams {
        VoiceParams {
            voice: self.speech.voice.clone(),
            rate: self.speech.rate.clone(),
            pitch: self.speech.pitch.clone(),
        }
    }

    pub fn planner_config(&self) -> PlannerConfig {
        PlannerConfig {
            lead_margin: self.planner.lead_margin_seconds,
            trail_margin: self.planner.trail_margin_seconds,
            layout: self.planner.layout,
            tone: ToneSpec {
                style: self.tone.style,
                duration: self.tone.duration_seconds,
                frequency: self.tone.frequency_hz,
            },
            speech_gap: self.planner.speech_gap_seconds,
            voice: self.voice(),
            collapse_whitespace: self.planner.collapse_whitespace,
        }
    }

    pub fn ffmpeg_config(&self) -> FfmpegConfig {
        FfmpegConfig {
            ffmpeg: self.media.ffmpeg.clone(),
            ffprobe: self.media.ffprobe.clone(),
            sample_rate: self.audio.sample_rate,
            channels: self.audio.channels,
            codec: self.audio.codec.clone(),
            quality: self.audio.quality.clone(),
            extension: self.audio.extension.clone(),
            timeout: Duration::from_secs(self.media.timeout_seconds),
            concat_timeout: Duration::from_secs(self.media.concat_timeout_seconds),
            tone_volume: self.tone.volume,
            click_volume: self.tone.click_volume,
            soft_volume: self.tone.soft_volume,
            video: self.video.enabled.then(|| VideoEncoding {
                codec: self.video.codec.clone(),
                preset: self.video.preset.clone(),
                crf: self.video.crf,
                audio_codec: self.video.audio_codec.clone(),
                audio_bitrate: self.video.audio_bitrate.clone(),
                extension: self.video.extension.clone(),
            }),
        }
    }

    pub fn speech_config(&self) -> SpeechConfig {
        SpeechConfig {
            engine: self.speech.engine,
            binary: self.speech.binary.clone(),
            timeout: Duration::from_secs(self.media.timeout_seconds),
        }
    }

    pub fn assembler_config(&self) -> AssemblerConfig {
        AssemblerConfig {
            fallback: self.fallback.policy,
            min_file_bytes: self.media.min_file_bytes,
        }
    }
}
