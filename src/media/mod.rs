//! Media collaborator: clip extraction, tone and speech synthesis, duration
//! probing and concatenation.
//!
//! The core never shells out directly; it talks to a [`MediaBackend`]. The
//! production backend drives `ffmpeg`/`ffprobe` and a speech engine CLI.

mod ffmpeg;
mod process;
mod speech;

pub use ffmpeg::{FfmpegBackend, FfmpegConfig, VideoEncoding};
pub use speech::{SpeechConfig, SpeechEngine};

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Generated tone styles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToneStyle {
    /// Plain sine beep.
    #[default]
    Beep,
    /// Short burst of white noise.
    Click,
    /// Digital silence.
    Silence,
    /// Sine with fade-in and fade-out.
    Fade,
    /// Quiet sine with very short fades, suited to audiobook-style separators.
    Soft,
}

impl std::str::FromStr for ToneStyle {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "beep" => Ok(ToneStyle::Beep),
            "click" => Ok(ToneStyle::Click),
            "silence" => Ok(ToneStyle::Silence),
            "fade" => Ok(ToneStyle::Fade),
            "soft" => Ok(ToneStyle::Soft),
            _ => Err(format!(
                "Unknown tone style: {}. Use beep, click, silence, fade or soft.",
                s
            )),
        }
    }
}

impl std::fmt::Display for ToneStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToneStyle::Beep => write!(f, "beep"),
            ToneStyle::Click => write!(f, "click"),
            ToneStyle::Silence => write!(f, "silence"),
            ToneStyle::Fade => write!(f, "fade"),
            ToneStyle::Soft => write!(f, "soft"),
        }
    }
}

/// Voice selection passed through to the speech engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceParams {
    /// Engine-specific voice: an Edge voice name, a Piper model path, or an
    /// espeak voice code.
    pub voice: String,
    /// Relative speaking rate, e.g. `+0%` or `-10%`.
    pub rate: String,
    /// Relative pitch, e.g. `+0Hz`.
    pub pitch: String,
}

impl Default for VoiceParams {
    fn default() -> Self {
        Self {
            voice: "en-US-AriaNeural".to_string(),
            rate: "+0%".to_string(),
            pitch: "+0Hz".to_string(),
        }
    }
}

/// Contract between the pipeline and the tools that produce media files.
///
/// Every call writes exactly one file at `dest` and returns its path. Calls
/// block until the underlying tool exits or times out.
#[async_trait]
pub trait MediaBackend: Send + Sync {
    /// Cut `start_sec..end_sec` of the source's audio into `dest`.
    async fn extract_clip(
        &self,
        source: &Path,
        start_sec: f64,
        end_sec: f64,
        dest: &Path,
    ) -> Result<PathBuf>;

    /// Generate a tone (or silence) of the given length.
    async fn synthesize_tone(
        &self,
        style: ToneStyle,
        duration_sec: f64,
        frequency_hz: f64,
        dest: &Path,
    ) -> Result<PathBuf>;

    /// Speak `text` into `dest`.
    async fn synthesize_speech(&self, text: &str, voice: &VoiceParams, dest: &Path)
        -> Result<PathBuf>;

    /// Duration of an audio file in seconds.
    async fn probe_duration(&self, path: &Path) -> Result<f64>;

    /// Concatenate the files listed in a concat manifest into `dest`.
    async fn concatenate(&self, manifest: &Path, dest: &Path) -> Result<PathBuf>;

    /// Extension of the files this backend produces.
    fn file_extension(&self) -> &str {
        "mp3"
    }
}
