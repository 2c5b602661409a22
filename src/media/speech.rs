//! Text-to-speech engines driven through their command-line tools.

use super::process::{run_tool, ToolFailure};
use super::VoiceParams;
use crate::error::{Result, SpliceError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// espeak-ng's default speaking rate in words per minute.
const ESPEAK_BASE_WPM: f64 = 175.0;

/// Supported speech engines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeechEngine {
    /// Microsoft Edge neural voices via the `edge-tts` CLI.
    #[default]
    Edge,
    /// Local Piper models; text is fed on stdin.
    Piper,
    /// `espeak-ng`, fully offline.
    Espeak,
}

impl SpeechEngine {
    pub fn default_binary(&self) -> &'static str {
        match self {
            SpeechEngine::Edge => "edge-tts",
            SpeechEngine::Piper => "piper",
            SpeechEngine::Espeak => "espeak-ng",
        }
    }

    /// Extension of the file the engine writes before normalization.
    fn raw_extension(&self) -> &'static str {
        match self {
            SpeechEngine::Edge => "mp3",
            SpeechEngine::Piper | SpeechEngine::Espeak => "wav",
        }
    }

    /// Arguments and optional stdin for speaking `text` into `raw`.
    pub(crate) fn command(
        &self,
        text: &str,
        voice: &VoiceParams,
        raw: &Path,
    ) -> (Vec<String>, Option<String>) {
        let raw = raw.to_string_lossy().into_owned();
        match self {
            SpeechEngine::Edge => (
                vec![
                    "--voice".into(),
                    voice.voice.clone(),
                    format!("--rate={}", voice.rate),
                    format!("--pitch={}", voice.pitch),
                    "--text".into(),
                    text.to_string(),
                    "--write-media".into(),
                    raw,
                ],
                None,
            ),
            SpeechEngine::Piper => (
                vec!["--model".into(), voice.voice.clone(), "--output_file".into(), raw],
                Some(text.to_string()),
            ),
            SpeechEngine::Espeak => {
                let factor = 1.0 + parse_relative(&voice.rate, '%').unwrap_or(0.0) / 100.0;
                let wpm = (ESPEAK_BASE_WPM * factor).round().max(80.0) as u32;
                (
                    vec![
                        "-v".into(),
                        voice.voice.clone(),
                        "-s".into(),
                        wpm.to_string(),
                        "-w".into(),
                        raw,
                        text.to_string(),
                    ],
                    None,
                )
            }
        }
    }
}

impl std::str::FromStr for SpeechEngine {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "edge" | "edge-tts" => Ok(SpeechEngine::Edge),
            "piper" => Ok(SpeechEngine::Piper),
            "espeak" | "espeak-ng" => Ok(SpeechEngine::Espeak),
            _ => Err(format!("Unknown speech engine: {}. Use edge, piper or espeak.", s)),
        }
    }
}

impl std::fmt::Display for SpeechEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpeechEngine::Edge => write!(f, "edge"),
            SpeechEngine::Piper => write!(f, "piper"),
            SpeechEngine::Espeak => write!(f, "espeak"),
        }
    }
}

/// Parse values like `+10%` or `-5Hz`.
fn parse_relative(value: &str, unit: char) -> Option<f64> {
    value.trim().trim_end_matches(unit).parse::<f64>().ok()
}

/// Speech engine selection and limits.
#[derive(Debug, Clone)]
pub struct SpeechConfig {
    pub engine: SpeechEngine,
    /// Overrides the engine's default executable name.
    pub binary: Option<String>,
    pub timeout: Duration,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            engine: SpeechEngine::default(),
            binary: None,
            timeout: Duration::from_secs(60),
        }
    }
}

impl SpeechConfig {
    pub fn binary(&self) -> &str {
        self.binary
            .as_deref()
            .unwrap_or_else(|| self.engine.default_binary())
    }

    /// Engine output path next to `dest`, e.g. `0003_g002_speech.raw.mp3`.
    fn raw_path(&self, dest: &Path) -> PathBuf {
        let stem = dest
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "speech".to_string());
        dest.with_file_name(format!("{}.raw.{}", stem, self.engine.raw_extension()))
    }

    /// Run the engine and return the path of its unnormalized output.
    pub(crate) async fn render(&self, text: &str, voice: &VoiceParams, dest: &Path) -> Result<PathBuf> {
        if text.trim().is_empty() {
            return Err(SpliceError::Synthesis("speech text is empty".into()));
        }

        let raw = self.raw_path(dest);
        let (args, stdin) = self.engine.command(text, voice, &raw);
        let program = self.binary();
        debug!("Synthesizing {} chars with {}", text.chars().count(), self.engine);

        match run_tool(program, &args, stdin.as_deref(), self.timeout).await {
            Ok(_) => {}
            Err(ToolFailure::NotFound) => {
                return Err(SpliceError::ToolNotFound(program.to_string()))
            }
            Err(failure) => {
                let _ = std::fs::remove_file(&raw);
                return Err(SpliceError::Synthesis(failure.describe(program)));
            }
        }

        if !raw.exists() {
            return Err(SpliceError::Synthesis(format!(
                "{} produced no output",
                program
            )));
        }
        Ok(raw)
    }
}
