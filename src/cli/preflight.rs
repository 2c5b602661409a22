//! Pre-flight checks before expensive operations.
//!
//! Validates that required tools are available before starting a run that
//! would otherwise fail on every segment.

use crate::config::Settings;
use crate::error::{Result, SpliceError};
use crate::media::SpeechEngine;
use std::process::Command;

/// Requirements for different operations.
#[derive(Debug, Clone, Copy)]
pub enum Operation {
    /// A full run needs ffmpeg, ffprobe and, for narrated layouts, the speech engine.
    Run,
    /// Tone generation needs ffmpeg only.
    Tone,
    /// Planning touches no external tools.
    Plan,
}

/// Run pre-flight checks for the given operation.
///
/// Returns Ok(()) if all checks pass, or an error describing what's missing.
pub fn check(operation: Operation, settings: &Settings) -> Result<()> {
    match operation {
        Operation::Run => {
            check_tool(&settings.media.ffmpeg)?;
            check_tool(&settings.media.ffprobe)?;
            if settings.planner.layout.uses_speech() {
                let binary = settings
                    .speech
                    .binary
                    .clone()
                    .unwrap_or_else(|| settings.speech.engine.default_binary().to_string());
                check_tool_with(&binary, speech_version_arg(settings.speech.engine))?;
            }
        }
        Operation::Tone => {
            check_tool(&settings.media.ffmpeg)?;
        }
        Operation::Plan => {}
    }
    Ok(())
}

/// Flag that makes each speech engine print something and exit 0 without
/// touching the network.
pub fn speech_version_arg(engine: SpeechEngine) -> &'static str {
    match engine {
        SpeechEngine::Edge => "--help",
        SpeechEngine::Piper => "--help",
        SpeechEngine::Espeak => "--version",
    }
}

/// Check if an external tool is available.
pub fn check_tool(name: &str) -> Result<()> {
    // ffmpeg/ffprobe use -version (single dash), others use --version
    let is_ffmpeg = name.ends_with("ffmpeg") || name.ends_with("ffprobe");
    check_tool_with(name, if is_ffmpeg { "-version" } else { "--version" })
}

fn check_tool_with(name: &str, arg: &str) -> Result<()> {
    match Command::new(name).arg(arg).output() {
        Ok(output) if output.status.success() => Ok(()),
        Ok(_) => Err(SpliceError::ToolNotFound(format!(
            "{} is installed but not working correctly",
            name
        ))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(SpliceError::ToolNotFound(name.to_string()))
        }
        Err(e) => Err(SpliceError::ToolNotFound(format!("{}: {}", name, e))),
    }
}
