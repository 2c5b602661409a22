//! Tone command - generate a single separator tone file.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::media::{FfmpegBackend, MediaBackend, ToneStyle};
use anyhow::Result;

/// Run the tone command.
pub async fn run_tone(
    output: &str,
    style: Option<ToneStyle>,
    duration: Option<f64>,
    frequency: Option<f64>,
    settings: Settings,
) -> Result<()> {
    if let Err(e) = preflight::check(Operation::Tone, &settings) {
        Output::error(&format!("{}", e));
        return Err(e.into());
    }

    let style = style.unwrap_or(settings.tone.style);
    let duration = duration.unwrap_or(settings.tone.duration_seconds);
    let frequency = frequency.unwrap_or(settings.tone.frequency_hz);

    let backend = FfmpegBackend::new(settings.ffmpeg_config(), settings.speech_config());
    let dest = Settings::expand_path(output);

    let spinner = Output::spinner(&format!("Generating {} tone...", style));
    let result = backend
        .synthesize_tone(style, duration, frequency, &dest)
        .await;
    spinner.finish_and_clear();

    let path = result?;
    Output::success(&format!(
        "Wrote {} ({}, {:.3}s, {} Hz)",
        path.display(),
        style,
        duration,
        frequency
    ));

    match backend.probe_duration(&path).await {
        Ok(actual) => Output::kv("Probed duration", &format!("{:.3}s", actual)),
        Err(e) => Output::warning(&format!("Could not probe {}: {}", path.display(), e)),
    }

    Ok(())
}
