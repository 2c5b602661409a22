//! `ffmpeg`/`ffprobe` implementation of [`MediaBackend`].
//!
//! Every file this backend writes is re-encoded to one common format
//! (sample rate, channel count, codec, quality) so that the concat demuxer
//! can join clips, tones and speech without surprises. With [`VideoEncoding`]
//! set, clips keep the source's picture and everything is written as video.

use super::process::{run_tool, ToolFailure};
use super::speech::SpeechConfig;
use super::{MediaBackend, ToneStyle, VoiceParams};
use crate::error::{Result, SpliceError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Encoder settings for clips that keep their video stream.
#[derive(Debug, Clone)]
pub struct VideoEncoding {
    pub codec: String,
    pub preset: String,
    pub crf: u32,
    pub audio_codec: String,
    pub audio_bitrate: String,
    /// Container extension, e.g. `mp4`.
    pub extension: String,
}

impl Default for VideoEncoding {
    fn default() -> Self {
        Self {
            codec: "libx264".to_string(),
            preset: "fast".to_string(),
            crf: 23,
            audio_codec: "aac".to_string(),
            audio_bitrate: "192k".to_string(),
            extension: "mp4".to_string(),
        }
    }
}

/// Output format and tool settings for [`FfmpegBackend`].
#[derive(Debug, Clone)]
pub struct FfmpegConfig {
    pub ffmpeg: String,
    pub ffprobe: String,
    pub sample_rate: u32,
    pub channels: u32,
    pub codec: String,
    /// Value for `-q:a`.
    pub quality: String,
    /// Extension of produced files, matching `codec`.
    pub extension: String,
    /// Limit for every call except concatenation.
    pub timeout: Duration,
    pub concat_timeout: Duration,
    /// Gain for `beep` and `fade` tones.
    pub tone_volume: f64,
    /// Gain for `click` noise bursts.
    pub click_volume: f64,
    /// Gain for `soft` tones.
    pub soft_volume: f64,
    /// Keep the video stream; `None` writes audio only.
    pub video: Option<VideoEncoding>,
}

impl Default for FfmpegConfig {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
            sample_rate: 44100,
            channels: 2,
            codec: "libmp3lame".to_string(),
            quality: "2".to_string(),
            extension: "mp3".to_string(),
            timeout: Duration::from_secs(60),
            concat_timeout: Duration::from_secs(600),
            tone_volume: 0.5,
            click_volume: 0.3,
            soft_volume: 0.3,
            video: None,
        }
    }
}

impl FfmpegConfig {
    /// Output options shared by every encode.
    fn encode_args(&self) -> Vec<String> {
        if let Some(video) = &self.video {
            return vec![
                "-c:v".into(),
                video.codec.clone(),
                "-preset".into(),
                video.preset.clone(),
                "-crf".into(),
                video.crf.to_string(),
                "-c:a".into(),
                video.audio_codec.clone(),
                "-b:a".into(),
                video.audio_bitrate.clone(),
                "-ar".into(),
                self.sample_rate.to_string(),
                "-ac".into(),
                self.channels.to_string(),
            ];
        }
        vec![
            "-vn".into(),
            "-ar".into(),
            self.sample_rate.to_string(),
            "-ac".into(),
            self.channels.to_string(),
            "-c:a".into(),
            self.codec.clone(),
            "-q:a".into(),
            self.quality.clone(),
        ]
    }

    fn head_args() -> Vec<String> {
        vec!["-hide_banner".into(), "-loglevel".into(), "error".into()]
    }

    fn tail_args(&self, dest: &Path) -> Vec<String> {
        let mut args = self.encode_args();
        args.push("-y".into());
        args.push(path_arg(dest));
        args
    }

    pub(crate) fn extract_args(&self, source: &Path, start: f64, end: f64, dest: &Path) -> Vec<String> {
        let mut args = Self::head_args();
        args.extend([
            "-ss".into(),
            format!("{:.3}", start),
            "-i".into(),
            path_arg(source),
            "-t".into(),
            format!("{:.3}", end - start),
        ]);
        args.extend(self.tail_args(dest));
        args
    }

    pub(crate) fn tone_args(&self, style: ToneStyle, duration: f64, frequency: f64, dest: &Path) -> Vec<String> {
        let sr = self.sample_rate;
        let sine = format!(
            "sine=frequency={}:sample_rate={}:duration={:.3}",
            frequency, sr, duration
        );
        let (source, filter) = match style {
            ToneStyle::Beep => (sine, Some(format!("volume={}", self.tone_volume))),
            ToneStyle::Click => (
                format!("anoisesrc=color=white:sample_rate={}:duration={:.3}", sr, duration),
                Some(format!("volume={}", self.click_volume)),
            ),
            ToneStyle::Silence => {
                let layout = if self.channels == 1 { "mono" } else { "stereo" };
                (
                    format!("anullsrc=channel_layout={}:sample_rate={}", layout, sr),
                    None,
                )
            }
            ToneStyle::Fade => (
                sine,
                Some(fade_filter(self.tone_volume, duration, 0.1)),
            ),
            ToneStyle::Soft => (
                sine,
                Some(fade_filter(self.soft_volume, duration, 0.05)),
            ),
        };

        let mut args = Self::head_args();
        args.extend(["-f".into(), "lavfi".into(), "-i".into(), source]);
        if let Some(filter) = filter {
            args.extend(["-af".into(), filter]);
        }
        args.extend(["-t".into(), format!("{:.3}", duration)]);
        args.extend(self.tail_args(dest));
        args
    }

    pub(crate) fn normalize_args(&self, source: &Path, dest: &Path) -> Vec<String> {
        let mut args = Self::head_args();
        args.extend(["-i".into(), path_arg(source)]);
        args.extend(self.tail_args(dest));
        args
    }

    pub(crate) fn concat_args(&self, manifest: &Path, dest: &Path) -> Vec<String> {
        let mut args = Self::head_args();
        args.extend([
            "-f".into(),
            "concat".into(),
            "-safe".into(),
            "0".into(),
            "-i".into(),
            path_arg(manifest),
        ]);
        args.extend(self.tail_args(dest));
        args
    }

    pub(crate) fn probe_args(path: &Path) -> Vec<String> {
        vec![
            "-v".into(),
            "quiet".into(),
            "-print_format".into(),
            "json".into(),
            "-show_format".into(),
            "-show_streams".into(),
            path_arg(path),
        ]
    }
}

/// `volume` followed by a fade in and out, each at most half the tone.
fn fade_filter(volume: f64, duration: f64, fade: f64) -> String {
    let fade = fade.min(duration / 2.0);
    format!(
        "volume={},afade=t=in:st=0:d={:.3},afade=t=out:st={:.3}:d={:.3}",
        volume,
        fade,
        duration - fade,
        fade
    )
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Read the duration from `ffprobe -print_format json` output.
///
/// The file must contain an audio stream; the container duration is used,
/// falling back to the first audio stream's duration.
pub(crate) fn parse_probe_output(json: &str) -> Result<f64> {
    let parsed: serde_json::Value = serde_json::from_str(json)
        .map_err(|_| SpliceError::Probe("Invalid ffprobe output".into()))?;

    let streams = parsed["streams"].as_array().cloned().unwrap_or_default();
    let audio = streams
        .iter()
        .find(|s| s["codec_type"].as_str() == Some("audio"))
        .ok_or_else(|| SpliceError::Probe("no audio stream".into()))?;

    parsed["format"]["duration"]
        .as_str()
        .or_else(|| audio["duration"].as_str())
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
        .ok_or_else(|| SpliceError::Probe("Could not determine audio duration".into()))
}

/// Media backend that shells out to `ffmpeg`, `ffprobe` and a speech engine.
#[derive(Debug, Clone)]
pub struct FfmpegBackend {
    config: FfmpegConfig,
    speech: SpeechConfig,
}

impl FfmpegBackend {
    pub fn new(config: FfmpegConfig, speech: SpeechConfig) -> Self {
        Self { config, speech }
    }

    pub fn config(&self) -> &FfmpegConfig {
        &self.config
    }

    /// Run ffmpeg, mapping failures through `wrap`.
    async fn ffmpeg(
        &self,
        args: &[String],
        timeout: Duration,
        wrap: fn(String) -> SpliceError,
    ) -> Result<()> {
        match run_tool(&self.config.ffmpeg, args, None, timeout).await {
            Ok(_) => Ok(()),
            Err(ToolFailure::NotFound) => Err(SpliceError::ToolNotFound(self.config.ffmpeg.clone())),
            Err(failure) => Err(wrap(failure.describe(&self.config.ffmpeg))),
        }
    }

    fn ensure_written(dest: &Path, wrap: fn(String) -> SpliceError) -> Result<PathBuf> {
        match std::fs::metadata(dest) {
            Ok(meta) if meta.len() > 0 => Ok(dest.to_path_buf()),
            _ => Err(wrap(format!("{} was not written", dest.display()))),
        }
    }
}

#[async_trait]
impl MediaBackend for FfmpegBackend {
    #[instrument(skip(self, source, dest), fields(dest = %dest.display()))]
    async fn extract_clip(
        &self,
        source: &Path,
        start_sec: f64,
        end_sec: f64,
        dest: &Path,
    ) -> Result<PathBuf> {
        if !(end_sec > start_sec) || start_sec < 0.0 {
            return Err(SpliceError::Extraction(format!(
                "invalid window {:.3}s - {:.3}s",
                start_sec, end_sec
            )));
        }
        if !source.exists() {
            return Err(SpliceError::Extraction(format!(
                "source {} does not exist",
                source.display()
            )));
        }

        debug!("Extracting {:.3}s - {:.3}s", start_sec, end_sec);
        let args = self.config.extract_args(source, start_sec, end_sec, dest);
        self.ffmpeg(&args, self.config.timeout, SpliceError::Extraction)
            .await?;
        Self::ensure_written(dest, SpliceError::Extraction)
    }

    #[instrument(skip(self, dest), fields(dest = %dest.display()))]
    async fn synthesize_tone(
        &self,
        style: ToneStyle,
        duration_sec: f64,
        frequency_hz: f64,
        dest: &Path,
    ) -> Result<PathBuf> {
        if !(duration_sec > 0.0) || !duration_sec.is_finite() {
            return Err(SpliceError::Synthesis(format!(
                "tone duration must be positive, got {}",
                duration_sec
            )));
        }

        let args = self
            .config
            .tone_args(style, duration_sec, frequency_hz, dest);
        self.ffmpeg(&args, self.config.timeout, SpliceError::Synthesis)
            .await?;
        Self::ensure_written(dest, SpliceError::Synthesis)
    }

    #[instrument(skip(self, text, voice, dest), fields(dest = %dest.display()))]
    async fn synthesize_speech(
        &self,
        text: &str,
        voice: &VoiceParams,
        dest: &Path,
    ) -> Result<PathBuf> {
        let raw = self.speech.render(text, voice, dest).await?;

        let args = self.config.normalize_args(&raw, dest);
        let result = self
            .ffmpeg(&args, self.config.timeout, SpliceError::Synthesis)
            .await;
        let _ = std::fs::remove_file(&raw);
        result?;

        Self::ensure_written(dest, SpliceError::Synthesis)
    }

    #[instrument(skip(self, path), fields(path = %path.display()))]
    async fn probe_duration(&self, path: &Path) -> Result<f64> {
        let args = FfmpegConfig::probe_args(path);
        let output = match run_tool(&self.config.ffprobe, &args, None, self.config.timeout).await
        {
            Ok(output) => output,
            Err(ToolFailure::NotFound) => {
                return Err(SpliceError::ToolNotFound(self.config.ffprobe.clone()))
            }
            Err(failure) => return Err(SpliceError::Probe(failure.describe(&self.config.ffprobe))),
        };

        parse_probe_output(&String::from_utf8_lossy(&output.stdout))
    }

    #[instrument(skip(self, manifest, dest), fields(dest = %dest.display()))]
    async fn concatenate(&self, manifest: &Path, dest: &Path) -> Result<PathBuf> {
        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        info!("Concatenating into {}", dest.display());
        let args = self.config.concat_args(manifest, dest);
        self.ffmpeg(&args, self.config.concat_timeout, SpliceError::Concatenation)
            .await?;
        Self::ensure_written(dest, SpliceError::Concatenation)
    }

    fn file_extension(&self) -> &str {
        match &self.config.video {
            Some(video) => &video.extension,
            None => &self.config.extension,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn joined(args: &[String]) -> String {
        args.join(" ")
    }

    #[test]
    fn test_extract_args() {
        let cfg = FfmpegConfig::default();
        let args = cfg.extract_args(Path::new("/v/movie.mp4"), 9.9, 13.0, Path::new("/w/0000_g001_clip.mp3"));
        let line = joined(&args);
        assert!(line.contains("-ss 9.900 -i /v/movie.mp4 -t 3.100"));
        assert!(line.contains("-ar 44100 -ac 2 -c:a libmp3lame -q:a 2"));
        assert!(line.ends_with("-y /w/0000_g001_clip.mp3"));
    }

    #[test]
    fn test_tone_filters() {
        let cfg = FfmpegConfig::default();
        let dest = Path::new("t.mp3");

        let beep = joined(&cfg.tone_args(ToneStyle::Beep, 0.3, 800.0, dest));
        assert!(beep.contains("-f lavfi -i sine=frequency=800:sample_rate=44100:duration=0.300"));
        assert!(beep.contains("-af volume=0.5"));

        let click = joined(&cfg.tone_args(ToneStyle::Click, 0.3, 800.0, dest));
        assert!(click.contains("anoisesrc=color=white"));
        assert!(click.contains("-af volume=0.3"));

        let silence = joined(&cfg.tone_args(ToneStyle::Silence, 2.5, 800.0, dest));
        assert!(silence.contains("anullsrc=channel_layout=stereo:sample_rate=44100"));
        assert!(silence.contains("-t 2.500"));
        assert!(!silence.contains("-af"));
    }

    #[test]
    fn test_fade_is_bounded_by_half_duration() {
        assert_eq!(
            fade_filter(0.5, 1.0, 0.1),
            "volume=0.5,afade=t=in:st=0:d=0.100,afade=t=out:st=0.900:d=0.100"
        );
        assert_eq!(
            fade_filter(0.3, 0.06, 0.05),
            "volume=0.3,afade=t=in:st=0:d=0.030,afade=t=out:st=0.030:d=0.030"
        );
    }

    #[test]
    fn test_video_mode_keeps_picture() {
        let cfg = FfmpegConfig {
            video: Some(VideoEncoding::default()),
            ..FfmpegConfig::default()
        };
        let line = joined(&cfg.extract_args(
            Path::new("/v/movie.mp4"),
            9.9,
            13.0,
            Path::new("/w/0000_g001_clip.mp4"),
        ));
        assert!(!line.contains("-vn"));
        assert!(line.contains("-c:v libx264 -preset fast -crf 23 -c:a aac -b:a 192k"));

        let concat = joined(&cfg.concat_args(Path::new("/w/concat.txt"), Path::new("out.mp4")));
        assert!(concat.contains("-c:v libx264"));
        assert!(concat.ends_with("-y out.mp4"));

        let backend = FfmpegBackend::new(cfg, SpeechConfig::default());
        assert_eq!(backend.file_extension(), "mp4");
    }

    #[test]
    fn test_concat_args() {
        let cfg = FfmpegConfig::default();
        let line = joined(&cfg.concat_args(Path::new("/w/list.txt"), Path::new("out.mp3")));
        assert!(line.contains("-f concat -safe 0 -i /w/list.txt"));
        assert!(line.ends_with("-y out.mp3"));
    }

    #[test]
    fn test_parse_probe_output() {
        let json = r#"{
            "streams": [{"codec_type": "audio", "duration": "3.100000"}],
            "format": {"duration": "3.134694"}
        }"#;
        let duration = parse_probe_output(json).unwrap();
        assert!((duration - 3.134694).abs() < 1e-9);
    }

    #[test]
    fn test_parse_probe_requires_audio() {
        let json = r#"{"streams": [{"codec_type": "video"}], "format": {"duration": "1.0"}}"#;
        assert!(matches!(parse_probe_output(json), Err(SpliceError::Probe(_))));
        assert!(matches!(parse_probe_output("not json"), Err(SpliceError::Probe(_))));
    }

    #[tokio::test]
    async fn test_extract_rejects_missing_source() {
        let backend = FfmpegBackend::new(FfmpegConfig::default(), SpeechConfig::default());
        let dir = tempfile::tempdir().unwrap();
        let result = backend
            .extract_clip(&dir.path().join("missing.mp4"), 0.0, 1.0, &dir.path().join("out.mp3"))
            .await;
        assert!(matches!(result, Err(SpliceError::Extraction(_))));
    }

    #[tokio::test]
    async fn test_tone_rejects_zero_duration() {
        let backend = FfmpegBackend::new(FfmpegConfig::default(), SpeechConfig::default());
        let result = backend
            .synthesize_tone(ToneStyle::Beep, 0.0, 800.0, Path::new("t.mp3"))
            .await;
        assert!(matches!(result, Err(SpliceError::Synthesis(_))));
    }
}
