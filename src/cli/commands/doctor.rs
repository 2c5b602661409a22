//! Doctor command - verify system requirements and configuration.

use crate::cli::preflight::speech_version_arg;
use crate::cli::Output;
use crate::config::Settings;
use crate::media::SpeechEngine;
use console::style;
use std::path::Path;
use std::process::Command;

/// Check result for a single item.
#[derive(Debug)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, PartialEq)]
pub enum CheckStatus {
    Ok,
    Warning,
    Error,
}

impl CheckResult {
    fn ok(name: &str, message: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Ok,
            message: message.to_string(),
            hint: None,
        }
    }

    fn warning(name: &str, message: &str, hint: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Warning,
            message: message.to_string(),
            hint: Some(hint.to_string()),
        }
    }

    fn error(name: &str, message: &str, hint: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Error,
            message: message.to_string(),
            hint: Some(hint.to_string()),
        }
    }

    /// Downgrade an error to a warning, for tools the current config does not need.
    fn optional(mut self) -> Self {
        if self.status == CheckStatus::Error {
            self.status = CheckStatus::Warning;
        }
        self
    }

    fn print(&self) {
        let icon = match self.status {
            CheckStatus::Ok => style("✓").green(),
            CheckStatus::Warning => style("!").yellow(),
            CheckStatus::Error => style("✗").red(),
        };

        println!("  {} {} - {}", icon, style(&self.name).bold(), self.message);

        if let Some(hint) = &self.hint {
            println!("    {} {}", style("→").dim(), style(hint).dim());
        }
    }
}

/// Run all diagnostic checks.
pub fn run_doctor(settings: &Settings, config_path: &Path) -> anyhow::Result<()> {
    Output::header("cuesplice doctor");
    println!();
    println!("Checking system requirements and configuration...\n");

    let mut checks = Vec::new();

    println!("{}", style("External Tools").bold());
    let mut tool_checks = vec![
        check_tool(&settings.media.ffmpeg, "-version", install_hint_ffmpeg()),
        check_tool(&settings.media.ffprobe, "-version", install_hint_ffmpeg()),
    ];
    let engine = settings.speech.engine;
    let binary = settings
        .speech
        .binary
        .clone()
        .unwrap_or_else(|| engine.default_binary().to_string());
    let speech_check = check_tool(&binary, speech_version_arg(engine), install_hint_speech(engine));
    tool_checks.push(if settings.planner.layout.uses_speech() {
        speech_check
    } else {
        speech_check.optional()
    });
    for check in &tool_checks {
        check.print();
    }
    checks.extend(tool_checks);

    println!();

    println!("{}", style("Directories").bold());
    let dir_checks = check_directories(settings);
    for check in &dir_checks {
        check.print();
    }
    checks.extend(dir_checks);

    println!();

    println!("{}", style("Configuration").bold());
    let config_checks = vec![check_config_file(config_path), check_settings(settings)];
    for check in &config_checks {
        check.print();
    }
    checks.extend(config_checks);

    println!();

    let errors = checks.iter().filter(|c| c.status == CheckStatus::Error).count();
    let warnings = checks.iter().filter(|c| c.status == CheckStatus::Warning).count();

    if errors > 0 {
        Output::error(&format!(
            "{} error(s) found. Please fix them before running cuesplice.",
            errors
        ));
        std::process::exit(1);
    } else if warnings > 0 {
        Output::warning(&format!("All checks passed with {} warning(s).", warnings));
    } else {
        Output::success("All checks passed! cuesplice is ready to use.");
    }

    Ok(())
}

/// Check if an external tool is available.
fn check_tool(name: &str, version_arg: &str, hint: &str) -> CheckResult {
    match Command::new(name).arg(version_arg).output() {
        Ok(output) if output.status.success() => {
            let version = String::from_utf8_lossy(&output.stdout)
                .lines()
                .next()
                .unwrap_or("installed")
                .trim()
                .to_string();

            let version_display = if version.chars().count() > 50 {
                format!("{}...", version.chars().take(50).collect::<String>())
            } else if version.is_empty() {
                "installed".to_string()
            } else {
                version
            };

            CheckResult::ok(name, &version_display)
        }
        Ok(_) => CheckResult::error(name, "installed but not working", hint),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            CheckResult::error(name, "not found", hint)
        }
        Err(e) => CheckResult::error(name, &format!("error: {}", e), hint),
    }
}

/// Check working and output directories.
fn check_directories(settings: &Settings) -> Vec<CheckResult> {
    let mut results = Vec::new();

    let work_dir = settings.work_dir();
    if work_dir.exists() {
        let runs = std::fs::read_dir(&work_dir)
            .map(|entries| entries.flatten().count())
            .unwrap_or(0);
        results.push(CheckResult::ok(
            "Work directory",
            &format!("{} ({} run(s) kept)", work_dir.display(), runs),
        ));
    } else {
        results.push(CheckResult::warning(
            "Work directory",
            &format!("{} (will be created)", work_dir.display()),
            "Directory will be created on first run",
        ));
    }

    let output_dir = settings.output_dir();
    if output_dir.is_dir() {
        results.push(CheckResult::ok(
            "Output directory",
            &format!("{}", output_dir.display()),
        ));
    } else {
        results.push(CheckResult::error(
            "Output directory",
            &format!("{} does not exist", output_dir.display()),
            "Create it or set general.output_dir in the config file",
        ));
    }

    results
}

/// Check if config file exists.
fn check_config_file(config_path: &Path) -> CheckResult {
    if config_path.exists() {
        CheckResult::ok("Config file", &format!("{}", config_path.display()))
    } else {
        CheckResult::warning(
            "Config file",
            "using defaults",
            "Create with: cuesplice config init (or cuesplice config edit)",
        )
    }
}

/// Check that the loaded settings are consistent.
fn check_settings(settings: &Settings) -> CheckResult {
    match settings.validate() {
        Ok(()) => CheckResult::ok(
            "Settings",
            &format!(
                "layout {}, max gap {}s, {} engine",
                settings.planner.layout, settings.grouping.max_gap_seconds, settings.speech.engine
            ),
        ),
        Err(e) => CheckResult::error("Settings", &e.to_string(), "Fix the value with: cuesplice config edit"),
    }
}

/// Platform-specific install hint for ffmpeg.
fn install_hint_ffmpeg() -> &'static str {
    if cfg!(target_os = "macos") {
        "Install with: brew install ffmpeg"
    } else if cfg!(target_os = "linux") {
        "Install with: sudo apt install ffmpeg (or your package manager)"
    } else {
        "Install from: https://ffmpeg.org/download.html"
    }
}

/// Install hint for each speech engine.
fn install_hint_speech(engine: SpeechEngine) -> &'static str {
    match engine {
        SpeechEngine::Edge => "Install with: pip install edge-tts",
        SpeechEngine::Piper => "Install from: https://github.com/rhasspy/piper",
        SpeechEngine::Espeak => {
            if cfg!(target_os = "macos") {
                "Install with: brew install espeak-ng"
            } else {
                "Install with: sudo apt install espeak-ng (or your package manager)"
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::Layout;
    use crate::timeline::ClipMode;

    #[test]
    fn test_check_result_ok() {
        let result = CheckResult::ok("test", "passed");
        assert_eq!(result.status, CheckStatus::Ok);
        assert!(result.hint.is_none());
    }

    #[test]
    fn test_optional_downgrades_error() {
        let result = CheckResult::error("piper", "not found", "install it").optional();
        assert_eq!(result.status, CheckStatus::Warning);
        assert_eq!(result.hint, Some("install it".to_string()));
    }

    #[test]
    fn test_missing_tool_is_error() {
        let result = check_tool("cuesplice-no-such-tool", "--version", "hint");
        assert_eq!(result.status, CheckStatus::Error);
        assert_eq!(result.message, "not found");
    }

    #[test]
    fn test_check_settings_reports_conflict() {
        let mut settings = Settings::default();
        settings.media.clip_mode = ClipMode::Trim;
        settings.planner.layout = Layout::SpeechThenClip;
        assert_eq!(check_settings(&settings).status, CheckStatus::Error);
    }
}
