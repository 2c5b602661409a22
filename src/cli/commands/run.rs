//! Run command implementation.

use crate::cli::output::format_duration;
use crate::cli::preflight::{self, Operation};
use crate::cli::{MediaOptions, Output, PlanOptions};
use crate::config::Settings;
use crate::pipeline::{Pipeline, RunReport, RunRequest};
use anyhow::Result;
use std::path::PathBuf;

/// Default output path: a timestamped file in the configured output directory.
pub fn default_output_path(settings: &Settings) -> PathBuf {
    settings.output_dir().join(format!(
        "cuesplice_{}.{}",
        chrono::Local::now().format("%Y%m%d_%H%M%S"),
        settings.output_extension()
    ))
}

/// Run the run command.
#[allow(clippy::too_many_arguments)]
pub async fn run_splice(
    video: &str,
    subtitles: &str,
    output: Option<String>,
    work_dir: Option<String>,
    cleanup: bool,
    json: bool,
    options: &PlanOptions,
    media: &MediaOptions,
    mut settings: Settings,
) -> Result<()> {
    options.apply(&mut settings);
    media.apply(&mut settings);
    if cleanup {
        settings.general.cleanup = true;
    }

    if let Err(e) = settings.validate() {
        Output::error(&format!("{}", e));
        return Err(e.into());
    }

    // Pre-flight checks
    if let Err(e) = preflight::check(Operation::Run, &settings) {
        Output::error(&format!("{}", e));
        Output::info("Run 'cuesplice doctor' for detailed diagnostics.");
        return Err(e.into());
    }

    let request = RunRequest {
        source: Settings::expand_path(video),
        subtitles: Settings::expand_path(subtitles),
        output: match output {
            Some(path) => Settings::expand_path(&path),
            None => default_output_path(&settings),
        },
        work_dir: work_dir.map(|d| Settings::expand_path(&d)),
    };

    if !json {
        Output::info(&format!(
            "Splicing {} with {}",
            request.source.display(),
            request.subtitles.display()
        ));
        Output::kv("Layout", &settings.planner.layout.to_string());
        Output::kv("Selection", &settings.grouping.selection);
    }

    let mut pipeline = Pipeline::new(settings)?;
    if !json {
        pipeline = pipeline.with_progress(Output::progress_bar(0, "Realizing segments"));
    }

    let report = match pipeline.run(&request).await {
        Ok(report) => report,
        Err(e) => {
            Output::error(&format!("Run failed: {}", e));
            return Err(e.into());
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    Ok(())
}

fn print_report(report: &RunReport) {
    Output::header("Run summary");
    Output::kv(
        "Cues",
        &format!("{} ({} rejected)", report.cues, report.rejected_cues),
    );
    Output::kv(
        "Groups",
        &format!("{} selected of {}", report.groups_selected, report.groups_total),
    );
    Output::kv(
        "Segments",
        &format!(
            "{} in timeline of {} planned",
            report.timeline_entries, report.planned_segments
        ),
    );
    Output::kv("Elapsed", &format_duration(report.elapsed.as_secs_f64()));
    Output::kv("Manifest", &report.manifest.display().to_string());
    if report.cleaned_up {
        Output::kv("Work dir", "intermediate files removed");
    }

    if !report.dropped.is_empty() {
        Output::header("Dropped groups");
        for dropped in &report.dropped {
            Output::list_item(&format!(
                "group {} ({:.3}s - {:.3}s): {}",
                dropped.group_number, dropped.start_sec, dropped.end_sec, dropped.reason
            ));
        }
    }

    if !report.failures.is_empty() {
        Output::header("Failed segments");
        for failure in &report.failures {
            let fallback = failure
                .fallback
                .as_deref()
                .map(|f| format!("replaced by {}", f))
                .unwrap_or_else(|| "omitted".to_string());
            Output::list_item(&format!(
                "segment {} (group {}, {}): {}; {}",
                failure.id, failure.group_number, failure.kind, failure.error, fallback
            ));
        }
    }

    if !report.duration_mismatches.is_empty() {
        Output::header("Duration mismatches");
        for m in &report.duration_mismatches {
            Output::list_item(&format!(
                "segment {} (group {}): expected {:.3}s, got {:.3}s",
                m.id, m.group_number, m.expected, m.actual
            ));
        }
    }

    if report.outputs.len() > 1 {
        Output::header("Outputs");
        for output in &report.outputs {
            Output::list_item(&output.display().to_string());
        }
    }

    let written = match report.outputs.as_slice() {
        [single] => single.display().to_string(),
        many => format!("{} files", many.len()),
    };
    println!();
    if report.failures.is_empty() && report.omitted.is_empty() {
        Output::success(&format!("Wrote {}", written));
    } else {
        Output::warning(&format!(
            "Wrote {} with {} fallback(s) and {} omission(s)",
            written,
            report.substituted,
            report.omitted.len()
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_output_path() {
        let mut settings = Settings::default();
        settings.general.output_dir = "/data/out".into();
        let path = default_output_path(&settings);
        assert!(path.starts_with("/data/out"));
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("cuesplice_"));
        assert!(name.ends_with(".mp3"));
    }
}
