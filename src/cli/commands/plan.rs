//! Plan command - preview groups and segments without running any tools.

use crate::cli::preflight::{self, Operation};
use crate::cli::{Output, PlanOptions};
use crate::config::Settings;
use crate::cues::RejectedEntry;
use crate::pipeline::Pipeline;
use crate::planner::{speech_text, Plan, Segment};
use crate::timecode::seconds_to_timestamp;
use anyhow::Result;
use serde::Serialize;

/// JSON view of a plan.
#[derive(Debug, Serialize)]
struct PlanOutput<'a> {
    cues: usize,
    rejected: &'a [RejectedEntry],
    groups_total: usize,
    groups_selected: usize,
    plan: &'a Plan,
}

/// Run the plan command.
pub fn run_plan(
    subtitles: &str,
    format: &str,
    options: &PlanOptions,
    mut settings: Settings,
) -> Result<()> {
    options.apply(&mut settings);
    preflight::check(Operation::Plan, &settings)?;

    let pipeline = Pipeline::new(settings)?;
    let prepared = pipeline.prepare(&Settings::expand_path(subtitles))?;

    match format {
        "json" => {
            let view = PlanOutput {
                cues: prepared.cues.store.len(),
                rejected: &prepared.cues.rejected,
                groups_total: prepared.groups_total,
                groups_selected: prepared.groups_selected,
                plan: &prepared.plan,
            };
            println!("{}", serde_json::to_string_pretty(&view)?);
        }
        "text" => {
            let cues = prepared.cues.store.cues();
            Output::header(&format!(
                "{} groups selected of {} ({} cues)",
                prepared.groups_selected,
                prepared.groups_total,
                cues.len()
            ));

            for planned in &prepared.plan.segments {
                match &planned.segment {
                    Segment::OriginalAudioClip {
                        group,
                        start_sec,
                        end_sec,
                    } => Output::group_line(
                        planned.group_number,
                        &seconds_to_timestamp(*start_sec)?,
                        &seconds_to_timestamp(*end_sec)?,
                        &speech_text(group, cues, true),
                    ),
                    other => Output::kv(
                        &format!("  {:04}", planned.id),
                        &match other.expected_duration() {
                            Some(d) => format!("{} ({:.3}s)", other.kind(), d),
                            None => other.kind().to_string(),
                        },
                    ),
                }
            }

            for dropped in &prepared.plan.dropped {
                Output::warning(&format!(
                    "Group {} dropped: {}",
                    dropped.group_number, dropped.reason
                ));
            }
            if !prepared.cues.rejected.is_empty() {
                Output::warning(&format!(
                    "{} subtitle block(s) could not be parsed",
                    prepared.cues.rejected.len()
                ));
            }

            println!();
            Output::info(&format!(
                "{} segments, {} clips",
                prepared.plan.segments.len(),
                prepared.plan.clip_count()
            ));
        }
        other => {
            Output::error(&format!("Unknown format: {}. Use text or json.", other));
            return Err(anyhow::anyhow!("unknown format {}", other));
        }
    }

    Ok(())
}
