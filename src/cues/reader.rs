//! SubRip and WebVTT reader.
//!
//! Both formats are blank-line separated blocks with a `start --> end`
//! timing line. Anything before the timing line (a numeric or named cue
//! identifier) is ignored; every line after it is cue text.

use super::Cue;
use crate::timecode::timestamp_to_seconds;
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

/// A subtitle block that could not be turned into a cue.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedEntry {
    /// 1-based block number in the file.
    pub block: usize,
    pub reason: String,
}

fn timing_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(\S+)\s*-->\s*(\S+)").expect("timing pattern is valid")
    })
}

/// Parse subtitle text into cues, collecting malformed blocks separately.
///
/// A malformed block never aborts parsing of the rest of the file.
pub fn parse_subtitles(content: &str) -> (Vec<Cue>, Vec<RejectedEntry>) {
    let normalized = content
        .trim_start_matches('\u{feff}')
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n");

    let mut cues = Vec::new();
    let mut rejected = Vec::new();

    let blocks = normalized
        .split("\n\n")
        .map(str::trim)
        .filter(|b| !b.is_empty());

    for (block_idx, block) in blocks.enumerate() {
        let block_no = block_idx + 1;
        let lines: Vec<&str> = block.lines().collect();

        if is_vtt_metadata(&lines) {
            continue;
        }

        let Some(timing_pos) = lines.iter().position(|l| l.contains("-->")) else {
            rejected.push(RejectedEntry {
                block: block_no,
                reason: "no timing line".to_string(),
            });
            continue;
        };

        match parse_timing(lines[timing_pos]) {
            Ok((start, end)) => {
                let text = lines[timing_pos + 1..]
                    .iter()
                    .map(|l| l.trim())
                    .collect::<Vec<_>>()
                    .join("\n");
                cues.push(Cue::new(cues.len(), start, end, text));
            }
            Err(reason) => rejected.push(RejectedEntry {
                block: block_no,
                reason,
            }),
        }
    }

    (cues, rejected)
}

fn is_vtt_metadata(lines: &[&str]) -> bool {
    lines.first().is_some_and(|first| {
        first.starts_with("WEBVTT")
            || first.starts_with("NOTE")
            || first.starts_with("STYLE")
            || first.starts_with("REGION")
    }) && !lines.iter().any(|l| l.contains("-->"))
}

fn parse_timing(line: &str) -> std::result::Result<(f64, f64), String> {
    let caps = timing_regex()
        .captures(line)
        .ok_or_else(|| format!("malformed timing line '{}'", line))?;

    let start = timestamp_to_seconds(&caps[1]).map_err(|e| e.to_string())?;
    let end = timestamp_to_seconds(&caps[2]).map_err(|e| e.to_string())?;

    if start > end {
        return Err(format!(
            "cue ends before it starts ({} --> {})",
            &caps[1], &caps[2]
        ));
    }
    Ok((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_SRT: &str = "1\r\n00:00:01,000 --> 00:00:02,500\r\nHello there.\r\n\r\n2\r\n00:00:03,000 --> 00:00:04,000\r\nTwo\r\nlines\r\n\r\n";

    #[test]
    fn test_parse_srt() {
        let (cues, rejected) = parse_subtitles(SAMPLE_SRT);
        assert!(rejected.is_empty());
        assert_eq!(cues.len(), 2);
        assert_eq!(cues[0], Cue::new(0, 1.0, 2.5, "Hello there."));
        assert_eq!(cues[1].text, "Two\nlines");
        assert_eq!(cues[1].index, 1);
    }

    #[test]
    fn test_parse_vtt() {
        let vtt = "\u{feff}WEBVTT\n\nNOTE a comment\n\nintro\n00:01.000 --> 00:02.000 align:start\n<i>Hi</i>\n\n00:00:03.000 --> 00:00:05.000\nBye\n";
        let (cues, rejected) = parse_subtitles(vtt);
        assert!(rejected.is_empty());
        assert_eq!(cues.len(), 2);
        assert_eq!(cues[0].start, 1.0);
        assert_eq!(cues[0].text, "<i>Hi</i>");
        assert_eq!(cues[1].end, 5.0);
    }

    #[test]
    fn test_malformed_block_is_reported_not_fatal() {
        let srt = "1\n00:00:01,000 --> 00:00:0x,000\nBroken\n\n2\n00:00:03,000 --> 00:00:04,000\nFine\n\n3\nno timing here\n";
        let (cues, rejected) = parse_subtitles(srt);
        assert_eq!(cues.len(), 1);
        assert_eq!(cues[0].text, "Fine");
        assert_eq!(cues[0].index, 0);
        assert_eq!(rejected.len(), 2);
        assert_eq!(rejected[0].block, 1);
        assert_eq!(rejected[1].block, 3);
    }

    #[test]
    fn test_reversed_cue_rejected() {
        let srt = "1\n00:00:05,000 --> 00:00:04,000\nBackwards\n";
        let (cues, rejected) = parse_subtitles(srt);
        assert!(cues.is_empty());
        assert_eq!(rejected.len(), 1);
    }

    #[test]
    fn test_out_of_range_timestamp_rejects_only_its_block() {
        let srt = "1
99999999999999999:00:00,000 --> 99999999999999999:00:01,000
Huge

                   2
00:00:03,000 --> 00:00:04,000
Fine
";
        let (cues, rejected) = parse_subtitles(srt);
        assert_eq!(cues.len(), 1);
        assert_eq!(cues[0].text, "Fine");
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].block, 1);
        assert!(rejected[0].reason.contains("out of range"));
    }
}
