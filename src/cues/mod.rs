//! Subtitle cues and the store that owns them for one run.

mod reader;

pub use reader::{parse_subtitles, RejectedEntry};

use crate::error::{Result, SpliceError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, warn};

/// A single timestamped subtitle entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cue {
    /// 0-based position in source order.
    pub index: usize,
    /// Start time in seconds.
    pub start: f64,
    /// End time in seconds.
    pub end: f64,
    /// Cue text, line breaks preserved.
    pub text: String,
}

impl Cue {
    pub fn new(index: usize, start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            index,
            start,
            end,
            text: text.into(),
        }
    }
}

/// Ordered, immutable sequence of cues.
#[derive(Debug, Clone, Default)]
pub struct CueStore {
    cues: Vec<Cue>,
}

/// Result of loading a subtitle file: the accepted cues plus the entries
/// that could not be parsed.
#[derive(Debug)]
pub struct LoadedCues {
    pub store: CueStore,
    pub rejected: Vec<RejectedEntry>,
}

impl CueStore {
    /// Build a store from cues, checking indices and time ordering per cue.
    pub fn new(cues: Vec<Cue>) -> Result<Self> {
        for (pos, cue) in cues.iter().enumerate() {
            if cue.index != pos {
                return Err(SpliceError::InvalidInput(format!(
                    "cue at position {} carries index {}",
                    pos, cue.index
                )));
            }
            if cue.start.is_nan() || cue.end.is_nan() || cue.start > cue.end {
                return Err(SpliceError::InvalidInput(format!(
                    "cue {} ends before it starts ({} > {})",
                    pos, cue.start, cue.end
                )));
            }
        }
        Ok(Self { cues })
    }

    /// Load cues from a SubRip (`.srt`) or WebVTT (`.vtt`) file.
    ///
    /// Files that are not valid UTF-8 are decoded as Latin-1.
    pub fn load(path: &Path) -> Result<LoadedCues> {
        let bytes = std::fs::read(path)?;
        let content = match String::from_utf8(bytes) {
            Ok(s) => s,
            Err(e) => {
                warn!("{} is not UTF-8, decoding as Latin-1", path.display());
                e.into_bytes().iter().map(|&b| b as char).collect()
            }
        };

        let (cues, rejected) = parse_subtitles(&content);
        for entry in &rejected {
            warn!("Skipping subtitle block {}: {}", entry.block, entry.reason);
        }
        info!("Loaded {} cues from {}", cues.len(), path.display());

        let store = Self::new(cues)?;
        if !store.is_chronological() {
            warn!("Cues are not sorted by start time; grouping keeps file order");
        }
        debug!(
            "Cue span: {:.3}s - {:.3}s",
            store.cues.first().map(|c| c.start).unwrap_or(0.0),
            store.cues.last().map(|c| c.end).unwrap_or(0.0)
        );

        Ok(LoadedCues { store, rejected })
    }

    pub fn cues(&self) -> &[Cue] {
        &self.cues
    }

    pub fn len(&self) -> usize {
        self.cues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cues.is_empty()
    }

    /// Whether start times never decrease.
    pub fn is_chronological(&self) -> bool {
        self.cues.windows(2).all(|w| w[0].start <= w[1].start)
    }
}
