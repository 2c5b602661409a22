//! Error types for cuesplice.

use thiserror::Error;

/// Library-level error type for cuesplice operations.
#[derive(Error, Debug)]
pub enum SpliceError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid segment: {0}")]
    InvalidSegment(String),

    #[error("Clip extraction failed: {0}")]
    Extraction(String),

    #[error("Synthesis failed: {0}")]
    Synthesis(String),

    #[error("Duration probe failed: {0}")]
    Probe(String),

    #[error("Concatenation failed: {0}")]
    Concatenation(String),

    #[error("External tool not found: {0}. Please install it and ensure it's in your PATH.")]
    ToolNotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Run cancelled by user")]
    Cancelled,

    #[error("No valid segments to concatenate")]
    NoSegments,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

impl SpliceError {
    /// Whether this error is contained to a single segment.
    ///
    /// Segment-level failures trigger fallback substitution; everything else
    /// ends the run.
    pub fn is_segment_failure(&self) -> bool {
        matches!(
            self,
            SpliceError::Extraction(_)
                | SpliceError::Synthesis(_)
                | SpliceError::Probe(_)
                | SpliceError::ToolNotFound(_)
                | SpliceError::InvalidSegment(_)
        )
    }
}

/// Result type alias for cuesplice operations.
pub type Result<T> = std::result::Result<T, SpliceError>;
