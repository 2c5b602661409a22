//! cuesplice - subtitle-driven audio extraction and splicing
//!
//! A CLI tool and library that reads a subtitle file, groups its cues into
//! dialogue groups, cuts each group's audio out of a source video, and splices
//! the clips into a single audio track.
//!
//! # Overview
//!
//! cuesplice allows you to:
//! - Parse SRT and WebVTT subtitles, keeping a record of rejected entries
//! - Group cues by silence gaps and select a subset of groups
//! - Lay out clips with separator tones, silence and narrated cue text
//! - Recover from failed segments with silence or placeholder narration
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - `timecode` - Timestamp conversion
//! - `cues` - Subtitle parsing and the cue store
//! - `grouping` - Dialogue grouping and group selection
//! - `planner` - Segment planning per layout
//! - `media` - External media tools (ffmpeg, speech engines)
//! - `timeline` - Segment realization state and timeline assembly
//! - `pipeline` - Run coordination
//! - `config` - Configuration management
//!
//! # Example
//!
//! ```rust,no_run
//! use cuesplice::config::Settings;
//! use cuesplice::pipeline::{Pipeline, RunRequest};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let pipeline = Pipeline::new(settings)?;
//!
//!     let report = pipeline
//!         .run(&RunRequest {
//!             source: "movie.mp4".into(),
//!             subtitles: "movie.srt".into(),
//!             output: "dialogue.mp3".into(),
//!             work_dir: None,
//!         })
//!         .await?;
//!     println!("Spliced {} segments", report.timeline_entries);
//!
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod cues;
pub mod error;
pub mod grouping;
pub mod media;
pub mod pipeline;
pub mod planner;
pub mod timecode;
pub mod timeline;

pub use error::{Result, SpliceError};
