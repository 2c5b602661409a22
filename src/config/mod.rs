//! Configuration module for cuesplice.
//!
//! Settings are read from a TOML file and turned into the typed configs the
//! grouping, planning, media and assembly stages take.

mod settings;

pub use settings::{
    AudioSettings, FallbackSettings, GeneralSettings, GroupingSettings, MediaSettings,
    PlannerSettings, Settings, SpeechSettings, ToneSettings, VideoSettings,
};
