//! CLI command implementations.

mod config;
mod doctor;
mod plan;
mod run;
mod tone;

pub use config::run_config;
pub use doctor::run_doctor;
pub use plan::run_plan;
pub use run::{default_output_path, run_splice};
pub use tone::run_tone;
