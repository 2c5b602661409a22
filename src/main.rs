//! cuesplice CLI entry point.

use anyhow::Result;
use clap::Parser;
use cuesplice::cli::{commands, Cli, Commands};
use cuesplice::config::Settings;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config_path = match &cli.config {
        Some(path) => Settings::expand_path(path),
        None => Settings::default_config_path(),
    };
    let settings = Settings::load_from(Some(&config_path))?;

    // Initialize logging: -v flags win, then the config file's level
    let log_level = match cli.verbose {
        0 => settings.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| format!("cuesplice={}", log_level)),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    // Execute command
    match &cli.command {
        Commands::Run {
            video,
            subtitles,
            output,
            work_dir,
            cleanup,
            json,
            options,
            media,
        } => {
            commands::run_splice(
                video,
                subtitles,
                output.clone(),
                work_dir.clone(),
                *cleanup,
                *json,
                options,
                media,
                settings,
            )
            .await?;
        }

        Commands::Plan {
            subtitles,
            format,
            options,
        } => {
            commands::run_plan(subtitles, format, options, settings)?;
        }

        Commands::Tone {
            output,
            style,
            duration,
            frequency,
        } => {
            commands::run_tone(output, *style, *duration, *frequency, settings).await?;
        }

        Commands::Doctor => {
            commands::run_doctor(&settings, &config_path)?;
        }

        Commands::Config { action } => {
            commands::run_config(action, settings, &config_path)?;
        }
    }

    Ok(())
}
