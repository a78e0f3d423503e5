mod cli;
mod command;
mod engine;
mod error;
mod model;
mod orchestrator;
mod report;
#[cfg(feature = "tui")]
mod tui;

use anyhow::{Context, Result};
use clap::Parser;
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Diagnostics go to stderr for the line-oriented modes and to a file while
/// the TUI owns the terminal.
fn init_tracing(args: &cli::Cli) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| "audio_converter=info".into());

    if args.is_non_tui() {
        // Keep stderr quiet unless asked; it carries the job's status lines.
        let filter = if std::env::var_os("RUST_LOG").is_some() {
            filter
        } else {
            "audio_converter=warn".into()
        };
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
        return Ok(());
    }

    let path = args.log_file.clone().unwrap_or_else(cli::default_log_path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create log directory {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open log file {}", path.display()))?;
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    let is_non_tui = args.is_non_tui();
    init_tracing(&args)?;

    match cli::run(args).await {
        Ok(()) => {
            // Explicitly exit with code 0 on success, especially for non-TUI modes
            if is_non_tui {
                std::process::exit(0);
            }
            Ok(())
        }
        Err(e) => {
            tracing::debug!("Exiting with error: {:#}", e);
            Err(e)
        }
    }
}
