//! # pushbridge
//!
//! Push bridge binary. Loads settings, installs logging, and replays
//! scripted transport and host steps through the router, printing every
//! event a host receives as one JSON line on stdout.

#![deny(unsafe_code)]

mod replay;
mod script;

use std::io::BufWriter;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;
use tracing::info;

use pushbridge_core::logging::{init_json_subscriber, init_subscriber};
use pushbridge_router::metrics::{install_recorder, render};
use pushbridge_settings::{get_settings, reload_settings_from_path};

use crate::replay::{CounterTotals, Replay, load_script};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Push message bridge.
#[derive(Parser, Debug)]
#[command(name = "pushbridge", about = "Push message bridge")]
struct Cli {
    /// Settings file to load instead of `~/.pushbridge/settings.json`.
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Write the Prometheus metrics text to stderr when done.
    #[arg(long, global = true)]
    metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay a JSON-lines script of transport and host steps.
    Replay {
        /// Path to the script.
        script: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = match cli.settings {
        Some(ref path) => reload_settings_from_path(path)
            .with_context(|| format!("Failed to load settings: {}", path.display()))?,
        None => get_settings(),
    };

    if settings.logging.json {
        init_json_subscriber(&settings.logging.level);
    } else {
        init_subscriber(&settings.logging.level);
    }
    let metrics = install_recorder().context("Failed to install metrics recorder")?;

    match cli.command {
        Command::Replay { script } => {
            let text = load_script(&script).await?;
            let mut replay = Replay::new(settings, BufWriter::new(std::io::stdout()));
            let summary = replay.run_script(&text).await?;
            let rendered = render(&metrics);
            let totals = CounterTotals::from_rendered(&rendered);
            info!(
                script = %script.display(),
                steps = summary.steps,
                emitted = summary.emitted,
                malformed = summary.malformed,
                delivered = totals.emitted,
                dropped = totals.dropped,
                buffered = totals.buffered,
                flushed = totals.flushed,
                emit_failures = totals.emit_failures,
                "replay finished"
            );
            if cli.metrics {
                eprint!("{rendered}");
            }
        }
    }
    Ok(())
}
