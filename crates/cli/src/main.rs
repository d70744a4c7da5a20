// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! deadbolt - run commands under a deadlock-resistant file lock

mod commands;
mod error;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{run, status, sweep};
use deadbolt_core::Settings;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(
    name = "deadbolt",
    version,
    about = "Deadlock-resistant file locking"
)]
struct Cli {
    /// Settings file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a command while holding a lock
    Run(run::RunArgs),
    /// Show lock and heartbeat state
    Status(status::StatusArgs),
    /// Delete expired files under a log directory
    Sweep(sweep::SweepArgs),
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    setup_logging();
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };

    match cli.command {
        Commands::Run(args) => run::handle(args, settings).await,
        Commands::Status(args) => status::handle(args, settings),
        Commands::Sweep(args) => sweep::handle(args, settings),
    }
}

fn setup_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}
