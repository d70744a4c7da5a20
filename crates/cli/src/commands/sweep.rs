// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `deadbolt sweep <dir>` - Delete expired files under a log directory

use anyhow::Result;
use clap::Args;
use deadbolt_core::{sweep_expired, Settings, SystemClock};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::info;

#[derive(Args)]
pub struct SweepArgs {
    /// Directory to sweep recursively
    pub dir: PathBuf,

    /// Delete files older than this (e.g. "24h")
    #[arg(long, value_parser = humantime::parse_duration)]
    pub max_age: Option<Duration>,
}

pub fn handle(args: SweepArgs, settings: Settings) -> Result<ExitCode> {
    let max_age = args.max_age.unwrap_or(settings.sweep.max_age);
    let stats = sweep_expired(&args.dir, max_age, &SystemClock);

    info!(
        dir = %args.dir.display(),
        removed = stats.removed,
        bytes = stats.bytes_removed,
        "sweep finished"
    );
    println!(
        "Removed {} file(s), {} bytes",
        stats.removed, stats.bytes_removed
    );
    Ok(ExitCode::SUCCESS)
}
