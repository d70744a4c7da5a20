// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `deadbolt status <lock>` - Show lock and heartbeat state

use super::LockArgs;
use anyhow::Result;
use clap::Args;
use deadbolt_core::{LockStatus, ResilientLock, Settings};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

#[derive(Args)]
pub struct StatusArgs {
    /// Lock file to inspect
    pub lock: PathBuf,

    #[command(flatten)]
    pub lock_args: LockArgs,

    /// Print machine-readable JSON
    #[arg(long)]
    pub json: bool,
}

pub fn handle(args: StatusArgs, settings: Settings) -> Result<ExitCode> {
    let config = args.lock_args.apply(settings.lock);
    let expire = config.expire;
    let lock = ResilientLock::open(&args.lock, config);
    let status = lock.status();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        print!("{}", render(&status, expire));
    }
    Ok(ExitCode::SUCCESS)
}

fn render(status: &LockStatus, expire: Duration) -> String {
    let held = match status.held {
        Some(true) => "yes",
        Some(false) => "no",
        None => "unknown",
    };
    let last_beat = match (status.heartbeat_at, status.heartbeat_age) {
        (Some(at), Some(age)) => format!(
            "{} ({} ago)",
            at.to_rfc3339(),
            humantime::format_duration(Duration::from_secs(age.as_secs()))
        ),
        _ => "missing".to_string(),
    };
    let expired = if status.expired { "yes" } else { "no" };

    let mut out = String::new();
    out.push_str(&format!("Lock:       {}\n", status.resource.display()));
    out.push_str(&format!("Held:       {}\n", held));
    out.push_str(&format!("Heartbeat:  {}\n", status.heartbeat.display()));
    out.push_str(&format!("Last beat:  {}\n", last_beat));
    out.push_str(&format!(
        "Expired:    {} (after {})\n",
        expired,
        humantime::format_duration(expire)
    ));
    out
}
