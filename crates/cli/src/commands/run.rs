// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `deadbolt run <lock> -- <command>` - Run a command while holding a lock

use super::LockArgs;
use crate::error::CliError;
use anyhow::{anyhow, Context, Result};
use clap::Args;
use deadbolt_core::{AcquireTimeout, LockError, ResilientLock, Settings, ShutdownFlag};
use std::path::PathBuf;
use std::process::{ExitCode, ExitStatus};
use std::time::Duration;
use tokio::process::Command;
use tokio::time::interval;
use tracing::{info, warn};

/// Exit status when the lock could not be acquired (EX_TEMPFAIL)
pub const LOCK_TIMEOUT_EXIT: u8 = 75;

/// Exit status when shutdown was requested before the command started
pub const INTERRUPTED_EXIT: u8 = 130;

const SHUTDOWN_POLL: Duration = Duration::from_millis(200);
const MIN_REFRESH: Duration = Duration::from_millis(10);

#[derive(Args)]
pub struct RunArgs {
    /// Lock file guarding the resource
    pub lock: PathBuf,

    /// Overall wait in seconds; 0 fails at once, negative waits forever
    #[arg(long, allow_negative_numbers = true)]
    pub timeout: Option<f64>,

    /// How often to refresh the heartbeat while the command runs (e.g. "30s")
    #[arg(long, value_parser = humantime::parse_duration)]
    pub heartbeat_interval: Option<Duration>,

    #[command(flatten)]
    pub lock_args: LockArgs,

    /// Command to run while holding the lock
    #[arg(last = true, required = true)]
    pub command: Vec<String>,
}

pub async fn handle(args: RunArgs, settings: Settings) -> Result<ExitCode> {
    let shutdown = ShutdownFlag::new();
    let flag = shutdown.clone();
    ctrlc::set_handler(move || flag.trigger())?;

    let config = args.lock_args.apply(settings.lock);
    let refresh_every = args
        .heartbeat_interval
        .unwrap_or(config.heartbeat_interval)
        .max(MIN_REFRESH);
    let timeout = args
        .timeout
        .map_or(AcquireTimeout::Default, AcquireTimeout::from_secs_f64);
    let lock = ResilientLock::open(&args.lock, config);

    let acquired = tokio::task::block_in_place(|| lock.acquire_or_cancel(timeout, &shutdown));
    let guard = match acquired {
        Ok(guard) => guard,
        Err(LockError::Cancelled { .. }) => {
            warn!(lock = %args.lock.display(), "shutdown requested while waiting for lock");
            return Ok(ExitCode::from(INTERRUPTED_EXIT));
        }
        Err(e) => {
            eprint!("{}", CliError::lock_timeout(&args.lock, e));
            return Ok(ExitCode::from(LOCK_TIMEOUT_EXIT));
        }
    };
    info!(lock = %args.lock.display(), "lock acquired");

    if shutdown.is_triggered() {
        warn!(lock = %args.lock.display(), "shutdown requested, not starting command");
        guard.release();
        return Ok(ExitCode::from(INTERRUPTED_EXIT));
    }

    let (program, rest) = args
        .command
        .split_first()
        .ok_or_else(|| anyhow!("no command given"))?;
    let mut child = Command::new(program)
        .args(rest)
        .spawn()
        .with_context(|| format!("failed to start {}", program))?;

    let mut refresh_timer = interval(refresh_every);
    let mut shutdown_timer = interval(SHUTDOWN_POLL);

    // Skip initial immediate tick; acquire just touched the heartbeat
    refresh_timer.tick().await;

    let status = loop {
        tokio::select! {
            status = child.wait() => break status?,
            _ = refresh_timer.tick() => guard.refresh(),
            _ = shutdown_timer.tick() => {
                if shutdown.is_triggered() {
                    warn!(command = %program, "shutdown requested, stopping command");
                    child.kill().await?;
                    break child.wait().await?;
                }
            }
        }
    };

    guard.release();
    info!(lock = %args.lock.display(), ?status, "lock released");
    Ok(exit_code(status))
}

fn exit_code(status: ExitStatus) -> ExitCode {
    status
        .code()
        .and_then(|code| u8::try_from(code).ok())
        .map_or(ExitCode::FAILURE, ExitCode::from)
}
