// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Errors surfaced to callers of the resilient lock

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Acquisition failure. Heartbeat bookkeeping and recovery errors are
/// handled internally, so running out of time is the only outcome of a plain
/// `acquire`; `Cancelled` only comes from `acquire_or_cancel`.
#[derive(Debug, Error)]
pub enum LockError {
    #[error(
        "timed out after {} acquiring lock on {}{}",
        humantime::format_duration(whole_millis(.waited)),
        .path.display(),
        cause_suffix(.last_error)
    )]
    Timeout {
        path: PathBuf,
        waited: Duration,
        /// Most recent primary lock failure other than contention, if any
        last_error: Option<String>,
    },

    #[error(
        "cancelled after {} waiting for lock on {}",
        humantime::format_duration(whole_millis(.waited)),
        .path.display()
    )]
    Cancelled { path: PathBuf, waited: Duration },
}

impl LockError {
    pub fn path(&self) -> &std::path::Path {
        match self {
            LockError::Timeout { path, .. } | LockError::Cancelled { path, .. } => path,
        }
    }

    pub fn waited(&self) -> Duration {
        match self {
            LockError::Timeout { waited, .. } | LockError::Cancelled { waited, .. } => *waited,
        }
    }
}

fn whole_millis(duration: &Duration) -> Duration {
    Duration::from_millis(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}

fn cause_suffix(last_error: &Option<String>) -> String {
    match last_error {
        Some(e) => format!(" (last error: {})", e),
        None => String::new(),
    }
}
