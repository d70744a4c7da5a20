// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Heartbeat file maintenance
//!
//! The heartbeat is a zero-length file whose modification time is the only
//! liveness signal of a lock holder. Every operation here is best-effort:
//! I/O failures are logged and never propagated.

use crate::clock::{Clock, SystemClock};
use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// Marker file recording when a holder last proved liveness
#[derive(Clone, Debug)]
pub struct Heartbeat<C: Clock = SystemClock> {
    path: PathBuf,
    clock: C,
}

impl Heartbeat<SystemClock> {
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self::new(path, SystemClock)
    }
}

impl<C: Clock> Heartbeat<C> {
    pub fn new(path: impl Into<PathBuf>, clock: C) -> Self {
        Self {
            path: path.into(),
            clock,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the file if needed and stamp it with the current time
    pub fn touch(&self) {
        let file = match OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
        {
            Ok(file) => file,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to touch heartbeat");
                return;
            }
        };

        // Existence alone still gives a coarse signal
        if let Err(e) = file.set_modified(self.clock.now()) {
            debug!(path = %self.path.display(), error = %e, "heartbeat mtime not updated");
        }
    }

    /// Last modification time, or the epoch when the file cannot be stat'ed
    pub fn mtime(&self) -> SystemTime {
        fs::metadata(&self.path)
            .and_then(|meta| meta.modified())
            .unwrap_or(UNIX_EPOCH)
    }

    /// Time since the last touch; a missing heartbeat is maximally old
    pub fn age(&self) -> Duration {
        self.clock
            .now()
            .duration_since(self.mtime())
            .unwrap_or(Duration::ZERO)
    }

    pub fn is_expired(&self, expire: Duration) -> bool {
        self.age() > expire
    }

    /// Delete the heartbeat. Returns whether a file was actually removed.
    pub fn remove(&self) -> bool {
        match fs::remove_file(&self.path) {
            Ok(()) => true,
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "failed to remove heartbeat");
                false
            }
        }
    }
}

#[cfg(test)]
#[path = "heartbeat_tests.rs"]
mod tests;
