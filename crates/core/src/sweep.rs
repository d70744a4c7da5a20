// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deletion of expired log files

use crate::clock::Clock;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// What a sweep removed
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub removed: usize,
    pub bytes_removed: u64,
}

/// Recursively delete regular files under `root` last modified more than
/// `max_age` ago. Files that cannot be inspected or removed are skipped.
pub fn sweep_expired(root: &Path, max_age: Duration, clock: &impl Clock) -> SweepStats {
    let now = clock.now();
    let mut stats = SweepStats::default();

    for entry in WalkDir::new(root) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                // A missing root shows up here too
                debug!(root = %root.display(), error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let meta = match entry.metadata() {
            Ok(meta) => meta,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to stat file");
                continue;
            }
        };
        let age = match meta.modified() {
            Ok(mtime) => now.duration_since(mtime).unwrap_or(Duration::ZERO),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "file has no modification time");
                continue;
            }
        };
        if age <= max_age {
            continue;
        }

        debug!(
            path = %path.display(),
            age_hours = age.as_secs_f64() / 3600.0,
            "deleting expired file"
        );
        match std::fs::remove_file(path) {
            Ok(()) => {
                stats.removed += 1;
                stats.bytes_removed += meta.len();
            }
            Err(e) => warn!(path = %path.display(), error = %e, "failed to delete expired file"),
        }
    }

    stats
}

#[cfg(test)]
#[path = "sweep_tests.rs"]
mod tests;
