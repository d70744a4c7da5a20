// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! On-disk naming for locked resources

use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Suffix appended to a lock path to name its heartbeat file
pub const HEARTBEAT_SUFFIX: &str = ".2";

/// Suffix appended to a resource path to name its lock file
pub const LOCK_SUFFIX: &str = ".lock";

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut raw = OsString::from(path.as_os_str());
    raw.push(suffix);
    PathBuf::from(raw)
}

/// Heartbeat file guarding the lock at `lock_path`
pub fn heartbeat_path(lock_path: &Path) -> PathBuf {
    with_suffix(lock_path, HEARTBEAT_SUFFIX)
}

/// Lock file conventionally used to protect `resource`
pub fn lock_path_for(resource: &Path) -> PathBuf {
    with_suffix(resource, LOCK_SUFFIX)
}

/// Every auxiliary file the locking protocol may leave next to `resource`
pub fn associated_files(resource: &Path) -> Vec<PathBuf> {
    let lock = lock_path_for(resource);
    let heartbeat = heartbeat_path(&lock);
    vec![lock, heartbeat]
}
