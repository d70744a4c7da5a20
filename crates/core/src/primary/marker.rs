// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Marker-file lock
//!
//! The lock is held while the marker file exists. Creation uses `O_EXCL`
//! semantics so only one handle can win. The marker records a per-handle
//! token and the pid for diagnostics.

use super::{ensure_parent, poll_until, PrimaryLock, PrimaryLockError};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Lock represented by the existence of a file.
///
/// Unlike a kernel lock, the marker survives a crashed holder. Clearing an
/// orphaned marker takes a forced release.
#[derive(Debug)]
pub struct MarkerPrimary {
    path: PathBuf,
    token: String,
    held: AtomicBool,
}

impl MarkerPrimary {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            token: Uuid::new_v4().to_string(),
            held: AtomicBool::new(false),
        }
    }

    /// Whether the marker on disk carries this handle's token
    fn owns_marker(&self) -> bool {
        fs::read_to_string(&self.path)
            .map(|contents| contents.split_whitespace().next() == Some(self.token.as_str()))
            .unwrap_or(false)
    }

    fn remove_marker(&self) -> Result<(), PrimaryLockError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PrimaryLockError::io(&self.path, "remove lock marker", e)),
        }
    }

    fn try_create(&self) -> Result<bool, PrimaryLockError> {
        let file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => return Err(PrimaryLockError::io(&self.path, "create lock marker", e)),
        };

        self.record_owner(file)?;
        Ok(true)
    }

    /// Write the owner line into a freshly created marker.
    ///
    /// Ownership checks read the token back, so a marker without it would
    /// be one its creator can neither see as held nor release. On failure
    /// the marker is removed and the attempt fails.
    pub(super) fn record_owner(&self, mut out: impl Write) -> Result<(), PrimaryLockError> {
        let written =
            writeln!(out, "{} {}", self.token, std::process::id()).and_then(|()| out.flush());
        if let Err(e) = written {
            debug!(path = %self.path.display(), error = %e, "failed to record marker owner");
            self.remove_marker()?;
            return Err(PrimaryLockError::io(&self.path, "record owner in lock marker", e));
        }
        Ok(())
    }
}

impl PrimaryLock for MarkerPrimary {
    fn path(&self) -> &Path {
        &self.path
    }

    fn acquire(&self, timeout: Duration) -> Result<(), PrimaryLockError> {
        if self.is_locked() {
            return Ok(());
        }

        ensure_parent(&self.path)?;
        poll_until(&self.path, timeout, || self.try_create())?;
        self.held.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn release(&self, force: bool) -> Result<(), PrimaryLockError> {
        let was_held = self.held.swap(false, Ordering::SeqCst);

        if force {
            return self.remove_marker();
        }

        // Someone may have broken our lock and taken it since. The check and
        // the unlink are not atomic: a break and re-create landing between
        // them still loses the new owner's marker. Breaking needs a heartbeat
        // past `expire`, which a holder that is still releasing does not have.
        if was_held && self.owns_marker() {
            self.remove_marker()?;
        }
        Ok(())
    }

    fn is_locked(&self) -> bool {
        self.held.load(Ordering::SeqCst) && self.owns_marker()
    }
}
