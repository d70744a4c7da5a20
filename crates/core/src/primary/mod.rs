// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Primary lock collaborators
//!
//! A primary lock is the exclusive lock the resilient lock wraps. Two real
//! implementations are provided:
//! - **FlockPrimary** - kernel advisory lock; released by the OS when the
//!   holding process dies
//! - **MarkerPrimary** - held while a marker file exists; an orphaned marker
//!   can only be cleared by a forced release

mod flock;
mod marker;

#[cfg(any(test, feature = "test-support"))]
mod fake;

pub use flock::FlockPrimary;
pub use marker::MarkerPrimary;

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakePrimary, PrimaryCall};

use crate::backoff::Backoff;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors from primary lock operations
#[derive(Debug, Error)]
pub enum PrimaryLockError {
    #[error("timed out after {timeout:?} waiting for {}", .path.display())]
    Timeout { path: PathBuf, timeout: Duration },

    #[error("failed to {operation} {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl PrimaryLockError {
    pub(crate) fn io(path: &Path, operation: &'static str, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            operation,
            source,
        }
    }
}

/// Exclusive lock bound to a path
pub trait PrimaryLock: Send + Sync {
    fn path(&self) -> &Path;

    /// Wait up to `timeout` for the lock. Acquiring a lock this handle
    /// already holds succeeds immediately.
    fn acquire(&self, timeout: Duration) -> Result<(), PrimaryLockError>;

    /// Release the lock. With `force`, release regardless of who holds it.
    fn release(&self, force: bool) -> Result<(), PrimaryLockError>;

    /// Whether this handle currently holds the lock
    fn is_locked(&self) -> bool;
}

impl<T: PrimaryLock + ?Sized> PrimaryLock for Box<T> {
    fn path(&self) -> &Path {
        (**self).path()
    }

    fn acquire(&self, timeout: Duration) -> Result<(), PrimaryLockError> {
        (**self).acquire(timeout)
    }

    fn release(&self, force: bool) -> Result<(), PrimaryLockError> {
        (**self).release(force)
    }

    fn is_locked(&self) -> bool {
        (**self).is_locked()
    }
}

/// Which primary lock implementation to use
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimaryKind {
    #[default]
    Flock,
    Marker,
}

impl std::fmt::Display for PrimaryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrimaryKind::Flock => write!(f, "flock"),
            PrimaryKind::Marker => write!(f, "marker"),
        }
    }
}

/// Open a primary lock of the given kind at `path`
pub fn open_primary(kind: PrimaryKind, path: impl Into<PathBuf>) -> Box<dyn PrimaryLock> {
    match kind {
        PrimaryKind::Flock => Box::new(FlockPrimary::new(path)),
        PrimaryKind::Marker => Box::new(MarkerPrimary::new(path)),
    }
}

fn ensure_parent(path: &Path) -> Result<(), PrimaryLockError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent)
            .map_err(|e| PrimaryLockError::io(path, "create parent directories of", e)),
        _ => Ok(()),
    }
}

/// Run `attempt` until it reports success or `timeout` elapses.
///
/// The attempt always runs at least once, so a zero timeout means a single
/// non-blocking try.
fn poll_until<F>(path: &Path, timeout: Duration, mut attempt: F) -> Result<(), PrimaryLockError>
where
    F: FnMut() -> Result<bool, PrimaryLockError>,
{
    let start = Instant::now();
    let mut backoff = Backoff::new();

    loop {
        if attempt()? {
            return Ok(());
        }

        let elapsed = start.elapsed();
        if elapsed >= timeout {
            return Err(PrimaryLockError::Timeout {
                path: path.to_path_buf(),
                timeout,
            });
        }

        backoff.sleep(Some(timeout - elapsed));
    }
}
