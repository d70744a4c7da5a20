// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Kernel advisory lock via fs2

use super::{ensure_parent, poll_until, PrimaryLock, PrimaryLockError};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

/// Exclusive `flock`-style lock on a file.
///
/// Each handle opens its own descriptor, so two handles in one process
/// contend with each other just like two processes do. The kernel drops
/// the lock when the holding process exits, which means a forced release
/// can only ever give up this handle's own claim.
#[derive(Debug)]
pub struct FlockPrimary {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl FlockPrimary {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: Mutex::new(None),
        }
    }
}

fn is_contended(e: &std::io::Error) -> bool {
    e.kind() == std::io::ErrorKind::WouldBlock
        || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

impl PrimaryLock for FlockPrimary {
    fn path(&self) -> &Path {
        &self.path
    }

    fn acquire(&self, timeout: Duration) -> Result<(), PrimaryLockError> {
        let mut held = self.file.lock().unwrap_or_else(|e| e.into_inner());
        if held.is_some() {
            return Ok(());
        }

        ensure_parent(&self.path)?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .map_err(|e| PrimaryLockError::io(&self.path, "open lock file", e))?;

        poll_until(&self.path, timeout, || match file.try_lock_exclusive() {
            Ok(()) => Ok(true),
            Err(e) if is_contended(&e) => Ok(false),
            Err(e) => Err(PrimaryLockError::io(&self.path, "lock", e)),
        })?;

        *held = Some(file);
        Ok(())
    }

    fn release(&self, _force: bool) -> Result<(), PrimaryLockError> {
        let taken = self
            .file
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();

        match taken {
            // Closing the descriptor unlocks even if the explicit unlock fails
            Some(file) => FileExt::unlock(&file)
                .map_err(|e| PrimaryLockError::io(&self.path, "unlock", e)),
            None => Ok(()),
        }
    }

    fn is_locked(&self) -> bool {
        self.file
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }
}
