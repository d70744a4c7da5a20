// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake primary lock for testing

use super::{PrimaryLock, PrimaryLockError};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Owner id used for a simulated process outside the test's handles
const THIRD_PARTY: u64 = 0;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Recorded call to a fake primary lock
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrimaryCall {
    Acquire { timeout: Duration },
    Release { force: bool },
}

#[derive(Debug, Default)]
struct SharedState {
    owner: Option<u64>,
    /// Third party grabs the lock again right after every forced release
    relentless: bool,
}

/// In-memory primary lock. Never blocks: a contended acquire times out
/// immediately.
///
/// Clones share both the lock state and the call log, so a test can keep a
/// clone to inspect calls made through a handle it moved elsewhere.
#[derive(Debug, Clone)]
pub struct FakePrimary {
    id: u64,
    path: PathBuf,
    state: Arc<Mutex<SharedState>>,
    calls: Arc<Mutex<Vec<PrimaryCall>>>,
}

impl FakePrimary {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::SeqCst),
            path: path.into(),
            state: Arc::new(Mutex::new(SharedState::default())),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Another handle on the same lock, with its own identity and call log
    pub fn contender(&self) -> Self {
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::SeqCst),
            path: self.path.clone(),
            state: Arc::clone(&self.state),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Simulate another process taking the lock
    pub fn seize(&self) {
        self.state().owner = Some(THIRD_PARTY);
    }

    pub fn set_relentless(&self, relentless: bool) {
        self.state().relentless = relentless;
    }

    pub fn is_free(&self) -> bool {
        self.state().owner.is_none()
    }

    pub fn calls(&self) -> Vec<PrimaryCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn forced_releases(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, PrimaryCall::Release { force: true }))
            .count()
    }

    pub fn acquire_attempts(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, PrimaryCall::Acquire { .. }))
            .count()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, SharedState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, call: PrimaryCall) {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(call);
    }
}

impl PrimaryLock for FakePrimary {
    fn path(&self) -> &Path {
        &self.path
    }

    fn acquire(&self, timeout: Duration) -> Result<(), PrimaryLockError> {
        self.record(PrimaryCall::Acquire { timeout });

        let mut state = self.state();
        match state.owner {
            None => {
                state.owner = Some(self.id);
                Ok(())
            }
            Some(owner) if owner == self.id => Ok(()),
            Some(_) => Err(PrimaryLockError::Timeout {
                path: self.path.clone(),
                timeout,
            }),
        }
    }

    fn release(&self, force: bool) -> Result<(), PrimaryLockError> {
        self.record(PrimaryCall::Release { force });

        let mut state = self.state();
        if force {
            state.owner = state.relentless.then_some(THIRD_PARTY);
        } else if state.owner == Some(self.id) {
            state.owner = None;
        }
        Ok(())
    }

    fn is_locked(&self) -> bool {
        self.state().owner == Some(self.id)
    }
}
