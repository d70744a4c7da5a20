// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resilient file lock
//!
//! Wraps a primary exclusive lock with a heartbeat file. A waiter that keeps
//! timing out on the primary lock looks at the heartbeat; once it is older
//! than the expiry threshold the holder is presumed dead, its lock is broken
//! and acquisition is retried. Recovery recursion is capped so a resource
//! that is instantly re-taken after every break cannot trap a waiter.

use crate::backoff::Backoff;
use crate::clock::{Clock, SystemClock};
use crate::config::LockConfig;
use crate::error::LockError;
use crate::heartbeat::Heartbeat;
use crate::paths;
use crate::primary::{open_primary, PrimaryLock, PrimaryLockError};
use crate::shutdown::ShutdownFlag;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant, UNIX_EPOCH};
use tracing::{info, warn};

/// Deepest recovery retry; past this an attempt fails outright
pub const MAX_RECOVERY_DEPTH: u32 = 2;

/// How long `acquire` may keep retrying
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AcquireTimeout {
    /// Use the lock's configured `acquire_timeout`
    #[default]
    Default,
    /// Make one attempt and give up
    Immediate,
    /// Never give up
    Forever,
    /// Give up once this much time has passed
    Within(Duration),
}

impl AcquireTimeout {
    /// Numeric convention: negative waits forever, zero is immediate
    pub fn from_secs_f64(secs: f64) -> Self {
        if secs == 0.0 {
            return AcquireTimeout::Immediate;
        }
        if secs < 0.0 {
            return AcquireTimeout::Forever;
        }
        match Duration::try_from_secs_f64(secs) {
            Ok(duration) => AcquireTimeout::Within(duration),
            Err(_) => AcquireTimeout::Forever,
        }
    }

    /// Effective budget, `None` meaning unbounded
    fn budget(self, default: Duration) -> Option<Duration> {
        match self {
            AcquireTimeout::Default => Some(default),
            AcquireTimeout::Immediate => Some(Duration::ZERO),
            AcquireTimeout::Forever => None,
            AcquireTimeout::Within(duration) => Some(duration),
        }
    }
}

impl From<Option<Duration>> for AcquireTimeout {
    fn from(timeout: Option<Duration>) -> Self {
        match timeout {
            None => AcquireTimeout::Default,
            Some(duration) if duration.is_zero() => AcquireTimeout::Immediate,
            Some(duration) => AcquireTimeout::Within(duration),
        }
    }
}

/// Outcome of a single attempt
#[derive(Debug)]
pub(crate) enum Attempt {
    Acquired,
    /// Held by a live holder, or recovery gave up
    Busy,
    /// The primary lock failed for a reason other than contention
    Failed(PrimaryLockError),
}

/// Snapshot of a lock as seen from one handle
#[derive(Clone, Debug, Serialize)]
pub struct LockStatus {
    pub resource: PathBuf,
    pub heartbeat: PathBuf,
    /// Last heartbeat, if the file exists
    pub heartbeat_at: Option<DateTime<Utc>>,
    #[serde(with = "humantime_serde")]
    pub heartbeat_age: Option<Duration>,
    pub expired: bool,
    /// Whether anyone holds the primary lock; `None` if probing failed
    pub held: Option<bool>,
}

/// Deadlock-resistant lock on one resource path.
///
/// A handle hands out at most one [`LockGuard`] at a time. Threads sharing a
/// handle contend with each other like separate handles do; acquiring again
/// on a thread that still holds a guard waits for that guard, so it is not
/// reentrant.
pub struct ResilientLock<P: PrimaryLock = Box<dyn PrimaryLock>, C: Clock = SystemClock> {
    primary: P,
    heartbeat: Heartbeat<C>,
    config: LockConfig,
    /// Set while a guard or a status probe owns this handle's primary lock
    claimed: AtomicBool,
}

impl ResilientLock {
    /// Lock on `path` using the primary implementation named in `config`
    pub fn open(path: impl Into<PathBuf>, config: LockConfig) -> Self {
        let primary = open_primary(config.primary, path);
        Self::with_primary(primary, config, SystemClock)
    }
}

impl<P: PrimaryLock, C: Clock> ResilientLock<P, C> {
    pub fn with_primary(primary: P, config: LockConfig, clock: C) -> Self {
        let heartbeat = Heartbeat::new(paths::heartbeat_path(primary.path()), clock);
        Self {
            primary,
            heartbeat,
            config,
            claimed: AtomicBool::new(false),
        }
    }

    pub fn resource_path(&self) -> &Path {
        self.primary.path()
    }

    pub fn heartbeat(&self) -> &Heartbeat<C> {
        &self.heartbeat
    }

    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    /// Whether the heartbeat is old enough to presume the holder dead
    pub fn is_expired(&self) -> bool {
        self.heartbeat.is_expired(self.config.expire)
    }

    /// Block until the lock is held or `timeout` runs out.
    ///
    /// On success the primary lock is held and the heartbeat freshly
    /// touched. The returned guard releases both when dropped.
    pub fn acquire(&self, timeout: AcquireTimeout) -> Result<LockGuard<'_, P, C>, LockError> {
        self.acquire_inner(timeout, None)
    }

    /// Like [`acquire`](Self::acquire), but gives up with
    /// [`LockError::Cancelled`] once `shutdown` is triggered.
    ///
    /// The flag is checked between attempts, so a waiter notices it within
    /// one `lock_timeout`.
    pub fn acquire_or_cancel(
        &self,
        timeout: AcquireTimeout,
        shutdown: &ShutdownFlag,
    ) -> Result<LockGuard<'_, P, C>, LockError> {
        self.acquire_inner(timeout, Some(shutdown))
    }

    fn acquire_inner(
        &self,
        timeout: AcquireTimeout,
        shutdown: Option<&ShutdownFlag>,
    ) -> Result<LockGuard<'_, P, C>, LockError> {
        let budget = timeout.budget(self.config.acquire_timeout);
        let start = Instant::now();
        let mut backoff = Backoff::new();
        let mut last_error = None;

        loop {
            if shutdown.is_some_and(ShutdownFlag::is_triggered) {
                info!(path = %self.resource_path().display(), "lock acquisition cancelled");
                return Err(LockError::Cancelled {
                    path: self.resource_path().to_path_buf(),
                    waited: start.elapsed(),
                });
            }

            match self.claim_and_try() {
                Attempt::Acquired => return Ok(LockGuard { lock: self }),
                Attempt::Busy => {}
                Attempt::Failed(e) => {
                    warn!(path = %self.resource_path().display(), error = %e, "lock attempt failed");
                    last_error = Some(e.to_string());
                }
            }

            // Measured on the monotonic clock, independent of the heartbeat clock
            let elapsed = start.elapsed();
            let remaining = match budget {
                None => None,
                Some(budget) if elapsed >= budget => {
                    info!(
                        path = %self.resource_path().display(),
                        waited = ?elapsed,
                        ?timeout,
                        "lock acquisition timed out"
                    );
                    return Err(LockError::Timeout {
                        path: self.resource_path().to_path_buf(),
                        waited: elapsed,
                        last_error,
                    });
                }
                Some(budget) => Some(budget - elapsed),
            };

            backoff.sleep(remaining);
        }
    }

    /// Claim this handle, then make one attempt. A handle that is already
    /// claimed is busy without touching the primary lock or the heartbeat.
    fn claim_and_try(&self) -> Attempt {
        if !self.claim() {
            return Attempt::Busy;
        }
        let attempt = self.try_once(0);
        if !matches!(attempt, Attempt::Acquired) {
            self.unclaim();
        }
        attempt
    }

    fn claim(&self) -> bool {
        self.claimed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn unclaim(&self) {
        self.claimed.store(false, Ordering::SeqCst);
    }

    /// One attempt on the primary lock, breaking it when the heartbeat says
    /// the holder is dead.
    pub(crate) fn try_once(&self, depth: u32) -> Attempt {
        if depth > 0 {
            info!(path = %self.resource_path().display(), depth, "retrying after recovery");
        }
        if depth > MAX_RECOVERY_DEPTH {
            return Attempt::Busy;
        }

        match self.primary.acquire(self.config.lock_timeout) {
            Ok(()) => {
                self.heartbeat.touch();
                Attempt::Acquired
            }
            Err(PrimaryLockError::Timeout { .. }) => {
                let age = self.heartbeat.age();
                if age <= self.config.expire {
                    return Attempt::Busy;
                }

                info!(
                    path = %self.resource_path().display(),
                    heartbeat_age = ?age,
                    expire = ?self.config.expire,
                    "heartbeat expired, breaking lock of presumed dead holder"
                );
                self.force_release();
                self.try_once(depth + 1)
            }
            Err(e) => Attempt::Failed(e),
        }
    }

    /// Release regardless of owner. Only the recovery path may call this.
    fn force_release(&self) {
        if let Err(e) = self.primary.release(true) {
            warn!(path = %self.resource_path().display(), error = %e, "forced release failed");
        }
    }

    /// Cooperative release: heartbeat first, then the primary lock
    fn release(&self) {
        self.heartbeat.remove();
        if let Err(e) = self.primary.release(false) {
            warn!(path = %self.resource_path().display(), error = %e, "failed to release lock");
        }
        self.unclaim();
    }

    /// Inspect the lock without keeping it.
    ///
    /// When this handle does not hold the lock, a zero-timeout attempt
    /// probes whether anyone else does; a successful probe is released
    /// immediately.
    pub fn status(&self) -> LockStatus {
        let mtime = self.heartbeat.mtime();
        let present = mtime != UNIX_EPOCH;

        let held = if !self.claim() {
            // A guard on this handle holds it
            Some(true)
        } else {
            let probed = match self.primary.acquire(Duration::ZERO) {
                Ok(()) => {
                    if let Err(e) = self.primary.release(false) {
                        warn!(path = %self.resource_path().display(), error = %e, "failed to release probe");
                    }
                    Some(false)
                }
                Err(PrimaryLockError::Timeout { .. }) => Some(true),
                Err(e) => {
                    warn!(path = %self.resource_path().display(), error = %e, "lock probe failed");
                    None
                }
            };
            self.unclaim();
            probed
        };

        LockStatus {
            resource: self.resource_path().to_path_buf(),
            heartbeat: self.heartbeat.path().to_path_buf(),
            heartbeat_at: present.then(|| DateTime::<Utc>::from(mtime)),
            heartbeat_age: present.then(|| self.heartbeat.age()),
            expired: self.is_expired(),
            held,
        }
    }
}

impl<P: PrimaryLock, C: Clock> std::fmt::Debug for ResilientLock<P, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientLock")
            .field("resource", &self.resource_path())
            .field("heartbeat", &self.heartbeat.path())
            .field("config", &self.config)
            .field("claimed", &self.claimed.load(Ordering::SeqCst))
            .finish()
    }
}

/// Scoped ownership of a [`ResilientLock`]; releases on drop
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct LockGuard<'a, P: PrimaryLock = Box<dyn PrimaryLock>, C: Clock = SystemClock> {
    lock: &'a ResilientLock<P, C>,
}

impl<P: PrimaryLock, C: Clock> LockGuard<'_, P, C> {
    /// Re-touch the heartbeat to prove the holder is still alive
    pub fn refresh(&self) {
        self.lock.heartbeat.touch();
    }

    pub fn resource_path(&self) -> &Path {
        self.lock.resource_path()
    }

    pub fn release(self) {
        drop(self);
    }
}

impl<P: PrimaryLock, C: Clock> Drop for LockGuard<'_, P, C> {
    fn drop(&mut self) {
        self.lock.release();
    }
}

impl<P: PrimaryLock, C: Clock> std::fmt::Debug for LockGuard<'_, P, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard")
            .field("resource", &self.resource_path())
            .finish()
    }
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
