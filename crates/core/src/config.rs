// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lock and sweep configuration
//!
//! Durations are written in humantime notation (`"10s"`, `"2m"`, `"1h"`).

use crate::primary::PrimaryKind;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Per-lock configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Overall wait when the caller gives no explicit timeout
    #[serde(with = "humantime_serde")]
    pub acquire_timeout: Duration,
    /// Wait handed to the primary lock on each attempt
    #[serde(with = "humantime_serde")]
    pub lock_timeout: Duration,
    /// Heartbeat age after which the holder is presumed dead
    #[serde(with = "humantime_serde")]
    pub expire: Duration,
    /// How often long-running holders should refresh their heartbeat
    #[serde(with = "humantime_serde")]
    pub heartbeat_interval: Duration,
    pub primary: PrimaryKind,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            acquire_timeout: Duration::from_secs(60 * 60),
            lock_timeout: Duration::from_secs(10),
            expire: Duration::from_secs(120),
            heartbeat_interval: Duration::from_secs(30),
            primary: PrimaryKind::Flock,
        }
    }
}

impl LockConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn with_expire(mut self, expire: Duration) -> Self {
        self.expire = expire;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn with_primary(mut self, primary: PrimaryKind) -> Self {
        self.primary = primary;
        self
    }
}

/// Log sweeping configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Files older than this are deleted
    #[serde(with = "humantime_serde")]
    pub max_age: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            max_age: Duration::from_secs(60 * 60 * 24),
        }
    }
}

/// Errors loading a settings file
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Contents of a settings file
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub lock: LockConfig,
    pub sweep: SweepConfig,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
