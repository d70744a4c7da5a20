// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CLI command implementations

pub mod run;
pub mod status;
pub mod sweep;

use clap::Args;
use deadbolt_core::{LockConfig, PrimaryKind};
use std::time::Duration;

/// Lock options shared by commands that open a lock
#[derive(Args)]
pub struct LockArgs {
    /// Wait on the underlying lock per attempt (e.g. "10s")
    #[arg(long, value_parser = humantime::parse_duration)]
    pub lock_timeout: Option<Duration>,

    /// Heartbeat age after which the holder is presumed dead (e.g. "2m")
    #[arg(long, value_parser = humantime::parse_duration)]
    pub expire: Option<Duration>,

    /// Use a marker-file lock instead of a kernel lock
    #[arg(long)]
    pub marker: bool,
}

impl LockArgs {
    /// Overlay command-line values on the configured ones
    pub fn apply(&self, mut config: LockConfig) -> LockConfig {
        if let Some(timeout) = self.lock_timeout {
            config.lock_timeout = timeout;
        }
        if let Some(expire) = self.expire {
            config.expire = expire;
        }
        if self.marker {
            config.primary = PrimaryKind::Marker;
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config() {
        let args = LockArgs {
            lock_timeout: Some(Duration::from_millis(250)),
            expire: None,
            marker: true,
        };

        let config = args.apply(LockConfig::default().with_expire(Duration::from_secs(7)));

        assert_eq!(config.lock_timeout, Duration::from_millis(250));
        assert_eq!(config.expire, Duration::from_secs(7));
        assert_eq!(config.primary, PrimaryKind::Marker);
    }

    #[test]
    fn no_flags_keep_config() {
        let args = LockArgs {
            lock_timeout: None,
            expire: None,
            marker: false,
        };

        assert_eq!(args.apply(LockConfig::default()), LockConfig::default());
    }
}
