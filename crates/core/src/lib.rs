// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! deadbolt-core: deadlock-resistant file locking
//!
//! This crate provides:
//! - A resilient lock that breaks the lock of a holder whose heartbeat file
//!   has gone stale
//! - Primary lock implementations (kernel advisory lock, marker file)
//! - Log sweeping and a graceful shutdown flag for long-running hosts

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod backoff;

pub mod clock;
pub mod config;
pub mod error;
pub mod heartbeat;
pub mod lock;
pub mod paths;
pub mod primary;
pub mod shutdown;
pub mod sweep;

// Re-exports
pub use clock::{Clock, FakeClock, SystemClock};
pub use config::{ConfigError, LockConfig, Settings, SweepConfig};
pub use error::LockError;
pub use heartbeat::Heartbeat;
pub use lock::{AcquireTimeout, LockGuard, LockStatus, ResilientLock, MAX_RECOVERY_DEPTH};
pub use primary::{
    open_primary, FlockPrimary, MarkerPrimary, PrimaryKind, PrimaryLock, PrimaryLockError,
};
pub use shutdown::ShutdownFlag;
pub use sweep::{sweep_expired, SweepStats};

#[cfg(any(test, feature = "test-support"))]
pub use primary::{FakePrimary, PrimaryCall};
