// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test utilities for CLI integration tests.

#![allow(dead_code)]

use assert_cmd::Command;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

/// Command for the deadbolt binary with logging kept quiet
pub fn deadbolt() -> Command {
    let mut cmd = Command::cargo_bin("deadbolt").expect("deadbolt binary not built");
    cmd.env("RUST_LOG", "warn");
    cmd
}

pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn heartbeat_of(&self, lock: &Path) -> PathBuf {
        let mut raw = lock.as_os_str().to_owned();
        raw.push(".2");
        PathBuf::from(raw)
    }

    /// Leave behind a marker lock as a crashed process would
    pub fn orphan_marker(&self, lock: &Path) {
        fs::write(lock, "dead-holder 999999\n").expect("Failed to write marker");
    }

    /// Write a file whose mtime lies `age` in the past
    pub fn aged_file(&self, path: &Path, contents: &str, age: Duration) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent");
        }
        fs::write(path, contents).expect("Failed to write file");
        let file = fs::File::options()
            .write(true)
            .open(path)
            .expect("Failed to reopen file");
        file.set_modified(SystemTime::now() - age)
            .expect("Failed to set mtime");
    }
}
