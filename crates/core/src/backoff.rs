// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Exponential retry delay shared by the polling loops

use std::thread;
use std::time::Duration;

const INITIAL_RETRY_DELAY: Duration = Duration::from_millis(10);
const MAX_RETRY_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug)]
pub(crate) struct Backoff {
    delay: Duration,
}

impl Backoff {
    pub(crate) fn new() -> Self {
        Self {
            delay: INITIAL_RETRY_DELAY,
        }
    }

    /// Sleep for the current delay, clamped to `remaining`, then double it
    pub(crate) fn sleep(&mut self, remaining: Option<Duration>) {
        let delay = match remaining {
            Some(remaining) => self.delay.min(remaining),
            None => self.delay,
        };
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        self.delay = (self.delay * 2).min(MAX_RETRY_DELAY);
    }

    #[cfg(test)]
    pub(crate) fn current(&self) -> Duration {
        self.delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_doubles_up_to_cap() {
        let mut backoff = Backoff::new();
        assert_eq!(backoff.current(), Duration::from_millis(10));
        backoff.sleep(Some(Duration::ZERO));
        assert_eq!(backoff.current(), Duration::from_millis(20));
        for _ in 0..10 {
            backoff.sleep(Some(Duration::ZERO));
        }
        assert_eq!(backoff.current(), MAX_RETRY_DELAY);
    }
}
