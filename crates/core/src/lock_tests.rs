// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::clock::FakeClock;
use crate::primary::{FakePrimary, FlockPrimary, MarkerPrimary, PrimaryCall, PrimaryKind};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use tempfile::TempDir;
use yare::parameterized;

const LOCK_TIMEOUT: Duration = Duration::from_millis(50);

fn test_config() -> LockConfig {
    LockConfig::new()
        .with_acquire_timeout(Duration::from_secs(5))
        .with_lock_timeout(LOCK_TIMEOUT)
        .with_expire(Duration::from_secs(120))
}

fn fake_lock(dir: &TempDir) -> (ResilientLock<FakePrimary>, FakePrimary) {
    let primary = FakePrimary::new(dir.path().join("res.lock"));
    let lock = ResilientLock::with_primary(primary.clone(), test_config(), SystemClock);
    (lock, primary)
}

#[test]
fn acquire_free_lock_touches_heartbeat() {
    let dir = TempDir::new().unwrap();
    let lock = ResilientLock::open(dir.path().join("res.lock"), test_config());

    let guard = lock.acquire(AcquireTimeout::Immediate).unwrap();

    assert!(lock.heartbeat().path().exists());
    assert!(!lock.is_expired());
    assert_eq!(guard.resource_path(), dir.path().join("res.lock"));
}

#[test]
fn heartbeat_path_is_derived_from_resource() {
    let dir = TempDir::new().unwrap();
    let lock = ResilientLock::open(dir.path().join("res.lock"), test_config());
    assert_eq!(lock.heartbeat().path(), dir.path().join("res.lock.2"));
}

#[test]
fn dropping_guard_removes_heartbeat_and_releases() {
    let dir = TempDir::new().unwrap();
    let (lock, primary) = fake_lock(&dir);

    let guard = lock.acquire(AcquireTimeout::Immediate).unwrap();
    assert!(primary.is_locked());
    drop(guard);

    assert!(!lock.heartbeat().path().exists());
    assert!(primary.is_free());
    assert_eq!(
        primary.calls().last(),
        Some(&PrimaryCall::Release { force: false })
    );
}

#[test]
fn guard_releases_on_early_return() {
    fn protected(lock: &ResilientLock<FakePrimary>) -> Result<(), String> {
        let _guard = lock
            .acquire(AcquireTimeout::Immediate)
            .map_err(|e| e.to_string())?;
        Err("work failed".to_string())
    }

    let dir = TempDir::new().unwrap();
    let (lock, primary) = fake_lock(&dir);

    assert!(protected(&lock).is_err());
    assert!(primary.is_free());
}

#[test]
fn guard_releases_on_panic() {
    let dir = TempDir::new().unwrap();
    let (lock, primary) = fake_lock(&dir);

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let _guard = lock.acquire(AcquireTimeout::Immediate).unwrap();
        panic!("boom");
    }));

    assert!(result.is_err());
    assert!(primary.is_free());
    assert!(!lock.heartbeat().path().exists());
}

#[test]
fn release_tolerates_missing_heartbeat() {
    let dir = TempDir::new().unwrap();
    let (lock, primary) = fake_lock(&dir);

    let guard = lock.acquire(AcquireTimeout::Immediate).unwrap();
    std::fs::remove_file(lock.heartbeat().path()).unwrap();
    guard.release();

    assert!(primary.is_free());
}

#[test]
fn immediate_against_fresh_holder_fails_after_one_attempt() {
    let dir = TempDir::new().unwrap();
    let (holder, holder_primary) = fake_lock(&dir);
    let waiter_primary = holder_primary.contender();
    let waiter = ResilientLock::with_primary(waiter_primary.clone(), test_config(), SystemClock);

    let _guard = holder.acquire(AcquireTimeout::Immediate).unwrap();
    let err = waiter.acquire(AcquireTimeout::Immediate).unwrap_err();

    assert!(matches!(err, LockError::Timeout { .. }));
    assert_eq!(waiter_primary.acquire_attempts(), 1);
    assert_eq!(waiter_primary.forced_releases(), 0);
    assert!(holder_primary.is_locked());
}

#[test]
fn fresh_heartbeat_is_never_broken() {
    let dir = TempDir::new().unwrap();
    let clock = FakeClock::new();
    let holder_primary = FakePrimary::new(dir.path().join("res.lock"));
    let waiter_primary = holder_primary.contender();
    let holder = ResilientLock::with_primary(holder_primary.clone(), test_config(), clock.clone());
    let waiter = ResilientLock::with_primary(waiter_primary.clone(), test_config(), clock.clone());

    let _guard = holder.acquire(AcquireTimeout::Immediate).unwrap();
    clock.advance(Duration::from_secs(119));

    let result = waiter.acquire(AcquireTimeout::Within(Duration::from_millis(200)));

    assert!(result.is_err());
    assert!(waiter_primary.acquire_attempts() > 1);
    assert_eq!(waiter_primary.forced_releases(), 0);
    assert!(holder_primary.is_locked());
}

#[test]
fn stale_heartbeat_is_broken_and_taken_over() {
    let dir = TempDir::new().unwrap();
    let clock = FakeClock::new();
    let holder_primary = FakePrimary::new(dir.path().join("res.lock"));
    let waiter_primary = holder_primary.contender();
    let holder = ResilientLock::with_primary(holder_primary.clone(), test_config(), clock.clone());
    let waiter = ResilientLock::with_primary(waiter_primary.clone(), test_config(), clock.clone());

    // Holder dies without releasing
    std::mem::forget(holder.acquire(AcquireTimeout::Immediate).unwrap());
    clock.advance(Duration::from_secs(121));

    let guard = waiter.acquire(AcquireTimeout::Immediate).unwrap();

    assert!(waiter_primary.is_locked());
    assert_eq!(waiter_primary.forced_releases(), 1);
    assert_eq!(waiter_primary.acquire_attempts(), 2);
    assert!(!waiter.is_expired());
    drop(guard);
}

#[test]
fn release_then_acquire_needs_no_recovery() {
    let dir = TempDir::new().unwrap();
    let (first, first_primary) = fake_lock(&dir);
    let second_primary = first_primary.contender();
    let second = ResilientLock::with_primary(second_primary.clone(), test_config(), SystemClock);

    first.acquire(AcquireTimeout::Immediate).unwrap().release();
    let guard = second.acquire(AcquireTimeout::Immediate).unwrap();
    drop(guard);
    let again = first.acquire(AcquireTimeout::Immediate).unwrap();
    drop(again);

    assert_eq!(first_primary.forced_releases(), 0);
    assert_eq!(second_primary.forced_releases(), 0);
    assert_eq!(second_primary.acquire_attempts(), 1);
}

#[test]
fn recovery_depth_is_capped_against_relentless_contender() {
    let dir = TempDir::new().unwrap();
    let (lock, primary) = fake_lock(&dir);
    primary.seize();
    primary.set_relentless(true);

    let err = lock.acquire(AcquireTimeout::Immediate).unwrap_err();

    assert!(matches!(err, LockError::Timeout { .. }));
    assert_eq!(primary.acquire_attempts(), (MAX_RECOVERY_DEPTH + 1) as usize);
    assert_eq!(primary.forced_releases(), (MAX_RECOVERY_DEPTH + 1) as usize);
}

#[test]
fn relentless_contender_exhausts_bounded_timeout() {
    let dir = TempDir::new().unwrap();
    let (lock, primary) = fake_lock(&dir);
    primary.seize();
    primary.set_relentless(true);

    let result = lock.acquire(AcquireTimeout::Within(Duration::from_millis(100)));

    assert!(result.is_err());
    let per_round = (MAX_RECOVERY_DEPTH + 1) as usize;
    assert_eq!(primary.acquire_attempts() % per_round, 0);
    assert!(primary.acquire_attempts() >= per_round);
}

#[test]
fn try_once_past_cap_does_not_touch_primary() {
    let dir = TempDir::new().unwrap();
    let (lock, primary) = fake_lock(&dir);

    assert!(matches!(
        lock.try_once(MAX_RECOVERY_DEPTH + 1),
        Attempt::Busy
    ));
    assert!(primary.calls().is_empty());
}

#[test]
fn primary_io_error_surfaces_as_timeout_with_cause() {
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, "").unwrap();
    let lock = ResilientLock::open(blocker.join("res.lock"), test_config());

    let err = lock.acquire(AcquireTimeout::Immediate).unwrap_err();

    match err {
        LockError::Timeout { last_error, .. } => assert!(last_error.is_some()),
        other => panic!("expected Timeout, got {other:?}"),
    }
}

#[test]
fn crashed_marker_holder_is_recovered_within_lock_timeout() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("res.lock");
    let clock = FakeClock::new();
    let holder = ResilientLock::with_primary(MarkerPrimary::new(&path), test_config(), clock.clone());
    let waiter = ResilientLock::with_primary(MarkerPrimary::new(&path), test_config(), clock.clone());

    std::mem::forget(holder.acquire(AcquireTimeout::Immediate).unwrap());
    clock.advance(Duration::from_secs(121));

    let start = Instant::now();
    let guard = waiter.acquire(AcquireTimeout::Default).unwrap();
    let elapsed = start.elapsed();

    assert!(
        elapsed < LOCK_TIMEOUT + Duration::from_secs(1),
        "recovery took {:?}",
        elapsed
    );
    drop(guard);
    assert!(!path.exists());
}

#[test]
fn marker_holder_that_never_touched_heartbeat_is_recovered() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("res.lock");
    // Crashed between creating the lock and touching the heartbeat
    std::fs::write(&path, "dead-token 1\n").unwrap();

    let lock = ResilientLock::with_primary(MarkerPrimary::new(&path), test_config(), SystemClock);
    let guard = lock.acquire(AcquireTimeout::Immediate).unwrap();

    assert!(lock.heartbeat().path().exists());
    drop(guard);
}

#[test]
fn live_holder_refreshing_heartbeat_keeps_the_lock() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("res.lock");
    let config = test_config().with_expire(Duration::from_millis(400));

    let holder = Arc::new(ResilientLock::with_primary(
        MarkerPrimary::new(&path),
        config.clone(),
        SystemClock,
    ));
    let stop = Arc::new(AtomicBool::new(false));
    let (ready_tx, ready_rx) = mpsc::channel();

    let handle = {
        let holder = Arc::clone(&holder);
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            let guard = holder.acquire(AcquireTimeout::Immediate).unwrap();
            ready_tx.send(()).unwrap();
            while !stop.load(Ordering::SeqCst) {
                guard.refresh();
                thread::sleep(Duration::from_millis(50));
            }
        })
    };
    ready_rx.recv().unwrap();

    let waiter = ResilientLock::with_primary(MarkerPrimary::new(&path), config, SystemClock);
    let result = waiter.acquire(AcquireTimeout::Within(Duration::from_millis(900)));

    stop.store(true, Ordering::SeqCst);
    handle.join().unwrap();
    assert!(result.is_err());
}

#[test]
fn flock_holders_are_mutually_exclusive() {
    const WORKERS: usize = 4;
    const ROUNDS: usize = 10;

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("res.lock");
    let inside = Arc::new(AtomicUsize::new(0));
    let max_inside = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..WORKERS)
        .map(|_| {
            let path = path.clone();
            let inside = Arc::clone(&inside);
            let max_inside = Arc::clone(&max_inside);
            thread::spawn(move || {
                let lock = ResilientLock::with_primary(
                    FlockPrimary::new(path),
                    test_config().with_lock_timeout(Duration::from_millis(20)),
                    SystemClock,
                );
                for _ in 0..ROUNDS {
                    let guard = lock.acquire(AcquireTimeout::Forever).unwrap();
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_inside.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(2));
                    inside.fetch_sub(1, Ordering::SeqCst);
                    drop(guard);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(max_inside.load(Ordering::SeqCst), 1);
}

#[test]
fn status_of_free_lock() {
    let dir = TempDir::new().unwrap();
    let lock = ResilientLock::open(dir.path().join("res.lock"), test_config());

    let status = lock.status();

    assert_eq!(status.held, Some(false));
    assert!(status.expired);
    assert!(status.heartbeat_at.is_none());
    assert!(status.heartbeat_age.is_none());
    // The probe must not leave the lock held
    assert!(lock.acquire(AcquireTimeout::Immediate).is_ok());
}

#[parameterized(
    flock = { PrimaryKind::Flock },
    marker = { PrimaryKind::Marker },
)]
fn status_of_held_lock(kind: PrimaryKind) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("res.lock");
    let config = test_config().with_primary(kind);
    let holder = ResilientLock::open(&path, config.clone());
    let observer = ResilientLock::open(&path, config);

    let guard = holder.acquire(AcquireTimeout::Immediate).unwrap();

    let seen = observer.status();
    assert_eq!(seen.held, Some(true));
    assert!(!seen.expired);
    assert!(seen.heartbeat_at.is_some());

    // Asking the holder itself must not release its lock
    assert_eq!(holder.status().held, Some(true));
    assert!(observer.acquire(AcquireTimeout::Immediate).is_err());
    drop(guard);
}

#[test]
fn status_serializes_to_json() {
    let dir = TempDir::new().unwrap();
    let lock = ResilientLock::open(dir.path().join("res.lock"), test_config());
    let _guard = lock.acquire(AcquireTimeout::Immediate).unwrap();

    let json = serde_json::to_value(lock.status()).unwrap();

    assert_eq!(json["held"], serde_json::json!(true));
    assert_eq!(json["expired"], serde_json::json!(false));
    assert!(json["heartbeat_at"].is_string());
}

#[parameterized(
    negative_waits_forever = { -1.0, AcquireTimeout::Forever },
    zero_is_immediate = { 0.0, AcquireTimeout::Immediate },
    positive_is_bounded = { 2.5, AcquireTimeout::Within(Duration::from_millis(2500)) },
    nan_waits_forever = { f64::NAN, AcquireTimeout::Forever },
)]
fn acquire_timeout_from_seconds(secs: f64, expected: AcquireTimeout) {
    assert_eq!(AcquireTimeout::from_secs_f64(secs), expected);
}

#[test]
fn acquire_timeout_from_option() {
    assert_eq!(AcquireTimeout::from(None), AcquireTimeout::Default);
    assert_eq!(
        AcquireTimeout::from(Some(Duration::ZERO)),
        AcquireTimeout::Immediate
    );
    assert_eq!(
        AcquireTimeout::from(Some(Duration::from_secs(3))),
        AcquireTimeout::Within(Duration::from_secs(3))
    );
}

#[test]
fn default_timeout_uses_configured_budget() {
    let budget = Duration::from_secs(42);
    assert_eq!(AcquireTimeout::Default.budget(budget), Some(budget));
    assert_eq!(AcquireTimeout::Forever.budget(budget), None);
    assert_eq!(AcquireTimeout::Immediate.budget(budget), Some(Duration::ZERO));
}

#[test]
fn second_acquire_on_held_handle_waits_for_first_guard() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("res.lock");
    let lock = ResilientLock::with_primary(FlockPrimary::new(&path), test_config(), SystemClock);

    let first = lock.acquire(AcquireTimeout::Immediate).unwrap();
    let err = lock.acquire(AcquireTimeout::Immediate).unwrap_err();
    assert!(matches!(err, LockError::Timeout { .. }));

    // The failed attempt must leave the first guard's ownership intact
    let outsider = FlockPrimary::new(&path);
    assert!(outsider.acquire(Duration::ZERO).is_err());
    assert!(lock.heartbeat().path().exists());
    assert_eq!(lock.status().held, Some(true));
    assert!(outsider.acquire(Duration::ZERO).is_err());

    drop(first);
    let second = lock.acquire(AcquireTimeout::Immediate).unwrap();
    drop(second);
    outsider.acquire(Duration::ZERO).unwrap();
}

#[test]
fn held_handle_does_not_break_its_own_stale_heartbeat() {
    let dir = TempDir::new().unwrap();
    let clock = FakeClock::new();
    let primary = FakePrimary::new(dir.path().join("res.lock"));
    let lock = ResilientLock::with_primary(primary.clone(), test_config(), clock.clone());

    let _guard = lock.acquire(AcquireTimeout::Immediate).unwrap();
    clock.advance(Duration::from_secs(121));

    assert!(lock.acquire(AcquireTimeout::Immediate).is_err());
    assert_eq!(primary.acquire_attempts(), 1);
    assert_eq!(primary.forced_releases(), 0);
    assert!(primary.is_locked());
}

#[test]
fn threads_sharing_one_handle_are_mutually_exclusive() {
    const WORKERS: usize = 4;
    const ROUNDS: usize = 10;

    let dir = TempDir::new().unwrap();
    let lock = ResilientLock::with_primary(
        FlockPrimary::new(dir.path().join("res.lock")),
        test_config(),
        SystemClock,
    );
    let inside = AtomicUsize::new(0);
    let max_inside = AtomicUsize::new(0);

    thread::scope(|scope| {
        for _ in 0..WORKERS {
            scope.spawn(|| {
                for _ in 0..ROUNDS {
                    let guard = lock.acquire(AcquireTimeout::Forever).unwrap();
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_inside.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(2));
                    inside.fetch_sub(1, Ordering::SeqCst);
                    drop(guard);
                }
            });
        }
    });

    assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    assert!(!lock.heartbeat().path().exists());
}

#[test]
fn triggered_shutdown_cancels_before_any_attempt() {
    let dir = TempDir::new().unwrap();
    let (lock, primary) = fake_lock(&dir);
    let shutdown = ShutdownFlag::new();
    shutdown.trigger();

    let err = lock
        .acquire_or_cancel(AcquireTimeout::Forever, &shutdown)
        .unwrap_err();

    assert!(matches!(err, LockError::Cancelled { .. }));
    assert_eq!(primary.acquire_attempts(), 0);
}

#[test]
fn shutdown_cancels_waiter_blocked_forever() {
    let dir = TempDir::new().unwrap();
    let (holder, holder_primary) = fake_lock(&dir);
    let waiter = ResilientLock::with_primary(holder_primary.contender(), test_config(), SystemClock);
    let _guard = holder.acquire(AcquireTimeout::Immediate).unwrap();

    let shutdown = ShutdownFlag::new();
    let remote = shutdown.clone();
    let trigger = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        remote.trigger();
    });

    let start = Instant::now();
    let err = waiter
        .acquire_or_cancel(AcquireTimeout::Forever, &shutdown)
        .unwrap_err();
    trigger.join().unwrap();

    assert!(matches!(err, LockError::Cancelled { .. }));
    assert!(start.elapsed() < Duration::from_secs(2));
    assert!(holder_primary.is_locked());
}

#[test]
fn untriggered_shutdown_acquires_normally() {
    let dir = TempDir::new().unwrap();
    let (lock, primary) = fake_lock(&dir);

    let guard = lock
        .acquire_or_cancel(AcquireTimeout::Immediate, &ShutdownFlag::new())
        .unwrap();

    assert!(primary.is_locked());
    drop(guard);
    assert!(primary.is_free());
}
