//! Build version clock.
//!
//! Two version values live under one monitor: `wanted` (the version
//! currently being built) and `visible` (the last fully built version,
//! safe to serve). The invariant `visible <= wanted` holds at all
//! times; the two are equal exactly when no rebuild is in flight.
//!
//! Connection handlers block here (`wait_for_build`, `wait_for_epoch`);
//! the rebuild coordinator only ever publishes (`begin_cycle`,
//! `complete_cycle`). This monitor is never held together with the
//! coordinator's pending-set monitor.

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Monotonic build version: milliseconds since clock construction.
/// Not unique across restarts, but non-decreasing within a process.
pub type Epoch = u64;

#[derive(Debug, Default)]
struct Versions {
    wanted: Epoch,
    visible: Epoch,
}

/// Monotonically non-decreasing version counter with wait support.
///
/// Cannot fail; every operation either returns immediately or blocks.
pub struct EpochClock {
    started: Instant,
    versions: Mutex<Versions>,
    changed: Condvar,
}

impl EpochClock {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            versions: Mutex::new(Versions::default()),
            changed: Condvar::new(),
        }
    }

    #[allow(clippy::cast_possible_truncation)] // u64 millis outlive any dev-server process
    fn now_ms(&self) -> Epoch {
        self.started.elapsed().as_millis() as Epoch
    }

    /// Last published version (non-blocking).
    pub fn current_visible(&self) -> Epoch {
        self.versions.lock().visible
    }

    /// Block until no rebuild is in flight.
    ///
    /// Called before serving any file, so a request never observes a
    /// half-written document root.
    pub fn wait_for_build(&self) {
        let mut versions = self.versions.lock();
        while versions.visible != versions.wanted {
            self.changed.wait(&mut versions);
        }
    }

    /// Block until a version newer than `since` is published or
    /// `timeout` elapses. Returns the visible version observed at wake
    /// time, which is unchanged on timeout; that is the long-poll
    /// heartbeat, not a failure.
    pub fn wait_for_epoch(&self, since: Epoch, timeout: Duration) -> Epoch {
        let deadline = Instant::now() + timeout;
        let mut versions = self.versions.lock();
        while versions.visible <= since {
            if self.changed.wait_until(&mut versions, deadline).timed_out() {
                break;
            }
        }
        versions.visible
    }

    /// Start a rebuild cycle: advance `wanted` to the current reading.
    ///
    /// Bumps by at least one so back-to-back cycles within the same
    /// millisecond still publish distinct versions.
    pub fn begin_cycle(&self) {
        let now = self.now_ms();
        let mut versions = self.versions.lock();
        versions.wanted = now.max(versions.wanted + 1);
    }

    /// Publish the version started by `begin_cycle` and wake every
    /// thread blocked in `wait_for_build` / `wait_for_epoch`.
    pub fn complete_cycle(&self) {
        let mut versions = self.versions.lock();
        versions.visible = versions.wanted;
        self.changed.notify_all();
    }
}

impl Default for EpochClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    #[test]
    fn test_initial_state_is_idle() {
        let clock = EpochClock::new();
        assert_eq!(clock.current_visible(), 0);
        // visible == wanted, so this must not block
        clock.wait_for_build();
    }

    #[test]
    fn test_cycle_advances_visible() {
        let clock = EpochClock::new();
        clock.begin_cycle();
        clock.complete_cycle();
        let first = clock.current_visible();
        assert!(first > 0);

        clock.begin_cycle();
        clock.complete_cycle();
        assert!(clock.current_visible() > first);
    }

    #[test]
    fn test_same_millisecond_cycles_stay_distinct() {
        let clock = EpochClock::new();
        let mut last = 0;
        // Tight loop: several cycles land in the same millisecond
        for _ in 0..20 {
            clock.begin_cycle();
            clock.complete_cycle();
            let visible = clock.current_visible();
            assert!(visible > last);
            last = visible;
        }
    }

    #[test]
    fn test_wait_for_epoch_timeout_returns_unchanged() {
        let clock = EpochClock::new();
        let before = clock.current_visible();
        let start = Instant::now();
        let observed = clock.wait_for_epoch(before, Duration::from_millis(50));
        assert!(start.elapsed() >= Duration::from_millis(50));
        assert_eq!(observed, before);
    }

    #[test]
    fn test_wait_for_epoch_wakes_on_complete() {
        let clock = Arc::new(EpochClock::new());
        let since = clock.current_visible();

        let waiter = {
            let clock = Arc::clone(&clock);
            thread::spawn(move || clock.wait_for_epoch(since, Duration::from_secs(5)))
        };

        thread::sleep(Duration::from_millis(50));
        clock.begin_cycle();
        clock.complete_cycle();

        let observed = waiter.join().unwrap();
        assert!(observed > since);
    }

    #[test]
    fn test_wait_for_build_blocks_during_cycle() {
        let clock = Arc::new(EpochClock::new());
        clock.begin_cycle();

        let released = Arc::new(AtomicBool::new(false));
        let waiter = {
            let clock = Arc::clone(&clock);
            let released = Arc::clone(&released);
            thread::spawn(move || {
                clock.wait_for_build();
                released.store(true, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(100));
        assert!(!released.load(Ordering::SeqCst), "must wait for the cycle");

        clock.complete_cycle();
        waiter.join().unwrap();
        assert!(released.load(Ordering::SeqCst));
    }
}
