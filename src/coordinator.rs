//! Debounced single-flight rebuild worker.
//!
//! The coordinator owns the pending set of rebuild callbacks and runs
//! them on a dedicated thread, one cycle at a time:
//!
//! ```text
//! Idle ──pending non-empty──▶ Debouncing ──quiet window──▶ Running ──▶ Idle
//! ```
//!
//! Bursts of change events coalesce into one cycle: every enqueue
//! restarts the debounce window, and a callback already in the pending
//! set is not queued twice. Enqueues arriving while a cycle runs land
//! in a fresh set, so in-flight changes are never lost and at most one
//! cycle runs at a time.

use crate::epoch::EpochClock;
use crate::{BuildFn, logger};
use parking_lot::{Condvar, Mutex};
use std::mem;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Coordinator phase, observable for tests and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Debouncing,
    Running,
    Stopped,
}

/// Everything guarded by the pending-set monitor.
struct Queue {
    /// Insertion-ordered set: a callback appears at most once.
    pending: Vec<BuildFn>,
    /// Bumped on every enqueue, coalesced or not, so the debounce
    /// window resets while changes keep arriving.
    generation: u64,
    phase: Phase,
    shutdown: bool,
}

struct Shared {
    clock: Arc<EpochClock>,
    build_delay: Duration,
    queue: Mutex<Queue>,
    arrived: Condvar,
}

/// Debouncing rebuild scheduler. See the module docs for the state
/// machine; `stop` + `join` tear the worker down.
pub struct RebuildCoordinator {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl RebuildCoordinator {
    pub fn new(clock: Arc<EpochClock>, build_delay: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                clock,
                build_delay,
                queue: Mutex::new(Queue {
                    pending: Vec::new(),
                    generation: 0,
                    phase: Phase::Idle,
                    shutdown: false,
                }),
                arrived: Condvar::new(),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Spawn the worker loop. A second call is a no-op.
    pub fn start(&self) {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return;
        }
        let shared = Arc::clone(&self.shared);
        *worker = Some(thread::spawn(move || run(&shared)));
    }

    /// Queue a rebuild callback for the next cycle.
    ///
    /// Coalescing: a callback already pending is not re-queued, but the
    /// debounce window still resets. Never blocks on a running cycle.
    pub fn enqueue(&self, build: BuildFn) {
        let mut queue = self.shared.queue.lock();
        if queue.shutdown {
            return;
        }
        if !queue.pending.iter().any(|b| Arc::ptr_eq(b, &build)) {
            queue.pending.push(build);
        }
        queue.generation = queue.generation.wrapping_add(1);
        self.shared.arrived.notify_all();
    }

    /// Current phase of the worker.
    pub fn phase(&self) -> Phase {
        self.shared.queue.lock().phase
    }

    /// Ask the worker to stop; it abandons any wait and runs no further
    /// cycles. Does not block; idempotent.
    pub fn stop(&self) {
        let mut queue = self.shared.queue.lock();
        queue.shutdown = true;
        self.shared.arrived.notify_all();
    }

    /// Wait up to `grace` for the worker to exit. A worker stuck in a
    /// slow builder callback is detached rather than waited on forever.
    /// Safe to call twice.
    pub fn join(&self, grace: Duration) {
        let handle = self.worker.lock().take();
        let Some(handle) = handle else { return };

        let deadline = Instant::now() + grace;
        while !handle.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        if handle.is_finished() {
            let _ = handle.join();
        }
    }
}

/// Worker loop: wait for arrivals, debounce, drain, execute, publish.
fn run(shared: &Shared) {
    loop {
        let batch = {
            let mut queue = shared.queue.lock();
            queue.phase = Phase::Idle;

            while queue.pending.is_empty() && !queue.shutdown {
                shared.arrived.wait(&mut queue);
            }
            if queue.shutdown {
                queue.phase = Phase::Stopped;
                return;
            }

            queue.phase = Phase::Debouncing;
            // Require a full quiet window: every arrival restarts it.
            loop {
                let seen = queue.generation;
                let timed_out = shared
                    .arrived
                    .wait_for(&mut queue, shared.build_delay)
                    .timed_out();
                if queue.shutdown {
                    queue.phase = Phase::Stopped;
                    return;
                }
                if timed_out && queue.generation == seen {
                    break;
                }
            }

            queue.phase = Phase::Running;
            mem::take(&mut queue.pending)
            // Pending-set monitor released here, before the epoch
            // monitor is touched.
        };

        shared.clock.begin_cycle();
        let started = Instant::now();
        let mut failed = 0usize;
        for build in &batch {
            if let Err(e) = build() {
                failed += 1;
                logger::status_error("rebuild failed", &format!("{e:#}"));
            }
        }
        // Publish even when a callback failed, so long-poll clients are
        // not stranded; the previous good output stays served.
        shared.clock.complete_cycle();

        if failed == 0 {
            logger::status_success(&format!(
                "rebuilt {} target{} in {:.0?}",
                batch.len(),
                if batch.len() == 1 { "" } else { "s" },
                started.elapsed()
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const DELAY: Duration = Duration::from_millis(30);

    fn make_coordinator() -> (Arc<EpochClock>, RebuildCoordinator) {
        let clock = Arc::new(EpochClock::new());
        let coordinator = RebuildCoordinator::new(Arc::clone(&clock), DELAY);
        coordinator.start();
        (clock, coordinator)
    }

    fn counting_build(counter: &Arc<AtomicUsize>) -> BuildFn {
        let counter = Arc::clone(counter);
        Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    /// Poll until `predicate` holds or the deadline passes.
    fn wait_until(predicate: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if predicate() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_burst_coalesces_into_one_cycle() {
        let (clock, coordinator) = make_coordinator();
        let counter = Arc::new(AtomicUsize::new(0));
        let build = counting_build(&counter);

        for _ in 0..5 {
            coordinator.enqueue(Arc::clone(&build));
        }

        assert!(wait_until(|| clock.current_visible() > 0));
        // Give a second (wrong) cycle every chance to run
        thread::sleep(DELAY * 4);
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        coordinator.stop();
        coordinator.join(Duration::from_secs(1));
    }

    #[test]
    fn test_distinct_callbacks_run_in_enqueue_order() {
        let (clock, coordinator) = make_coordinator();
        let order = Arc::new(Mutex::new(Vec::new()));

        for name in ["a", "b", "c"] {
            let order = Arc::clone(&order);
            coordinator.enqueue(Arc::new(move || {
                order.lock().push(name);
                Ok(())
            }));
        }

        assert!(wait_until(|| clock.current_visible() > 0));
        assert_eq!(*order.lock(), vec!["a", "b", "c"]);

        coordinator.stop();
        coordinator.join(Duration::from_secs(1));
    }

    #[test]
    fn test_change_during_running_cycle_is_not_lost() {
        let (clock, coordinator) = make_coordinator();
        let slow_calls = Arc::new(AtomicUsize::new(0));
        let slow = {
            let calls = Arc::clone(&slow_calls);
            Arc::new(move || {
                calls.fetch_add(1, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(150));
                Ok(())
            }) as BuildFn
        };

        coordinator.enqueue(slow);
        assert!(wait_until(|| coordinator.phase() == Phase::Running));

        // Arrives mid-cycle: must trigger a second cycle, not vanish
        let late_counter = Arc::new(AtomicUsize::new(0));
        coordinator.enqueue(counting_build(&late_counter));

        assert!(wait_until(|| late_counter.load(Ordering::SeqCst) == 1));
        assert_eq!(slow_calls.load(Ordering::SeqCst), 1);

        // Two completed cycles, two published versions
        let first = clock.current_visible();
        assert!(first > 0);

        coordinator.stop();
        coordinator.join(Duration::from_secs(1));
    }

    #[test]
    fn test_failed_callback_still_publishes() {
        let (clock, coordinator) = make_coordinator();

        coordinator.enqueue(Arc::new(|| Err(anyhow::anyhow!("builder exploded"))));
        assert!(
            wait_until(|| clock.current_visible() > 0),
            "a failing callback must not leave long-poll clients hanging"
        );

        // The coordinator keeps going afterwards
        let counter = Arc::new(AtomicUsize::new(0));
        coordinator.enqueue(counting_build(&counter));
        assert!(wait_until(|| counter.load(Ordering::SeqCst) == 1));

        coordinator.stop();
        coordinator.join(Duration::from_secs(1));
    }

    #[test]
    fn test_enqueue_resets_debounce_window() {
        let (clock, coordinator) = make_coordinator();
        let counter = Arc::new(AtomicUsize::new(0));
        let build = counting_build(&counter);

        // Keep poking faster than the window for a while: no cycle may
        // start until the burst quiets down.
        for _ in 0..6 {
            coordinator.enqueue(Arc::clone(&build));
            thread::sleep(DELAY / 3);
        }
        assert_eq!(clock.current_visible(), 0);

        assert!(wait_until(|| counter.load(Ordering::SeqCst) == 1));

        coordinator.stop();
        coordinator.join(Duration::from_secs(1));
    }

    #[test]
    fn test_stop_is_idempotent() {
        let (_clock, coordinator) = make_coordinator();

        coordinator.stop();
        coordinator.stop();
        coordinator.join(Duration::from_secs(1));
        coordinator.join(Duration::from_secs(1));

        assert_eq!(coordinator.phase(), Phase::Stopped);
    }

    #[test]
    fn test_enqueue_after_stop_runs_nothing() {
        let (clock, coordinator) = make_coordinator();
        coordinator.stop();
        coordinator.join(Duration::from_secs(1));

        let counter = Arc::new(AtomicUsize::new(0));
        coordinator.enqueue(counting_build(&counter));
        thread::sleep(DELAY * 3);

        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(clock.current_visible(), 0);
    }
}
