//! File-watch registry and event dispatch.
//!
//! notify's backend threads push raw events into a channel; a dedicated
//! dispatcher worker drains it, applies the ignore predicate, and
//! enqueues the rebuild callback of every registration whose root
//! contains a changed path:
//!
//! ```text
//! notify backend → channel → dispatcher (filter, route) → RebuildCoordinator
//! ```
//!
//! The watcher starts buffering into the channel as soon as paths are
//! registered, so changes made before the dispatcher spawns are not
//! lost; they are processed once it runs.

mod filter;


pub use filter::default_ignore;

use crate::coordinator::RebuildCoordinator;
use crate::{BuildFn, IgnoreEvent, ServeError, debug, log};
use crossbeam::channel::{self, Receiver};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// One `watch` call: a root directory bound to a rebuild callback.
/// Overlapping roots are legal; every matching callback fires.
struct Registration {
    root: PathBuf,
    build: BuildFn,
}

/// Explicit registration table binding watched paths to rebuild
/// callbacks. Owned by the server, no ambient state.
pub struct FileWatchRegistry {
    /// `None` once stopped; dropping the watcher stops the OS backend.
    watcher: Mutex<Option<RecommendedWatcher>>,
    /// Roots already attached to the OS watcher (a root shared by
    /// several registrations is attached once).
    attached: Mutex<FxHashSet<PathBuf>>,
    registrations: Arc<Mutex<Vec<Registration>>>,
    /// Taken by the dispatcher when it spawns.
    events: Mutex<Option<Receiver<notify::Event>>>,
}

impl FileWatchRegistry {
    pub fn new() -> notify::Result<Self> {
        let (event_tx, event_rx) = channel::unbounded();

        // The closure runs on notify's own threads; it only forwards.
        let watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(event) => {
                    let _ = event_tx.send(event);
                }
                Err(e) => log!("watch"; "notify error: {e}"),
            }
        })?;

        Ok(Self {
            watcher: Mutex::new(Some(watcher)),
            attached: Mutex::new(FxHashSet::default()),
            registrations: Arc::new(Mutex::new(Vec::new())),
            events: Mutex::new(Some(event_rx)),
        })
    }

    /// Register recursive monitoring of `root`, enqueueing `build` for
    /// every change detected beneath it.
    ///
    /// A path that cannot be monitored (missing, no permission) fails
    /// here, synchronously, never silently later.
    pub fn watch(&self, root: &Path, build: BuildFn) -> Result<(), ServeError> {
        // Canonicalized so event paths (always absolute) match the root
        let root = root.canonicalize().map_err(|e| ServeError::Watch {
            path: root.to_path_buf(),
            source: notify::Error::io(e),
        })?;

        {
            let mut watcher = self.watcher.lock();
            let Some(watcher) = watcher.as_mut() else {
                return Err(ServeError::Stopped);
            };

            let mut attached = self.attached.lock();
            if !attached.contains(&root) {
                watcher
                    .watch(&root, RecursiveMode::Recursive)
                    .map_err(|source| ServeError::Watch {
                        path: root.clone(),
                        source,
                    })?;
                attached.insert(root.clone());
            }
        }

        debug!("watch"; "watching {}", root.display());
        self.registrations.lock().push(Registration { root, build });
        Ok(())
    }

    /// Spawn the dispatcher worker. Returns `None` if already spawned.
    pub(crate) fn spawn_dispatcher(
        &self,
        coordinator: Arc<RebuildCoordinator>,
        ignore: IgnoreEvent,
    ) -> Option<JoinHandle<()>> {
        let events = self.events.lock().take()?;
        let registrations = Arc::clone(&self.registrations);
        Some(thread::spawn(move || {
            dispatch(&events, &registrations, &coordinator, &ignore);
        }))
    }

    /// Stop the OS watcher. No further events are accepted; the channel
    /// disconnects and the dispatcher drains out and exits.
    pub(crate) fn stop(&self) {
        *self.watcher.lock() = None;
        self.attached.lock().clear();
    }
}

/// Dispatcher loop: filter raw events and route them to callbacks.
fn dispatch(
    events: &Receiver<notify::Event>,
    registrations: &Mutex<Vec<Registration>>,
    coordinator: &RebuildCoordinator,
    ignore: &IgnoreEvent,
) {
    while let Ok(event) = events.recv() {
        if (ignore)(&event) {
            debug!("watch"; "ignored: {:?} {:?}", event.kind, event.paths);
            continue;
        }
        debug!("watch"; "change: {:?} {:?}", event.kind, event.paths);

        // Collect matches first; the registration lock is never held
        // across an enqueue.
        let matched: Vec<BuildFn> = {
            let registrations = registrations.lock();
            registrations
                .iter()
                .filter(|r| event.paths.iter().any(|p| p.starts_with(&r.root)))
                .map(|r| Arc::clone(&r.build))
                .collect()
        };

        for build in matched {
            coordinator.enqueue(build);
        }
    }
}
