//! Development server: HTTP surface and lifecycle sequencing.
//!
//! Routes:
//! - `GET /livereload/{epoch}/{id}`: long-poll; answers with the
//!   visible epoch once it exceeds `{epoch}` or the heartbeat timeout
//!   elapses. `{id}` is opaque, used for logging only.
//! - `GET /js/livereload.js`: embedded reload client.
//! - any other `GET`/`HEAD`: static file from the document root,
//!   `index.html` fallback, reload script injected into HTML.

pub mod inject;

mod path;
mod response;


use crate::config::ServeConfig;
use crate::coordinator::RebuildCoordinator;
use crate::epoch::EpochClock;
use crate::watch::{FileWatchRegistry, default_ignore};
use crate::{BuildFn, ErrorHandler, IgnoreEvent, ServeError, debug, embed, log, mime};
use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tiny_http::{Method, Request, Server};

// Lifecycle states. No transition skips a state; shutdown twice is a
// no-op enforced by compare-exchange.
const CONSTRUCTED: u8 = 0;
const SERVING: u8 = 1;
const SHUTTING_DOWN: u8 = 2;
const STOPPED: u8 = 3;

/// Live-reload development server.
///
/// Construct with [`DevServer::bind`], register watch paths, then call
/// [`DevServer::serve`] to block on the accept loop. [`DevServer::shutdown`]
/// may be called from any thread (or a signal handler) and tears
/// everything down in order.
pub struct DevServer {
    config: ServeConfig,
    addr: SocketAddr,
    http: Arc<Server>,
    clock: Arc<EpochClock>,
    coordinator: Arc<RebuildCoordinator>,
    registry: FileWatchRegistry,
    builder: BuildFn,
    error_handler: ErrorHandler,
    ignore: IgnoreEvent,
    request_ids: AtomicU64,
    state: AtomicU8,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for DevServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DevServer")
            .field("addr", &self.addr)
            .finish_non_exhaustive()
    }
}

impl DevServer {
    /// Bind the listener and assemble the server.
    ///
    /// Binding is the startup-fatal point for the HTTP side; a port 0
    /// config binds an OS-assigned port, readable via [`DevServer::addr`].
    pub fn bind(config: ServeConfig, builder: BuildFn) -> Result<Self, ServeError> {
        let addr = config.addr();
        let http = Server::http(addr).map_err(|source| ServeError::Bind { addr, source })?;
        let addr = http.server_addr().to_ip().unwrap_or(addr);

        let clock = Arc::new(EpochClock::new());
        let coordinator = Arc::new(RebuildCoordinator::new(
            Arc::clone(&clock),
            config.build_delay(),
        ));
        let registry = FileWatchRegistry::new()?;

        log!("serve"; "http://{addr}");

        Ok(Self {
            config,
            addr,
            http: Arc::new(http),
            clock,
            coordinator,
            registry,
            builder,
            error_handler: Arc::new(|_| None),
            ignore: Arc::new(default_ignore),
            request_ids: AtomicU64::new(0),
            state: AtomicU8::new(CONSTRUCTED),
            dispatcher: Mutex::new(None),
        })
    }

    /// Replace the error-page hook (`status -> optional body`).
    pub fn with_error_handler(mut self, handler: ErrorHandler) -> Self {
        self.error_handler = handler;
        self
    }

    /// Replace the change-event ignore predicate. Tests pass
    /// `Arc::new(|_| false)` to make event delivery deterministic.
    pub fn with_ignore_predicate(mut self, ignore: IgnoreEvent) -> Self {
        self.ignore = ignore;
        self
    }

    /// Bound address (actual port when configured with port 0).
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Watch `path` with the default builder.
    pub fn watch(&self, path: &Path) -> Result<(), ServeError> {
        self.watch_with(path, Arc::clone(&self.builder))
    }

    /// Watch `path` with a caller-supplied rebuild callback.
    ///
    /// The watcher attaches immediately and buffers events, so changes
    /// made between `watch` and `serve` still trigger a rebuild.
    pub fn watch_with(&self, path: &Path, build: BuildFn) -> Result<(), ServeError> {
        if self.state.load(Ordering::SeqCst) >= SHUTTING_DOWN {
            return Err(ServeError::Stopped);
        }
        self.registry.watch(path, build)
    }

    /// Start the rebuild and dispatcher workers, then block on the
    /// accept loop until [`DevServer::shutdown`].
    pub fn serve(&self) -> Result<(), ServeError> {
        self.state
            .compare_exchange(CONSTRUCTED, SERVING, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| ServeError::AlreadyStarted)?;

        self.coordinator.start();
        *self.dispatcher.lock() = self
            .registry
            .spawn_dispatcher(Arc::clone(&self.coordinator), Arc::clone(&self.ignore));

        for request in self.http.incoming_requests() {
            // Requests racing shutdown get a plain 503
            if self.state.load(Ordering::SeqCst) != SERVING {
                let _ = response::send_error(request, 503, &self.error_handler);
                continue;
            }

            let ctx = RequestCtx {
                clock: Arc::clone(&self.clock),
                document_root: self.config.document_root.clone(),
                poll_timeout: self.config.poll_timeout(),
                error_handler: Arc::clone(&self.error_handler),
                request_id: self.request_ids.fetch_add(1, Ordering::Relaxed),
            };
            // One worker per connection: long-poll waits must not block
            // other requests.
            thread::spawn(move || {
                if let Err(e) = handle_request(request, &ctx) {
                    // Disconnects mid-response are routine, not errors
                    debug!("serve"; "request dropped: {e:#}");
                }
            });
        }
        Ok(())
    }

    /// Stop watchers, workers and the listener, then join everything.
    ///
    /// Safe to call from a signal handler thread or during an in-flight
    /// rebuild; the second call returns immediately.
    pub fn shutdown(&self) {
        let entered = self
            .state
            .compare_exchange(SERVING, SHUTTING_DOWN, Ordering::SeqCst, Ordering::SeqCst)
            .or_else(|_| {
                self.state.compare_exchange(
                    CONSTRUCTED,
                    SHUTTING_DOWN,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                )
            });
        if entered.is_err() {
            return;
        }

        log!("serve"; "shutting down...");

        // 1. No new file events
        self.registry.stop();
        // 2. Wake the coordinator out of its wait loop; no further cycles
        self.coordinator.stop();
        // 3. Stop accepting connections, end the accept loop
        self.http.unblock();
        // 4.–5. Join the workers within the grace period
        let grace = self.config.shutdown_delay();
        self.coordinator.join(grace);
        if let Some(handle) = self.dispatcher.lock().take() {
            join_within(handle, grace);
        }

        self.state.store(STOPPED, Ordering::SeqCst);
    }
}

/// Wire SIGINT to `shutdown`. The handler runs on its own thread, so
/// joining workers from it is fine. Install at most once per process.
pub fn install_shutdown_handler(server: &Arc<DevServer>) -> Result<()> {
    let server = Arc::clone(server);
    ctrlc::set_handler(move || server.shutdown()).context("failed to set Ctrl+C handler")
}

fn join_within(handle: JoinHandle<()>, grace: Duration) {
    let deadline = Instant::now() + grace;
    while !handle.is_finished() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    if handle.is_finished() {
        let _ = handle.join();
    }
}

// =============================================================================
// Request handling
// =============================================================================

/// Per-request snapshot of the shared server state.
struct RequestCtx {
    clock: Arc<EpochClock>,
    document_root: PathBuf,
    poll_timeout: Duration,
    error_handler: ErrorHandler,
    request_id: u64,
}

/// Handle a single HTTP request on its own thread.
fn handle_request(request: Request, ctx: &RequestCtx) -> Result<()> {
    match request.method() {
        Method::Get | Method::Head => {}
        _ => return response::send_error(request, 405, &ctx.error_handler),
    }

    let url = request.url().to_string();

    // The long-poll protocol is GET only; a HEAD here falls through to
    // static resolution (and a 404) instead of holding the connection.
    if request.method() == &Method::Get {
        if let Some((since, poll_id)) = parse_poll_url(&url) {
            debug!("poll"; "client {poll_id} waiting past {since}");
            let epoch = ctx.clock.wait_for_epoch(since, ctx.poll_timeout);
            return response::send_body(
                request,
                200,
                mime::types::PLAIN,
                epoch.to_string().into_bytes(),
            );
        }
    }

    if url == "/js/livereload.js" {
        if response::is_head_request(&request) {
            return response::send_head(request, 200, mime::types::JAVASCRIPT);
        }
        return response::send_body(
            request,
            200,
            mime::types::JAVASCRIPT,
            embed::LIVERELOAD_JS.as_bytes().to_vec(),
        );
    }

    // Never hand out part of a build in progress
    ctx.clock.wait_for_build();

    let Some(file) = path::resolve(&url, &ctx.document_root) else {
        return response::send_error(request, 404, &ctx.error_handler);
    };

    let content_type = mime::from_path(&file);
    if response::is_head_request(&request) {
        return response::send_head(request, 200, content_type);
    }

    let body = match fs::read(&file) {
        Ok(body) => body,
        // Resolved but unreadable (permissions, or removed since the
        // resolve); a per-request failure, routed through the error hook
        Err(e) => {
            debug!("serve"; "read failed for {}: {e}", file.display());
            return response::send_error(request, 500, &ctx.error_handler);
        }
    };
    let body = if mime::is_html(content_type) {
        inject::inject_reload_script(&body, ctx.clock.current_visible(), ctx.request_id)
    } else {
        body
    };
    response::send_body(request, 200, content_type, body)
}

/// Parse `/livereload/{epoch}/{request_id}`. The id is decimal and
/// opaque; anything malformed falls through to static serving (and a
/// 404).
fn parse_poll_url(url: &str) -> Option<(u64, u64)> {
    let rest = url.strip_prefix("/livereload/")?;
    let (epoch, id) = rest.split_once('/')?;
    let epoch = epoch.parse().ok()?;
    let id = id.split(['?', '/']).next()?.parse().ok()?;
    Some((epoch, id))
}
