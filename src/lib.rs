//! Live-reload development server for locally generated sites.
//!
//! The server watches source directories, debounces change bursts into
//! single rebuild cycles, stamps every completed cycle with a monotonic
//! version (the *epoch*), and holds browser long-polls open until a
//! newer epoch is published. HTML responses get a small polling client
//! injected, so open tabs reload themselves after every rebuild.
//!
//! ```no_run
//! use docserve::{DevServer, ServeConfig, install_shutdown_handler};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = ServeConfig {
//!         document_root: "public".into(),
//!         ..ServeConfig::default()
//!     };
//!     let server = DevServer::bind(config, Arc::new(|| {
//!         // regenerate the site into `public/`
//!         Ok(())
//!     }))?;
//!     server.watch(Path::new("content"))?;
//!
//!     let server = Arc::new(server);
//!     install_shutdown_handler(&server)?;
//!     server.serve()?;
//!     Ok(())
//! }
//! ```

pub mod logger;

mod config;
mod coordinator;
mod embed;
mod epoch;
mod error;
mod mime;
mod serve;
mod watch;

use std::sync::Arc;

pub use config::ServeConfig;
pub use coordinator::{Phase, RebuildCoordinator};
pub use epoch::{Epoch, EpochClock};
pub use error::ServeError;
pub use serve::inject::inject_reload_script;
pub use serve::{DevServer, install_shutdown_handler};
pub use watch::{FileWatchRegistry, default_ignore};

/// Rebuild callback. Runs on the coordinator thread; an `Err` is logged
/// and the cycle still publishes, so stale-but-consistent output keeps
/// being served.
pub type BuildFn = Arc<dyn Fn() -> anyhow::Result<()> + Send + Sync>;

/// Error-page hook: maps an HTTP status to an optional HTML body.
/// `None` (or an empty body) falls back to a plain status line.
pub type ErrorHandler = Arc<dyn Fn(u16) -> Option<Vec<u8>> + Send + Sync>;

/// Change-event ignore predicate; `true` drops the event. See
/// [`default_ignore`] for the stock editor-artifact filter.
pub type IgnoreEvent = Arc<dyn Fn(&notify::Event) -> bool + Send + Sync>;
