//! Startup-fatal and lifecycle error types.
//!
//! Per-request problems (missing files, client disconnects) never show
//! up here; they are handled at the connection boundary and converted
//! to HTTP status responses.

use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced synchronously to the caller of `bind`, `watch` or
/// `serve`. All of these mean the server cannot (or can no longer) do
/// its job; the hosting process should exit non-zero.
#[derive(Debug, Error)]
pub enum ServeError {
    /// The HTTP listener could not bind its address.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The OS file-notification backend could not be initialized.
    #[error("failed to initialize file watcher")]
    Watcher(#[from] notify::Error),

    /// A requested watch path cannot be monitored (missing directory,
    /// insufficient permissions).
    #[error("cannot watch {}: {source}", path.display())]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    /// `serve` was called on a server that is not freshly constructed.
    #[error("server already started")]
    AlreadyStarted,

    /// Operation on a server that has been shut down.
    #[error("server is shut down")]
    Stopped,
}
