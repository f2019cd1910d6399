//! Development server configuration.
//!
//! All fields have sensible defaults, so a hosting process can start
//! from `ServeConfig::default()` and override what it needs, or parse
//! a `[serve]`-style TOML section:
//!
//! ```toml
//! host = "127.0.0.1"       # Network interface (127.0.0.1 = localhost only)
//! port = 8000              # HTTP port number (0 = let the OS pick)
//! document_root = "site"   # Directory the generated site is served from
//! build_delay_ms = 100     # Debounce window after the last file change
//! shutdown_delay_ms = 250  # Grace period for worker threads on shutdown
//! poll_timeout_ms = 60000  # Long-poll heartbeat interval
//! ```
//!
//! Use `host = "0.0.0.0"` to make the server accessible from LAN.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Development server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServeConfig {
    /// Network interface to bind.
    /// - `127.0.0.1` (default): localhost only
    /// - `0.0.0.0`: all interfaces (LAN accessible)
    pub host: IpAddr,

    /// HTTP port number. Port 0 asks the OS for a free one.
    pub port: u16,

    /// Directory the generated site is served from.
    pub document_root: PathBuf,

    /// Quiet window after the last file change before a rebuild starts.
    pub build_delay_ms: u64,

    /// Grace period for worker threads to exit during shutdown.
    pub shutdown_delay_ms: u64,

    /// How long a long-poll request is held open before it heartbeats
    /// back with the unchanged version.
    pub poll_timeout_ms: u64,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)),
            port: 8000,
            document_root: PathBuf::from("site"),
            build_delay_ms: 100,
            shutdown_delay_ms: 250,
            poll_timeout_ms: 60_000,
        }
    }
}

impl ServeConfig {
    /// Parse from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Socket address to bind the listener on.
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Debounce window for the rebuild coordinator.
    pub fn build_delay(&self) -> Duration {
        Duration::from_millis(self.build_delay_ms)
    }

    /// Worker join grace period during shutdown.
    pub fn shutdown_delay(&self) -> Duration {
        Duration::from_millis(self.shutdown_delay_ms)
    }

    /// Long-poll heartbeat interval.
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}
