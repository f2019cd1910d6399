//! Embedded static resources.
//!
//! The reload client is compiled into the binary and served from
//! memory, so it works regardless of document-root contents.

/// Long-poll reload client, served at `/js/livereload.js`.
pub const LIVERELOAD_JS: &str = include_str!("livereload.js");
