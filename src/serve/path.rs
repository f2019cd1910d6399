//! URL to document-root path resolution.

use percent_encoding::percent_decode_str;
use std::path::{Path, PathBuf};

/// Resolve a request URL against the document root.
///
/// Strips the query string, decodes percent-escapes, applies the
/// `index.html` fallback for directories, and rejects anything that
/// resolves outside the root: dotdot segments directly, symlink
/// escapes via canonicalization.
pub fn resolve(url: &str, root: &Path) -> Option<PathBuf> {
    let relative = clean_url(url)?;

    if relative.split('/').any(|segment| segment == "..") {
        return None;
    }

    let candidate = root.join(&relative).canonicalize().ok()?;
    let root = root.canonicalize().ok()?;
    if !candidate.starts_with(&root) {
        return None;
    }

    if candidate.is_dir() {
        let index = candidate.join("index.html");
        return index.is_file().then_some(index);
    }

    candidate.is_file().then_some(candidate)
}

/// Decode the URL into a root-relative path string. `None` when the
/// percent-escapes do not decode to valid UTF-8.
fn clean_url(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let decoded = percent_decode_str(path).decode_utf8().ok()?;
    Some(decoded.trim_matches('/').to_string())
}
