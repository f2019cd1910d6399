//! Default change-event filtering heuristic.
//!
//! The predicate is pluggable (`IgnoreEvent`) so platform quirks can be
//! tuned, or the filter disabled entirely in tests for determinism.

use notify::event::{AccessKind, AccessMode, ModifyKind};
use notify::{Event, EventKind};
use std::path::Path;

/// Returns true when `event` should be suppressed.
///
/// Suppresses editor temp/backup artifacts and pure metadata noise
/// (mtime/chmod churn that would otherwise cause rebuild loops).
/// Close-after-write always passes: on platforms that report it, it is
/// the reliable "the editor is done" signal. Anything unrecognized
/// passes through: a spurious extra rebuild is acceptable, a missed
/// one is not.
pub fn default_ignore(event: &Event) -> bool {
    match event.kind {
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => {}
        EventKind::Access(_) => return true,
        EventKind::Modify(ModifyKind::Metadata(_)) => return true,
        EventKind::Create(_)
        | EventKind::Remove(_)
        | EventKind::Modify(_)
        | EventKind::Any
        | EventKind::Other => {}
    }

    !event.paths.is_empty() && event.paths.iter().all(|p| is_editor_artifact(p))
}

/// Temp/backup file left behind (or mid-write) by an editor.
fn is_editor_artifact(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "swp" | "swo" | "swx" | "tmp" | "bak" | "bck" | "backup")
        || name.ends_with('~')
        || name.starts_with('.')
}
