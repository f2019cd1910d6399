//! Reload-script injection into outgoing HTML.

use crate::epoch::Epoch;

/// Byte pattern for the closing body tag; matched case-insensitively.
const BODY_CLOSE: &[u8] = b"</body>";

/// Insert the reload fragment into an HTML byte buffer.
///
/// The fragment lands immediately before the **last** `</body>`, or at
/// the very end when the tag is absent. Bytes before the insertion
/// point are preserved verbatim; the caller derives Content-Length from
/// the returned buffer.
pub fn inject_reload_script(content: &[u8], epoch: Epoch, request_id: u64) -> Vec<u8> {
    let fragment = format!(
        "<script src=\"/js/livereload.js\"></script>\
         <script>livereload({epoch}, {request_id});</script>"
    );
    let fragment = fragment.as_bytes();

    let at = content
        .windows(BODY_CLOSE.len())
        .rposition(|w| w.eq_ignore_ascii_case(BODY_CLOSE))
        .unwrap_or(content.len());

    let mut out = Vec::with_capacity(content.len() + fragment.len());
    out.extend_from_slice(&content[..at]);
    out.extend_from_slice(fragment);
    out.extend_from_slice(&content[at..]);
    out
}
