//! HTTP response senders.
//!
//! Everything here runs on a per-connection thread. Respond errors
//! (broken pipe, reset) propagate to the handler boundary where they
//! are logged at debug level and discarded; a tab closing mid-response
//! is routine.

use crate::{ErrorHandler, log, mime};
use anyhow::Result;
use std::panic::{AssertUnwindSafe, catch_unwind};
use tiny_http::{Header, Method, Request, Response, StatusCode};

pub(super) fn is_head_request(request: &Request) -> bool {
    request.method() == &Method::Head
}

/// Headers only, no body. Used for HEAD requests.
pub(super) fn send_head(request: Request, status: u16, content_type: &'static str) -> Result<()> {
    let response = Response::empty(StatusCode(status))
        .with_header(make_header("Content-Type", content_type));
    request.respond(response)?;
    Ok(())
}

/// Full response; Content-Length is derived from `body` by tiny_http.
pub(super) fn send_body(
    request: Request,
    status: u16,
    content_type: &'static str,
    body: Vec<u8>,
) -> Result<()> {
    let response = Response::from_data(body)
        .with_status_code(StatusCode(status))
        .with_header(make_header("Content-Type", content_type));
    request.respond(response)?;
    Ok(())
}

/// Send an error status through the pluggable error-page hook.
///
/// A hook that panics is caught, logged, and treated as "no custom
/// body"; an empty body likewise falls back to the generic status line.
/// The connection handler must never crash on a user-supplied hook.
pub(super) fn send_error(request: Request, status: u16, handler: &ErrorHandler) -> Result<()> {
    let custom = catch_unwind(AssertUnwindSafe(|| handler(status))).unwrap_or_else(|_| {
        log!("serve"; "error handler panicked for status {status}");
        None
    });

    match custom.filter(|body| !body.is_empty()) {
        Some(body) => send_body(request, status, mime::types::HTML, body),
        None => {
            let body = format!("{status} {}", status_text(status)).into_bytes();
            send_body(request, status, mime::types::PLAIN, body)
        }
    }
}

fn status_text(status: u16) -> &'static str {
    match status {
        404 => "Not Found",
        405 => "Method Not Allowed",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Error",
    }
}

fn make_header(key: &'static str, value: &'static str) -> Header {
    Header::from_bytes(key, value).unwrap()
}
