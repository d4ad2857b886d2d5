//! Classify HTTP statuses and curl errors into retry error kinds.

use super::error::ErrorKind;

/// How much of a response body is inspected for transient-unavailability hints.
const BODY_HINT_LIMIT: usize = 512;

const TRANSIENT_HINTS: [&str; 4] = [
    "temporarily unavailable",
    "try again later",
    "bad gateway",
    "upstream connect error",
];

/// Classify an HTTP status. Returns `None` for 2xx.
///
/// Only the status and a short prefix of the body are looked at; success
/// payloads are never parsed here.
pub fn classify_status(status: u16, body: &[u8]) -> Option<ErrorKind> {
    let kind = match status {
        200..=299 => return None,
        408 => ErrorKind::Timeout,
        429 | 502 | 503 | 504 => ErrorKind::UpstreamTemporarilyUnavailable,
        401 => ErrorKind::Unauthorized,
        403 => ErrorKind::PolicyViolation,
        400 | 413 | 415 | 422 => ErrorKind::PayloadRejected,
        _ => ErrorKind::Rejected,
    };
    if kind == ErrorKind::Rejected && body_signals_transient(body) {
        return Some(ErrorKind::UpstreamTemporarilyUnavailable);
    }
    Some(kind)
}

fn body_signals_transient(body: &[u8]) -> bool {
    let head = &body[..body.len().min(BODY_HINT_LIMIT)];
    let text = String::from_utf8_lossy(head).to_ascii_lowercase();
    TRANSIENT_HINTS.iter().any(|hint| text.contains(hint))
}

/// Classify a curl error.
pub fn classify_curl_error(e: &curl::Error) -> ErrorKind {
    if e.is_operation_timedout() {
        return ErrorKind::Timeout;
    }
    if e.is_aborted_by_callback() {
        return ErrorKind::Cancelled;
    }
    if e.is_url_malformed() || e.is_unsupported_protocol() {
        return ErrorKind::Rejected;
    }
    // Resolve/connect/send/recv failures and anything else at the socket level.
    ErrorKind::NetworkUnreachable
}
