//! Error taxonomy for remote operations.

use std::fmt;
use std::time::Duration;

/// Classification of a failed attempt.
///
/// The first three kinds are retryable; everything else stops the retry loop
/// immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Attempt deadline exceeded (or HTTP 408).
    Timeout,
    /// Connection could not be established or broke mid-transfer.
    NetworkUnreachable,
    /// Backend restarting or overloaded (502/503/504, 429).
    UpstreamTemporarilyUnavailable,
    /// No credential, or the server refused it (401).
    Unauthorized,
    /// Server refused the payload itself (400, 413, 415, 422).
    PayloadRejected,
    /// Storage policy denial (403).
    PolicyViolation,
    /// Any other non-2xx response.
    Rejected,
    /// Caller cancelled the operation.
    Cancelled,
}

impl ErrorKind {
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::Timeout
                | ErrorKind::NetworkUnreachable
                | ErrorKind::UpstreamTemporarilyUnavailable
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Timeout => "timed out",
            ErrorKind::NetworkUnreachable => "network unreachable",
            ErrorKind::UpstreamTemporarilyUnavailable => "server temporarily unavailable",
            ErrorKind::Unauthorized => "not authorized",
            ErrorKind::PayloadRejected => "payload rejected by server",
            ErrorKind::PolicyViolation => "denied by storage policy",
            ErrorKind::Rejected => "server rejected request",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal error of an executed operation: what went wrong last, how many
/// attempts were spent, and how long the whole sequence took.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}{} after {attempts} attempt(s) in {}ms: {detail}", status_suffix(.http_status), .elapsed.as_millis())]
pub struct ExecutionError {
    pub kind: ErrorKind,
    pub http_status: Option<u16>,
    pub attempts: u32,
    pub elapsed: Duration,
    /// True when the loop stopped because the budget ran out on a retryable kind.
    pub retries_exhausted: bool,
    pub detail: String,
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}
