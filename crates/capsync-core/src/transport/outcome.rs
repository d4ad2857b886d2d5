use std::time::Duration;

use super::Response;
use crate::retry::ErrorKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptStatus {
    Success,
    RetryableFailure,
    FatalFailure,
}

/// Why an attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptFailure {
    pub kind: ErrorKind,
    pub http_status: Option<u16>,
    pub detail: String,
}

/// Result of one attempt. Produced once, consumed by the executor.
#[derive(Debug)]
pub struct AttemptOutcome {
    pub elapsed: Duration,
    pub result: Result<Response, AttemptFailure>,
}

impl AttemptOutcome {
    pub(crate) fn success(response: Response, elapsed: Duration) -> Self {
        Self {
            elapsed,
            result: Ok(response),
        }
    }

    pub(crate) fn failure(
        kind: ErrorKind,
        http_status: Option<u16>,
        elapsed: Duration,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            elapsed,
            result: Err(AttemptFailure {
                kind,
                http_status,
                detail: detail.into(),
            }),
        }
    }

    pub fn status(&self) -> AttemptStatus {
        match &self.result {
            Ok(_) => AttemptStatus::Success,
            Err(f) if f.kind.is_retryable() => AttemptStatus::RetryableFailure,
            Err(_) => AttemptStatus::FatalFailure,
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.result.as_ref().err().map(|f| f.kind)
    }

    pub fn http_status(&self) -> Option<u16> {
        match &self.result {
            Ok(r) => Some(r.status),
            Err(f) => f.http_status,
        }
    }
}
