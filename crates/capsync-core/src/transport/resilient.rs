use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use super::outcome::AttemptOutcome;
use super::{Connector, WireRequest};
use crate::auth::Credential;
use crate::control::CancelToken;
use crate::request::{PayloadClass, RequestDescriptor};
use crate::retry::{classify_status, ErrorKind};

/// Minimum first-attempt deadline per payload class. The executor raises the
/// descriptor's timeout to this floor before escalation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeadlineFloors {
    pub small: Duration,
    pub large: Duration,
}

impl Default for DeadlineFloors {
    fn default() -> Self {
        Self {
            small: Duration::from_secs(5),
            large: Duration::from_secs(120),
        }
    }
}

/// Runs single attempts against a connector under a hard deadline.
#[derive(Clone)]
pub struct ResilientTransport {
    connector: Arc<dyn Connector>,
    floors: DeadlineFloors,
}

impl ResilientTransport {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            floors: DeadlineFloors::default(),
        }
    }

    pub fn with_floors(mut self, floors: DeadlineFloors) -> Self {
        self.floors = floors;
        self
    }

    pub fn deadline_floor(&self, class: PayloadClass) -> Duration {
        match class {
            PayloadClass::Small => self.floors.small,
            PayloadClass::Large => self.floors.large,
        }
    }

    /// One network call bounded by `timeout`.
    ///
    /// Deadline expiry and cancellation drop the connector future, which
    /// aborts the exchange. Only the status (and a short body prefix) is
    /// looked at; the response body is handed back untouched.
    pub async fn attempt(
        &self,
        descriptor: &RequestDescriptor,
        credential: Option<&Credential>,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> AttemptOutcome {
        let started = Instant::now();

        if descriptor.needs_auth() && credential.is_none() {
            return AttemptOutcome::failure(
                ErrorKind::Unauthorized,
                None,
                started.elapsed(),
                "no session credential for authenticated request",
            );
        }
        if cancel.is_cancelled() {
            return AttemptOutcome::failure(
                ErrorKind::Cancelled,
                None,
                started.elapsed(),
                "cancelled before send",
            );
        }

        let request = WireRequest::from_descriptor(descriptor, credential, timeout);
        let send = self.connector.send(request);

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return AttemptOutcome::failure(
                    ErrorKind::Cancelled,
                    None,
                    started.elapsed(),
                    "cancelled in flight",
                );
            }
            r = tokio::time::timeout(timeout, send) => r,
        };

        let elapsed = started.elapsed();
        match result {
            Err(_) => AttemptOutcome::failure(
                ErrorKind::Timeout,
                None,
                elapsed,
                format!("no response within {}ms", timeout.as_millis()),
            ),
            Ok(Err(e)) => AttemptOutcome::failure(e.kind, None, elapsed, e.message),
            Ok(Ok(response)) => match classify_status(response.status, &response.body) {
                None => AttemptOutcome::success(response, elapsed),
                Some(kind) => AttemptOutcome::failure(
                    kind,
                    Some(response.status),
                    elapsed,
                    format!("HTTP {}", response.status),
                ),
            },
        }
    }
}
