//! One bounded network attempt.
//!
//! A `Connector` performs a raw exchange with no retry and no deadline of its
//! own. `ResilientTransport` wraps it with the attempt deadline, external
//! cancellation, and status classification.

mod libcurl;
mod outcome;
mod resilient;

pub use libcurl::CurlConnector;
pub use outcome::{AttemptFailure, AttemptOutcome, AttemptStatus};
pub use resilient::{DeadlineFloors, ResilientTransport};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::auth::Credential;
use crate::request::{Method, RequestDescriptor};
use crate::retry::ErrorKind;

/// A request as handed to a connector: everything resolved, body serialized.
#[derive(Debug, Clone)]
pub struct WireRequest {
    pub method: Method,
    pub endpoint: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    /// Attempt deadline; connectors may use it as a safety net of their own.
    pub timeout: Duration,
}

impl WireRequest {
    pub fn from_descriptor(
        descriptor: &RequestDescriptor,
        credential: Option<&Credential>,
        timeout: Duration,
    ) -> Self {
        let mut headers = descriptor.headers().to_vec();
        if let Some(ct) = descriptor.body().content_type() {
            headers.push(("Content-Type".to_string(), ct.to_string()));
        }
        if let Some(c) = credential {
            headers.push(("Authorization".to_string(), c.header_value()));
        }
        Self {
            method: descriptor.method(),
            endpoint: descriptor.endpoint().to_string(),
            headers,
            body: descriptor.body().to_bytes(),
            timeout,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Raw response of any status. Interpreting the body is up to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Failure below HTTP: no response was obtained.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ConnectError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ConnectError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Performs exactly one exchange. Dropping the returned future must abort the
/// exchange.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn send(&self, request: WireRequest) -> Result<Response, ConnectError>;
}
