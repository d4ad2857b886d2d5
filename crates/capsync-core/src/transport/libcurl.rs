//! Production connector backed by libcurl.
//!
//! Each exchange runs on tokio's blocking pool. An abort flag is checked from
//! curl's progress callback; it is raised when the async side drops the
//! future (deadline or cancellation), so the blocking transfer stops promptly
//! instead of running to curl's own timeout.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use super::{ConnectError, Connector, Response, WireRequest};
use crate::request::Method;
use crate::retry::{classify_curl_error, ErrorKind};

/// Raises the abort flag when dropped.
struct AbortOnDrop(Arc<AtomicBool>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone)]
pub struct CurlConnector {
    base_url: Option<Url>,
    connect_timeout: Duration,
}

impl CurlConnector {
    /// `base_url` resolves relative endpoints; absolute endpoints are used as-is.
    pub fn new(base_url: Option<&str>, connect_timeout: Duration) -> Result<Self, url::ParseError> {
        let base_url = base_url.map(with_trailing_slash).map(|s| Url::parse(&s)).transpose()?;
        Ok(Self {
            base_url,
            connect_timeout,
        })
    }

    pub fn resolve(&self, endpoint: &str) -> Result<Url, ConnectError> {
        if let Ok(url) = Url::parse(endpoint) {
            return Ok(url);
        }
        let base = self.base_url.as_ref().ok_or_else(|| {
            ConnectError::new(
                ErrorKind::Rejected,
                format!("relative endpoint {endpoint} without a base URL"),
            )
        })?;
        base.join(endpoint.trim_start_matches('/'))
            .map_err(|e| ConnectError::new(ErrorKind::Rejected, format!("bad endpoint {endpoint}: {e}")))
    }
}

fn with_trailing_slash(s: &str) -> String {
    if s.ends_with('/') {
        s.to_string()
    } else {
        format!("{s}/")
    }
}

#[async_trait]
impl Connector for CurlConnector {
    async fn send(&self, request: WireRequest) -> Result<Response, ConnectError> {
        let url = self.resolve(&request.endpoint)?;
        let abort = Arc::new(AtomicBool::new(false));
        let _guard = AbortOnDrop(Arc::clone(&abort));
        let connect_timeout = self.connect_timeout;

        let handle =
            tokio::task::spawn_blocking(move || perform(url, request, connect_timeout, abort));
        match handle.await {
            Ok(result) => result,
            Err(e) => Err(ConnectError::new(
                ErrorKind::NetworkUnreachable,
                format!("transfer worker failed: {e}"),
            )),
        }
    }
}

/// Largest timeout curl accepts everywhere (milliseconds in a C long).
const CURL_TIMEOUT_CEILING: Duration = Duration::from_millis(i32::MAX as u64);

/// curl's own timeout, one second past the async deadline.
fn safety_timeout(deadline: Duration) -> Duration {
    deadline
        .saturating_add(Duration::from_secs(1))
        .min(CURL_TIMEOUT_CEILING)
}

fn curl_err(e: curl::Error) -> ConnectError {
    ConnectError::new(classify_curl_error(&e), e.to_string())
}

/// Blocking exchange. Runs inside `spawn_blocking`.
fn perform(
    url: Url,
    request: WireRequest,
    connect_timeout: Duration,
    abort: Arc<AtomicBool>,
) -> Result<Response, ConnectError> {
    let mut easy = curl::easy::Easy::new();
    easy.url(url.as_str()).map_err(curl_err)?;
    easy.follow_location(true).map_err(curl_err)?;
    easy.connect_timeout(connect_timeout).map_err(curl_err)?;
    // Safety net in case the async deadline never fires.
    easy.timeout(safety_timeout(request.timeout))
        .map_err(curl_err)?;
    easy.progress(true).map_err(curl_err)?;

    match request.method {
        Method::Get => easy.get(true).map_err(curl_err)?,
        Method::Post => easy.post(true).map_err(curl_err)?,
        other => easy.custom_request(other.as_str()).map_err(curl_err)?,
    }
    if !request.body.is_empty() || request.method == Method::Post {
        easy.post_field_size(request.body.len() as u64)
            .map_err(curl_err)?;
        easy.post_fields_copy(&request.body).map_err(curl_err)?;
        if request.method != Method::Post {
            // post_fields_copy switches to POST; restore the intended verb.
            easy.custom_request(request.method.as_str())
                .map_err(curl_err)?;
        }
    }

    let mut list = curl::easy::List::new();
    for (k, v) in &request.headers {
        list.append(&format!("{}: {}", k.trim(), v.trim()))
            .map_err(curl_err)?;
    }
    // Suppress curl's automatic "Expect: 100-continue" on large bodies.
    list.append("Expect:").map_err(curl_err)?;
    easy.http_headers(list).map_err(curl_err)?;

    let mut body = Vec::new();
    {
        let mut transfer = easy.transfer();
        transfer
            .write_function(|data| {
                body.extend_from_slice(data);
                Ok(data.len())
            })
            .map_err(curl_err)?;
        transfer
            .progress_function(|_, _, _, _| !abort.load(Ordering::Relaxed))
            .map_err(curl_err)?;
        transfer.perform().map_err(curl_err)?;
    }

    let status = easy.response_code().map_err(curl_err)?;
    let status = u16::try_from(status)
        .map_err(|_| ConnectError::new(ErrorKind::Rejected, format!("bad status {status}")))?;
    Ok(Response { status, body })
}
