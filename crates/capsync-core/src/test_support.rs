//! In-memory connector with scripted replies, shared by unit tests.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::auth::StaticCredentials;
use crate::executor::RequestExecutor;
use crate::request::Method;
use crate::retry::{ErrorKind, RetryPolicy};
use crate::transport::{
    ConnectError, Connector, DeadlineFloors, ResilientTransport, Response, WireRequest,
};

#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Status(u16, Vec<u8>),
    Json(u16, Value),
    Fail(ErrorKind),
    Delayed(Duration, Box<Reply>),
    Hang,
}

impl Reply {
    pub(crate) fn ok_json(v: Value) -> Self {
        Reply::Json(200, v)
    }

    pub(crate) fn status(code: u16) -> Self {
        Reply::Status(code, Vec::new())
    }
}

struct Route {
    method: Method,
    pattern: String,
    script: VecDeque<Reply>,
    then: Reply,
}

#[derive(Default)]
pub(crate) struct ScriptedConnector {
    routes: Mutex<Vec<Route>>,
    calls: Mutex<Vec<WireRequest>>,
}

impl ScriptedConnector {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Requests with `method` whose endpoint contains `pattern` get `script`
    /// replies in order, then `then` forever. Earlier routes win.
    pub(crate) fn on(&self, method: Method, pattern: &str, script: Vec<Reply>, then: Reply) {
        self.routes.lock().unwrap().push(Route {
            method,
            pattern: pattern.to_string(),
            script: script.into(),
            then,
        });
    }

    pub(crate) fn calls(&self) -> Vec<WireRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, method: Method, pattern: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.method == method && r.endpoint.contains(pattern))
            .count()
    }

    fn next_reply(&self, request: &WireRequest) -> Reply {
        let mut routes = self.routes.lock().unwrap();
        for route in routes.iter_mut() {
            if route.method == request.method && request.endpoint.contains(&route.pattern) {
                return route.script.pop_front().unwrap_or_else(|| route.then.clone());
            }
        }
        Reply::status(404)
    }
}

async fn play(mut reply: Reply) -> Result<Response, ConnectError> {
    while let Reply::Delayed(d, inner) = reply {
        tokio::time::sleep(d).await;
        reply = *inner;
    }
    match reply {
        Reply::Status(code, body) => Ok(Response::new(code, body)),
        Reply::Json(code, v) => Ok(Response::new(code, serde_json::to_vec(&v).unwrap())),
        Reply::Fail(kind) => Err(ConnectError::new(kind, "scripted failure")),
        Reply::Hang => std::future::pending().await,
        Reply::Delayed(..) => unreachable!(),
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn send(&self, request: WireRequest) -> Result<Response, ConnectError> {
        let reply = self.next_reply(&request);
        self.calls.lock().unwrap().push(request);
        play(reply).await
    }
}

/// Executor over `connector` with zero deadline floors and a token credential.
pub(crate) fn executor_for(connector: Arc<ScriptedConnector>) -> RequestExecutor {
    let transport = ResilientTransport::new(connector).with_floors(DeadlineFloors {
        small: Duration::ZERO,
        large: Duration::ZERO,
    });
    RequestExecutor::new(
        transport,
        Arc::new(StaticCredentials::new(Some("test-token".into()))),
    )
    .with_policy(RetryPolicy::default())
}

/// Like `executor_for`, but with millisecond backoff for real-time tests.
/// Tests touching the SQLite queue cannot pause the clock: the pool's
/// acquire timeout would fire while the runtime waits on the sqlite worker.
pub(crate) fn fast_executor_for(connector: Arc<ScriptedConnector>) -> RequestExecutor {
    executor_for(connector).with_policy(RetryPolicy {
        backoff_step: Duration::from_millis(1),
        backoff_cap: Duration::from_millis(5),
        timeout_growth: 1.5,
    })
}
