#![allow(dead_code)]

pub mod store_server;

use capsync_core::config::{CapsyncConfig, RetryConfig};
use capsync_core::transport::CurlConnector;
use std::sync::Arc;
use std::time::Duration;

/// Config pointing at a local test server, with millisecond backoff.
pub fn config_for(base: &str) -> CapsyncConfig {
    CapsyncConfig {
        api_base_url: format!("{base}/api"),
        store_base_url: format!("{base}/store"),
        auth_token: Some("secret-token".into()),
        retry: Some(RetryConfig {
            backoff_step_ms: 10,
            backoff_cap_ms: 50,
            ..RetryConfig::default()
        }),
        ..CapsyncConfig::default()
    }
}

pub fn connector_for(cfg: &CapsyncConfig) -> Arc<CurlConnector> {
    Arc::new(CurlConnector::new(Some(&cfg.api_base_url), Duration::from_secs(2)).unwrap())
}

/// Base URL of a port nothing listens on.
pub fn dead_base() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{port}")
}
