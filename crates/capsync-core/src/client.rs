//! Caller-facing facade: executor plus dedup cache.

use std::sync::Arc;
use std::time::Duration;

use crate::auth::CredentialProvider;
use crate::config::CapsyncConfig;
use crate::control::CancelToken;
use crate::dedup::DedupCache;
use crate::executor::{ExecutionResult, RequestExecutor};
use crate::request::RequestDescriptor;
use crate::transport::Connector;

/// Entry point for domain code. Cheap to clone; clones share the cache.
#[derive(Clone)]
pub struct RemoteClient {
    executor: RequestExecutor,
    cache: DedupCache<ExecutionResult>,
}

impl RemoteClient {
    pub fn new(executor: RequestExecutor, dedup_ttl: Duration) -> Self {
        Self {
            executor,
            cache: DedupCache::new(dedup_ttl),
        }
    }

    pub fn from_config(
        cfg: &CapsyncConfig,
        connector: Arc<dyn Connector>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        let executor = RequestExecutor::from_config(cfg, connector, credentials);
        Self::new(executor, cfg.dedup_ttl())
    }

    pub fn executor(&self) -> &RequestExecutor {
        &self.executor
    }

    /// Run an operation without dedup (mutations, uploads).
    pub async fn execute(&self, descriptor: &RequestDescriptor) -> ExecutionResult {
        self.executor.execute(descriptor).await
    }

    pub async fn execute_with_cancel(
        &self,
        descriptor: &RequestDescriptor,
        cancel: &CancelToken,
    ) -> ExecutionResult {
        self.executor.execute_with_cancel(descriptor, cancel).await
    }

    /// Run a read keyed by a logical resource (e.g. `"media:42"`). Concurrent
    /// reads of the same key share one execution and one result.
    pub async fn fetch(&self, key: &str, descriptor: RequestDescriptor) -> Arc<ExecutionResult> {
        let executor = self.executor.clone();
        self.cache
            .get_or_create(key, move || async move { executor.execute(&descriptor).await })
            .await
    }

    /// Force the next `fetch` of any key starting with `key_prefix` to hit the network.
    pub fn invalidate(&self, key_prefix: &str) -> usize {
        self.cache.invalidate(key_prefix)
    }
}
