//! `capsync sync` – one replay sweep over pending records.

use anyhow::Result;
use capsync_core::auth::StaticCredentials;
use capsync_core::config::CapsyncConfig;
use capsync_core::transport::CurlConnector;
use capsync_core::upload::UploadPolicy;
use capsync_core::{FallbackQueue, RequestExecutor, UploadOrchestrator};
use std::sync::Arc;
use std::time::Duration;

pub async fn run_sync(cfg: &CapsyncConfig, queue: &FallbackQueue, retry_budget: Option<u32>) -> Result<()> {
    let connect_timeout = Duration::from_millis(cfg.transport_or_default().connect_timeout_ms);
    let connector = Arc::new(CurlConnector::new(Some(&cfg.api_base_url), connect_timeout)?);
    let credentials = Arc::new(StaticCredentials::new(cfg.auth_token.clone()));
    let executor = RequestExecutor::from_config(cfg, connector, credentials);
    let orchestrator = UploadOrchestrator::from_config(cfg, executor, queue.clone());

    let mut policy = UploadPolicy::from_config(cfg);
    if let Some(n) = retry_budget {
        policy.retry_budget = n.max(1);
    }
    let report = orchestrator.replay_pending(&policy).await?;
    println!(
        "Synced {}, still pending {}, failed {}",
        report.synced, report.still_pending, report.failed
    );
    Ok(())
}
