//! `capsync abandon <id>` – administrative Pending -> Abandoned transition.

use anyhow::Result;
use capsync_core::FallbackQueue;

pub async fn run_abandon(queue: &FallbackQueue, id: &str) -> Result<()> {
    queue.mark_abandoned(id).await?;
    tracing::info!(id, "record abandoned from cli");
    println!("Abandoned record {id}");
    Ok(())
}
