//! `capsync pending` – list fallback records.

use anyhow::Result;
use capsync_core::FallbackQueue;

pub async fn run_pending(queue: &FallbackQueue, all: bool) -> Result<()> {
    let records = if all {
        queue.list_all().await?
    } else {
        queue.list_pending().await?
    };
    if records.is_empty() {
        println!("No records in the fallback queue.");
        return Ok(());
    }
    println!("{:<36} {:<10} {:<10} {:<24} {}", "ID", "STATE", "BYTES", "OBJECT", "LAST ERROR");
    for r in records {
        let bytes = r
            .decode_payload()
            .map(|p| p.len().to_string())
            .unwrap_or_else(|_| "corrupt".to_string());
        let object = r.metadata["object_key"].as_str().unwrap_or("-");
        println!(
            "{:<36} {:<10} {:<10} {:<24} {}",
            r.id,
            r.sync_state.as_str(),
            bytes,
            object,
            r.last_error.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}
