//! Fallback envelope and replay of pending records.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::orchestrator::UploadOrchestrator;
use super::progress::ProgressReporter;
use super::{Thumbnail, UploadError, UploadPayload, UploadPolicy};
use crate::control::CancelToken;
use crate::fallback::LocalFallbackRecord;

/// What a fallback record's metadata column holds besides the payload.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    object_key: String,
    content_type: String,
    metadata: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    thumbnail: Option<EnvelopeThumbnail>,
}

#[derive(Debug, Serialize, Deserialize)]
struct EnvelopeThumbnail {
    object_key: String,
    content_type: String,
    /// Base64 of the thumbnail bytes.
    data: String,
}

pub(crate) fn to_envelope(payload: &UploadPayload, metadata: &Value) -> Value {
    let envelope = Envelope {
        object_key: payload.object_key.clone(),
        content_type: payload.content_type.clone(),
        metadata: metadata.clone(),
        thumbnail: payload.thumbnail.as_ref().map(|t| EnvelopeThumbnail {
            object_key: t.object_key.clone(),
            content_type: t.content_type.clone(),
            data: STANDARD.encode(&t.data),
        }),
    };
    serde_json::to_value(envelope).unwrap_or(Value::Null)
}

/// Rebuild the payload and caller metadata stored in `record`.
pub(crate) fn from_record(record: &LocalFallbackRecord) -> Result<(UploadPayload, Value), UploadError> {
    let corrupt = |detail: String| UploadError::CorruptRecord {
        id: record.id.clone(),
        detail,
    };
    let envelope: Envelope =
        serde_json::from_value(record.metadata.clone()).map_err(|e| corrupt(e.to_string()))?;
    let data = record.decode_payload().map_err(|e| corrupt(e.to_string()))?;
    let thumbnail = match envelope.thumbnail {
        Some(t) => Some(Thumbnail {
            object_key: t.object_key,
            content_type: t.content_type,
            data: STANDARD.decode(&t.data).map_err(|e| corrupt(e.to_string()))?,
        }),
        None => None,
    };
    let payload = UploadPayload {
        object_key: envelope.object_key,
        content_type: envelope.content_type,
        data,
        thumbnail,
    };
    Ok((payload, envelope.metadata))
}

/// Outcome of one replay sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    /// Records now Synced.
    pub synced: usize,
    /// Remote side still unavailable; will be retried next sweep.
    pub still_pending: usize,
    /// Rejected or unreadable; left Pending with `last_error` set for an operator.
    pub failed: usize,
}

impl SyncReport {
    pub fn attempted(&self) -> usize {
        self.synced + self.still_pending + self.failed
    }
}

impl UploadOrchestrator {
    /// Retry every pending record once, oldest first. A record becomes
    /// Synced only after bytes and metadata both reached the remote side;
    /// otherwise it stays Pending (never re-enqueued) with its latest error.
    /// Queue errors on a single record count it as failed; the sweep goes on.
    pub async fn replay_pending(&self, policy: &UploadPolicy) -> Result<SyncReport, UploadError> {
        let pending = self.queue().list_pending().await?;
        let mut report = SyncReport::default();
        tracing::info!(pending = pending.len(), "fallback replay started");

        for record in pending {
            let (payload, metadata) = match from_record(&record) {
                Ok(v) => v,
                Err(err) => {
                    tracing::warn!(record_id = %record.id, error = %err, "skipping unreadable record");
                    self.note_failure(&record.id, &err.to_string()).await;
                    report.failed += 1;
                    continue;
                }
            };

            let outcome = self
                .run(
                    &payload,
                    &metadata,
                    policy,
                    &mut ProgressReporter::silent(),
                    &CancelToken::new(),
                )
                .await;
            match outcome {
                Ok(result) => match self.queue().mark_synced(&record.id).await {
                    Ok(()) => {
                        tracing::info!(
                            record_id = %record.id,
                            locator = %result.locator,
                            "fallback record synced"
                        );
                        report.synced += 1;
                    }
                    Err(err) => {
                        // Uploaded, but the record left Pending meanwhile
                        // (abandoned, or synced by another sweep).
                        tracing::warn!(
                            record_id = %record.id,
                            locator = %result.locator,
                            error = %err,
                            "could not mark record synced"
                        );
                        report.failed += 1;
                    }
                },
                Err(err) => {
                    if !self.note_failure(&record.id, &err.to_string()).await {
                        report.failed += 1;
                    } else if err.routes_to_fallback() {
                        tracing::debug!(record_id = %record.id, error = %err, "record still pending");
                        report.still_pending += 1;
                    } else {
                        tracing::warn!(record_id = %record.id, error = %err, "record rejected on replay");
                        report.failed += 1;
                    }
                }
            }
        }

        tracing::info!(
            synced = report.synced,
            still_pending = report.still_pending,
            failed = report.failed,
            "fallback replay finished"
        );
        Ok(report)
    }

    /// Store `reason` on a pending record. Returns false if the queue refused.
    async fn note_failure(&self, id: &str, reason: &str) -> bool {
        match self.queue().record_failure(id, reason).await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(record_id = id, error = %err, "could not record replay failure");
                false
            }
        }
    }
}
