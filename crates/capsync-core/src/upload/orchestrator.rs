//! Upload state machine:
//! SelectingStrategy -> Uploading -> ConfirmingMetadata -> Done, with side
//! exits Uploading -> Fallback on exhaustion and
//! ConfirmingMetadata -> Compensating -> Fallback when registration fails
//! after the bytes landed.

use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use super::progress::{ProgressCallback, ProgressReporter};
use super::replay::to_envelope;
use super::session::UploadSession;
use super::store::{MediaRegistration, MetadataApi, ObjectStoreApi, RestMetadataRegistry, RestObjectStore};
use super::strategy::{select_strategy, Strategy};
use super::{
    Thumbnail, UploadError, UploadOutcome, UploadPayload, UploadPolicy, UploadResult, UploadSettings,
};
use crate::config::CapsyncConfig;
use crate::control::CancelToken;
use crate::executor::RequestExecutor;
use crate::fallback::{FallbackQueue, LocalFallbackRecord};
use crate::request::RequestDescriptor;
use crate::retry::{ErrorKind, ExecutionError};
use crate::transport::Response;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UploadPhase {
    SelectingStrategy,
    Uploading,
    ConfirmingMetadata,
    Compensating,
    Fallback,
    Done,
}

impl fmt::Display for UploadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UploadPhase::SelectingStrategy => "selecting_strategy",
            UploadPhase::Uploading => "uploading",
            UploadPhase::ConfirmingMetadata => "confirming_metadata",
            UploadPhase::Compensating => "compensating",
            UploadPhase::Fallback => "fallback",
            UploadPhase::Done => "done",
        })
    }
}

fn enter(phase: UploadPhase, object_key: &str) {
    tracing::debug!(object_key, phase = %phase, "upload phase");
}

/// Stage failure outside of chunk transfer.
fn stage_error(err: ExecutionError) -> UploadError {
    if err.kind == ErrorKind::Cancelled {
        UploadError::Cancelled
    } else if err.retries_exhausted {
        UploadError::AllStrategiesExhausted(err)
    } else {
        UploadError::Rejected(err)
    }
}

fn chunk_error(index: u64, err: ExecutionError) -> UploadError {
    if err.kind == ErrorKind::Cancelled {
        UploadError::Cancelled
    } else {
        UploadError::ChunkUploadFailed { index, source: err }
    }
}

fn malformed(operation: &'static str) -> impl FnOnce(serde_json::Error) -> UploadError {
    move |source| UploadError::MalformedResponse { operation, source }
}

/// Drives uploads through the request executor. Cheap to clone.
#[derive(Clone)]
pub struct UploadOrchestrator {
    executor: RequestExecutor,
    store: Arc<dyn ObjectStoreApi>,
    registry: Arc<dyn MetadataApi>,
    queue: FallbackQueue,
    settings: UploadSettings,
}

impl UploadOrchestrator {
    pub fn new(
        executor: RequestExecutor,
        store: Arc<dyn ObjectStoreApi>,
        registry: Arc<dyn MetadataApi>,
        queue: FallbackQueue,
    ) -> Self {
        Self {
            executor,
            store,
            registry,
            queue,
            settings: UploadSettings::default(),
        }
    }

    /// REST store and registry at the configured base URLs.
    pub fn from_config(cfg: &CapsyncConfig, executor: RequestExecutor, queue: FallbackQueue) -> Self {
        Self::new(
            executor,
            Arc::new(RestObjectStore::from_config(cfg)),
            Arc::new(RestMetadataRegistry::from_config(cfg)),
            queue,
        )
        .with_settings(cfg.upload_settings())
    }

    pub fn with_settings(mut self, settings: UploadSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> UploadSettings {
        self.settings
    }

    pub fn queue(&self) -> &FallbackQueue {
        &self.queue
    }

    pub async fn upload(
        &self,
        payload: UploadPayload,
        metadata: Value,
        policy: &UploadPolicy,
        on_progress: Option<ProgressCallback>,
    ) -> Result<UploadOutcome, UploadError> {
        self.upload_with_cancel(payload, metadata, policy, on_progress, &CancelToken::new())
            .await
    }

    /// Upload `payload` and register `metadata` for it. Exhaustion of the
    /// remote side yields `UploadOutcome::Fallback` with the stored record;
    /// fatal rejections and cancellation are errors.
    pub async fn upload_with_cancel(
        &self,
        payload: UploadPayload,
        metadata: Value,
        policy: &UploadPolicy,
        on_progress: Option<ProgressCallback>,
        cancel: &CancelToken,
    ) -> Result<UploadOutcome, UploadError> {
        let mut progress = ProgressReporter::new(on_progress);
        match self.run(&payload, &metadata, policy, &mut progress, cancel).await {
            Ok(result) => {
                progress.finish();
                Ok(UploadOutcome::Uploaded(result))
            }
            Err(err) if err.routes_to_fallback() => {
                enter(UploadPhase::Fallback, &payload.object_key);
                let record = LocalFallbackRecord::new(&payload.data, to_envelope(&payload, &metadata))
                    .with_last_error(err.to_string());
                self.queue.enqueue(&record).await?;
                tracing::warn!(
                    object_key = %payload.object_key,
                    record_id = %record.id,
                    error = %err,
                    "remote upload exhausted, payload kept locally"
                );
                Ok(UploadOutcome::Fallback(record))
            }
            Err(err) => {
                tracing::warn!(object_key = %payload.object_key, error = %err, "upload failed");
                Err(err)
            }
        }
    }

    /// Full remote round-trip (bytes, thumbnail, metadata) without fallback.
    pub(crate) async fn run(
        &self,
        payload: &UploadPayload,
        metadata: &Value,
        policy: &UploadPolicy,
        progress: &mut ProgressReporter,
        cancel: &CancelToken,
    ) -> Result<UploadResult, UploadError> {
        let key = payload.object_key.as_str();
        enter(UploadPhase::SelectingStrategy, key);
        let strategy = select_strategy(payload.size(), self.settings.simple_threshold);
        tracing::info!(
            object_key = key,
            bytes = payload.size(),
            strategy = %strategy,
            "upload started"
        );

        enter(UploadPhase::Uploading, key);
        let (main, thumbnail_locator) = tokio::join!(
            self.transfer(payload, strategy, policy, progress, cancel),
            self.upload_thumbnail(payload.thumbnail.as_ref(), policy, cancel),
        );
        let transferred = match main {
            Ok(transferred) => transferred,
            Err(err) => {
                if let Some(thumb) = &thumbnail_locator {
                    self.compensate(thumb).await;
                }
                return Err(err);
            }
        };
        let locator = transferred.locator;

        enter(UploadPhase::ConfirmingMetadata, key);
        let registration = MediaRegistration {
            locator: locator.clone(),
            thumbnail_locator: thumbnail_locator.clone(),
            content_type: payload.content_type.clone(),
            size_bytes: payload.size(),
            metadata: metadata.clone(),
        };
        let descriptor = self
            .registry
            .register(&registration)
            .retry_budget(policy.retry_budget);
        let response = match self.call(&descriptor, cancel).await {
            Ok(response) => response,
            Err(err) => {
                self.compensate_upload(key, &locator, thumbnail_locator.as_deref())
                    .await;
                if err.kind == ErrorKind::Cancelled {
                    return Err(UploadError::Cancelled);
                }
                return Err(UploadError::MetadataRegistrationFailed(err));
            }
        };
        let metadata_id = match self.registry.parse_identifier(&response) {
            Ok(id) => id,
            Err(err) => {
                // Without an id nothing can reference the stored bytes.
                self.compensate_upload(key, &locator, thumbnail_locator.as_deref())
                    .await;
                return Err(malformed("metadata registration")(err));
            }
        };

        enter(UploadPhase::Done, key);
        tracing::info!(
            object_key = key,
            locator = %locator,
            metadata_id = %metadata_id,
            "upload complete"
        );
        Ok(UploadResult {
            locator,
            metadata_id,
            strategy,
            bytes_confirmed: transferred.bytes_confirmed,
            thumbnail_locator,
        })
    }

    async fn call(
        &self,
        descriptor: &RequestDescriptor,
        cancel: &CancelToken,
    ) -> Result<Response, ExecutionError> {
        self.executor
            .execute_with_cancel(descriptor, cancel)
            .await
            .into_response()
    }

    async fn transfer(
        &self,
        payload: &UploadPayload,
        strategy: Strategy,
        policy: &UploadPolicy,
        progress: &mut ProgressReporter,
        cancel: &CancelToken,
    ) -> Result<Transferred, UploadError> {
        let total = payload.size();
        let thumbnail_path = payload.thumbnail.as_ref().map(|t| t.object_key.clone());
        progress.bytes(0, total);

        match strategy {
            Strategy::Simple => {
                let mut session = UploadSession::simple(total, thumbnail_path);
                let descriptor = self
                    .store
                    .simple_upload(&payload.object_key, &payload.content_type, payload.data.clone())
                    .retry_budget(policy.retry_budget);
                let response = self.call(&descriptor, cancel).await.map_err(stage_error)?;
                let locator = self
                    .store
                    .parse_locator(&response)
                    .map_err(malformed("simple upload"))?;
                session.confirm_all();
                progress.bytes(session.bytes_confirmed(), total);
                Ok(Transferred {
                    locator,
                    bytes_confirmed: session.bytes_confirmed(),
                })
            }
            Strategy::Resumable => {
                let descriptor = self
                    .store
                    .create_session(
                        &payload.object_key,
                        &payload.content_type,
                        total,
                        self.settings.chunk_size,
                    )
                    .retry_budget(policy.retry_budget);
                let response = self.call(&descriptor, cancel).await.map_err(stage_error)?;
                let session_id = self
                    .store
                    .parse_session_id(&response)
                    .map_err(malformed("session create"))?;
                let mut session =
                    UploadSession::resumable(session_id.clone(), total, self.settings.chunk_size, thumbnail_path);
                tracing::debug!(
                    object_key = %payload.object_key,
                    session_id = %session_id,
                    chunks = session.chunk_count(),
                    "resumable session opened"
                );

                while let Some(chunk) = session.next_chunk() {
                    let data = payload.data[chunk.start as usize..chunk.end as usize].to_vec();
                    let descriptor = self
                        .store
                        .put_chunk(&session_id, &chunk, total, data)
                        .retry_budget(policy.retry_budget);
                    let result = self.executor.execute_with_cancel(&descriptor, cancel).await;
                    let attempts = result.attempts_used;
                    if let Err(err) = result.value {
                        tracing::warn!(
                            session_id = %session_id,
                            chunk = chunk.index,
                            attempts,
                            confirmed = session.bytes_confirmed(),
                            error = %err,
                            "chunk upload failed"
                        );
                        return Err(chunk_error(chunk.index, err));
                    }
                    session.confirm(&chunk);
                    progress.bytes(session.bytes_confirmed(), total);
                    tracing::trace!(
                        session_id = %session_id,
                        chunk = chunk.index,
                        attempts,
                        confirmed = session.bytes_confirmed(),
                        "chunk confirmed"
                    );
                }

                let descriptor = self
                    .store
                    .finalize_session(&session_id)
                    .retry_budget(policy.retry_budget);
                let response = self.call(&descriptor, cancel).await.map_err(stage_error)?;
                let locator = self
                    .store
                    .parse_locator(&response)
                    .map_err(malformed("session finalize"))?;
                Ok(Transferred {
                    locator,
                    bytes_confirmed: session.bytes_confirmed(),
                })
            }
        }
    }

    /// Independent simple upload; failure only costs the thumbnail.
    async fn upload_thumbnail(
        &self,
        thumbnail: Option<&Thumbnail>,
        policy: &UploadPolicy,
        cancel: &CancelToken,
    ) -> Option<String> {
        let thumbnail = thumbnail?;
        let descriptor = self
            .store
            .simple_upload(&thumbnail.object_key, &thumbnail.content_type, thumbnail.data.clone())
            .retry_budget(policy.retry_budget);
        let parsed = match self.call(&descriptor, cancel).await {
            Ok(response) => self.store.parse_locator(&response).map_err(|e| e.to_string()),
            Err(err) => Err(err.to_string()),
        };
        match parsed {
            Ok(locator) => Some(locator),
            Err(reason) => {
                tracing::warn!(
                    object_key = %thumbnail.object_key,
                    reason = %reason,
                    "thumbnail upload failed, continuing without it"
                );
                None
            }
        }
    }

    async fn compensate_upload(&self, object_key: &str, locator: &str, thumbnail: Option<&str>) {
        enter(UploadPhase::Compensating, object_key);
        self.compensate(locator).await;
        if let Some(thumb) = thumbnail {
            self.compensate(thumb).await;
        }
    }

    /// Best-effort delete of an object nobody will reference. Runs even when
    /// the upload was cancelled.
    async fn compensate(&self, locator: &str) -> bool {
        let descriptor = self.store.delete_object(locator);
        match self.executor.execute(&descriptor).await.into_response() {
            Ok(_) => {
                tracing::info!(locator, "orphaned object deleted");
                true
            }
            Err(err) => {
                tracing::warn!(locator, error = %err, "failed to delete orphaned object");
                false
            }
        }
    }
}

struct Transferred {
    locator: String,
    bytes_confirmed: u64,
}
