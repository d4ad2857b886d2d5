//! Media upload: strategy selection, chunked transfer, metadata
//! confirmation, compensation and local fallback.

mod orchestrator;
mod progress;
mod replay;
mod session;
pub mod store;
pub mod strategy;

pub use orchestrator::UploadOrchestrator;
pub use progress::ProgressCallback;
pub use replay::SyncReport;
pub use session::UploadSession;
pub use store::{MediaRegistration, MetadataApi, ObjectStoreApi, RestMetadataRegistry, RestObjectStore};
pub use strategy::{plan_chunks, select_strategy, Chunk, Strategy};

use crate::config::CapsyncConfig;
use crate::fallback::{FallbackError, LocalFallbackRecord};
use crate::retry::ExecutionError;

/// Size threshold and chunk size used to pick and drive a strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadSettings {
    /// Payloads strictly below this size are sent in one request.
    pub simple_threshold: u64,
    pub chunk_size: u64,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            simple_threshold: 50 * 1024 * 1024,
            chunk_size: 5 * 1024 * 1024,
        }
    }
}

/// Per-upload knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadPolicy {
    /// Attempts for every remote call of the upload (each chunk gets its own budget).
    pub retry_budget: u32,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self { retry_budget: 3 }
    }
}

impl UploadPolicy {
    pub fn from_config(cfg: &CapsyncConfig) -> Self {
        Self {
            retry_budget: cfg.upload_or_default().chunk_retry_budget.max(1),
        }
    }
}

/// Companion asset uploaded next to the main payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thumbnail {
    pub object_key: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPayload {
    pub object_key: String,
    pub content_type: String,
    pub data: Vec<u8>,
    pub thumbnail: Option<Thumbnail>,
}

impl UploadPayload {
    pub fn new(object_key: impl Into<String>, content_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            object_key: object_key.into(),
            content_type: content_type.into(),
            data,
            thumbnail: None,
        }
    }

    pub fn with_thumbnail(mut self, thumbnail: Thumbnail) -> Self {
        self.thumbnail = Some(thumbnail);
        self
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResult {
    /// Where the object store says the bytes live.
    pub locator: String,
    /// Identifier returned by metadata registration.
    pub metadata_id: String,
    pub strategy: Strategy,
    pub bytes_confirmed: u64,
    /// None when there was no thumbnail or its upload failed.
    pub thumbnail_locator: Option<String>,
}

/// Either the data reached the remote store, or it was kept locally.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadOutcome {
    Uploaded(UploadResult),
    Fallback(LocalFallbackRecord),
}

impl UploadOutcome {
    pub fn is_uploaded(&self) -> bool {
        matches!(self, UploadOutcome::Uploaded(_))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("chunk {index} failed: {source}")]
    ChunkUploadFailed { index: u64, source: ExecutionError },
    #[error("metadata registration failed: {0}")]
    MetadataRegistrationFailed(#[source] ExecutionError),
    #[error("all upload strategies exhausted: {0}")]
    AllStrategiesExhausted(#[source] ExecutionError),
    #[error("upload rejected: {0}")]
    Rejected(#[source] ExecutionError),
    #[error("upload cancelled")]
    Cancelled,
    #[error("malformed {operation} response: {source}")]
    MalformedResponse {
        operation: &'static str,
        source: serde_json::Error,
    },
    #[error("fallback record {id} cannot be replayed: {detail}")]
    CorruptRecord { id: String, detail: String },
    #[error(transparent)]
    Fallback(#[from] FallbackError),
}

impl UploadError {
    /// True when the remote side was unreachable long enough that the data
    /// should be kept locally instead of reported as a failure.
    pub fn routes_to_fallback(&self) -> bool {
        match self {
            UploadError::ChunkUploadFailed { source, .. } => source.retries_exhausted,
            UploadError::AllStrategiesExhausted(_) => true,
            UploadError::MetadataRegistrationFailed(_) => true,
            _ => false,
        }
    }
}
