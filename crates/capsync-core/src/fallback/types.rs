//! Types stored in the fallback queue.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::Value;
use std::fmt;

use super::db::unix_timestamp;

/// Record identifier (UUID v4 string).
pub type FallbackId = String;

/// Sync state stored as a string in the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Pending,
    Synced,
    Abandoned,
}

impl SyncState {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncState::Pending => "pending",
            SyncState::Synced => "synced",
            SyncState::Abandoned => "abandoned",
        }
    }

    /// Unknown values map to Pending so a record is never dropped from the sweep.
    pub fn from_str(s: &str) -> Self {
        match s {
            "synced" => SyncState::Synced,
            "abandoned" => SyncState::Abandoned,
            _ => SyncState::Pending,
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A payload kept locally until it can be synced.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalFallbackRecord {
    pub id: FallbackId,
    /// Base64 (standard alphabet) of the original payload bytes.
    pub encoded_payload: String,
    pub metadata: Value,
    /// Unix seconds.
    pub created_at: i64,
    pub sync_state: SyncState,
    /// Reason of the most recent failed remote attempt, if any.
    pub last_error: Option<String>,
}

impl LocalFallbackRecord {
    pub fn new(payload: &[u8], metadata: Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            encoded_payload: STANDARD.encode(payload),
            metadata,
            created_at: unix_timestamp(),
            sync_state: SyncState::Pending,
            last_error: None,
        }
    }

    pub fn with_last_error(mut self, reason: impl Into<String>) -> Self {
        self.last_error = Some(reason.into());
        self
    }

    /// Original payload bytes.
    pub fn decode_payload(&self) -> Result<Vec<u8>, FallbackError> {
        STANDARD
            .decode(&self.encoded_payload)
            .map_err(|source| FallbackError::CorruptPayload {
                id: self.id.clone(),
                source,
            })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FallbackError {
    #[error("fallback database: {0}")]
    Database(#[from] sqlx::Error),
    #[error("fallback metadata: {0}")]
    Metadata(#[from] serde_json::Error),
    #[error("state directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("state directory: {0}")]
    Xdg(#[from] xdg::BaseDirectoriesError),
    #[error("record {id} has a corrupt payload: {source}")]
    CorruptPayload {
        id: FallbackId,
        source: base64::DecodeError,
    },
    #[error("record {0} not found")]
    NotFound(FallbackId),
    #[error("record {id} is {state}, not pending")]
    NotPending { id: FallbackId, state: SyncState },
}
