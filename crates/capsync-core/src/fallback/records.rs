//! Record operations: enqueue, list, state transitions.

use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::db::{unix_timestamp, FallbackQueue};
use super::types::{FallbackError, LocalFallbackRecord, SyncState};

fn record_from_row(row: &SqliteRow) -> Result<LocalFallbackRecord, FallbackError> {
    let metadata_json: String = row.get("metadata_json");
    let state_str: String = row.get("sync_state");
    Ok(LocalFallbackRecord {
        id: row.get("id"),
        encoded_payload: row.get("encoded_payload"),
        metadata: serde_json::from_str::<Value>(&metadata_json)?,
        created_at: row.get("created_at"),
        sync_state: SyncState::from_str(&state_str),
        last_error: row.get("last_error"),
    })
}

impl FallbackQueue {
    /// Persist a record. The record keeps whatever state it carries (normally Pending).
    pub async fn enqueue(&self, record: &LocalFallbackRecord) -> Result<(), FallbackError> {
        let now = unix_timestamp();
        let metadata_json = serde_json::to_string(&record.metadata)?;
        sqlx::query(
            r#"
            INSERT INTO fallback_records (
                id, encoded_payload, metadata_json, sync_state,
                created_at, updated_at, last_error
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&record.id)
        .bind(&record.encoded_payload)
        .bind(metadata_json)
        .bind(record.sync_state.as_str())
        .bind(record.created_at)
        .bind(now)
        .bind(&record.last_error)
        .execute(&self.pool)
        .await?;

        tracing::info!(
            id = %record.id,
            bytes = record.encoded_payload.len(),
            "payload stored in fallback queue"
        );
        Ok(())
    }

    /// Pending records, oldest first (replay order).
    pub async fn list_pending(&self) -> Result<Vec<LocalFallbackRecord>, FallbackError> {
        let rows = sqlx::query(
            r#"
            SELECT id, encoded_payload, metadata_json, sync_state, created_at, last_error
            FROM fallback_records
            WHERE sync_state = 'pending'
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(record_from_row).collect()
    }

    /// Every record regardless of state, newest first.
    pub async fn list_all(&self) -> Result<Vec<LocalFallbackRecord>, FallbackError> {
        let rows = sqlx::query(
            r#"
            SELECT id, encoded_payload, metadata_json, sync_state, created_at, last_error
            FROM fallback_records
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(record_from_row).collect()
    }

    pub async fn get(&self, id: &str) -> Result<Option<LocalFallbackRecord>, FallbackError> {
        let row = sqlx::query(
            r#"
            SELECT id, encoded_payload, metadata_json, sync_state, created_at, last_error
            FROM fallback_records
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(record_from_row).transpose()
    }

    /// Pending -> Synced. Only valid after the remote copy is confirmed.
    pub async fn mark_synced(&self, id: &str) -> Result<(), FallbackError> {
        self.transition_from_pending(id, SyncState::Synced).await
    }

    /// Pending -> Abandoned. The record stays on disk but is no longer replayed.
    pub async fn mark_abandoned(&self, id: &str) -> Result<(), FallbackError> {
        self.transition_from_pending(id, SyncState::Abandoned).await
    }

    /// Remember why the latest replay of a pending record failed.
    pub async fn record_failure(&self, id: &str, reason: &str) -> Result<(), FallbackError> {
        let now = unix_timestamp();
        let r = sqlx::query(
            r#"
            UPDATE fallback_records
            SET last_error = ?1,
                updated_at = ?2
            WHERE id = ?3
            "#,
        )
        .bind(reason)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        if r.rows_affected() == 0 {
            return Err(FallbackError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn transition_from_pending(&self, id: &str, to: SyncState) -> Result<(), FallbackError> {
        let now = unix_timestamp();
        let r = sqlx::query(
            r#"
            UPDATE fallback_records
            SET sync_state = ?1,
                updated_at = ?2
            WHERE id = ?3 AND sync_state = 'pending'
            "#,
        )
        .bind(to.as_str())
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if r.rows_affected() == 0 {
            return match self.get(id).await? {
                None => Err(FallbackError::NotFound(id.to_string())),
                Some(rec) => Err(FallbackError::NotPending {
                    id: id.to_string(),
                    state: rec.sync_state,
                }),
            };
        }
        tracing::debug!(id, state = %to, "fallback record transitioned");
        Ok(())
    }
}
