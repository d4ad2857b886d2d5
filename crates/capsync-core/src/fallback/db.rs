//! SQLite-backed fallback queue: connection, migrations, timestamp helper.
//! Record operations live in `records`.

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use super::types::FallbackError;

/// Percent-encode a path for use in a sqlite:// URI so spaces and special chars don't break parsing.
fn path_to_sqlite_uri(path: &Path) -> String {
    let s = path.to_string_lossy();
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '%' => out.push_str("%25"),
            ' ' => out.push_str("%20"),
            '#' => out.push_str("%23"),
            '?' => out.push_str("%3F"),
            '&' => out.push_str("%26"),
            c => out.push(c),
        }
    }
    format!("sqlite://{}", out)
}

/// Handle to the fallback queue database.
///
/// The default file lives under the XDG state directory:
/// `~/.local/state/capsync/fallback.db`.
#[derive(Clone)]
pub struct FallbackQueue {
    pub(crate) pool: Pool<Sqlite>,
}

impl FallbackQueue {
    /// Open (or create) the default queue database and run migrations.
    pub async fn open_default() -> Result<Self, FallbackError> {
        let xdg_dirs = xdg::BaseDirectories::with_prefix("capsync")?;
        let state_dir = xdg_dirs.get_state_home().join("capsync");
        Self::open_at(state_dir.join("fallback.db")).await
    }

    /// Open (or create) the database at a specific path. Creates parent dirs if needed.
    pub async fn open_at(path: impl AsRef<Path>) -> Result<Self, FallbackError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let uri = path_to_sqlite_uri(path) + "?mode=rwc";
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect(&uri)
            .await?;
        let queue = FallbackQueue { pool };
        queue.migrate().await?;
        Ok(queue)
    }

    /// In-memory queue (single connection so every query sees the same database).
    pub async fn open_in_memory() -> Result<Self, FallbackError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let queue = FallbackQueue { pool };
        queue.migrate().await?;
        Ok(queue)
    }

    async fn migrate(&self) -> Result<(), FallbackError> {
        // - `encoded_payload` is base64 text of the original bytes.
        // - `metadata_json` holds the upload envelope needed to replay the record.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS fallback_records (
                id TEXT PRIMARY KEY,
                encoded_payload TEXT NOT NULL,
                metadata_json TEXT NOT NULL,
                sync_state TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                last_error TEXT
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS fallback_records_state
            ON fallback_records (sync_state, created_at);
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Current time as Unix seconds.
pub(crate) fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlite_uri_escapes_special_chars() {
        let uri = path_to_sqlite_uri(Path::new("/tmp/my dir/q#1.db"));
        assert_eq!(uri, "sqlite:///tmp/my%20dir/q%231.db");
    }
}
