//! Durable local queue of uploads that could not reach the remote store
//! (SQLite via sqlx).
//!
//! Pure storage: no network awareness. A sync sweep lists pending records,
//! retries them through the upload orchestrator, and marks them synced only
//! after a full remote round-trip.

pub mod db;
pub mod records;
pub mod types;

pub use db::FallbackQueue;
pub use types::*;
