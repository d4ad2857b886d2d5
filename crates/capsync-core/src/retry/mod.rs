//! Retry and backoff policy.
//!
//! This module holds the error taxonomy, the mapping from HTTP statuses and
//! curl errors onto it, and the escalating-timeout / backoff arithmetic, so
//! the executor and the upload orchestrator share one consistent policy.

mod classify;
mod error;
mod policy;

pub use classify::{classify_curl_error, classify_status};
pub use error::{ErrorKind, ExecutionError};
pub use policy::{RetryDecision, RetryPolicy};
