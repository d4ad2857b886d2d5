pub mod config;
pub mod logging;

pub mod auth;
pub mod client;
pub mod control;
pub mod dedup;
pub mod executor;
pub mod fallback;
pub mod request;
pub mod retry;
pub mod transport;
pub mod upload;

#[cfg(test)]
pub(crate) mod test_support;

pub use client::RemoteClient;
pub use control::CancelToken;
pub use dedup::DedupCache;
pub use executor::{ExecutionResult, RequestExecutor};
pub use fallback::{FallbackQueue, LocalFallbackRecord, SyncState};
pub use request::{Body, Method, PayloadClass, RequestDefaults, RequestDescriptor};
pub use retry::{ErrorKind, ExecutionError};
pub use transport::{Connector, ResilientTransport, Response};
pub use upload::{UploadOrchestrator, UploadOutcome};
