//! CLI command handlers, one file per command.

mod abandon;
mod config;
mod pending;
mod sync;

pub use abandon::run_abandon;
pub use config::run_config;
pub use pending::run_pending;
pub use sync::run_sync;
