use capsync_core::logging;

mod cli;

use crate::cli::Cli;

#[tokio::main]
async fn main() {
    // Logging first; fall back to stderr when the state dir is unusable.
    if let Err(err) = logging::init_logging() {
        logging::init_logging_stderr();
        tracing::warn!("file logging unavailable: {:#}", err);
    }

    if let Err(err) = Cli::run_from_args().await {
        eprintln!("capsync error: {:#}", err);
        std::process::exit(1);
    }
}
