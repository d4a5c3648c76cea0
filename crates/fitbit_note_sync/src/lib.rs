//! Sync Fitbit daily metrics into daily notes on a WebDAV store.
//!
//! A run either bootstraps the refresh token from a one-time authorization
//! code, or fetches the most recent days of metrics and merges a rendered
//! data section into each day's note.

pub mod config;
pub mod document_store;
pub mod error;
pub mod fetcher;
pub mod formatter;
pub mod gcp_secrets;
pub mod http;
pub mod merger;
pub mod orchestrator;
pub mod secret_store;
pub mod template;
pub mod token;

#[cfg(test)]
mod test_utils;

pub use config::SyncConfig;
pub use error::{SyncError, SyncResult};
pub use orchestrator::{DateResult, RunReport, SyncOrchestrator, SyncSettings};

/// Install the global subscriber. The filter comes from
/// `FITBIT_SYNC_LOG_LEVEL`, then `RUST_LOG`, then `info`.
pub fn init_tracing() -> String {
    let log_env = std::env::var("FITBIT_SYNC_LOG_LEVEL")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_new(format!("{log_env},hyper=warn"))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,hyper=warn"));
    tracing_subscriber::fmt()
        .compact()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false)
        .with_env_filter(env_filter)
        .init();
    log_env
}
