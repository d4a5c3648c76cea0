//! Error taxonomy for a sync run.

use fitbit_client::{FitbitError, MetricKind};
use thiserror::Error;

/// Failure to obtain an access token.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no refresh token available")]
    NoRefreshToken,

    #[error("token exchange rejected with status {status}: {body}")]
    ExchangeRejected { status: u16, body: String },

    #[error("token endpoint unreachable: {0}")]
    Transport(String),

    #[error("token response did not contain a refresh token")]
    MissingRefreshToken,
}

impl From<FitbitError> for AuthError {
    fn from(err: FitbitError) -> Self {
        match err.status() {
            Some(status) => AuthError::ExchangeRejected {
                status,
                body: err.body().unwrap_or_default().to_string(),
            },
            None => AuthError::Transport(err.to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub enum SecretStoreError {
    #[error("secret {0} is not available and no fallback is configured")]
    Unavailable(String),

    #[error("secret backend error: {0}")]
    Backend(String),
}

impl From<reqwest::Error> for SecretStoreError {
    fn from(err: reqwest::Error) -> Self {
        SecretStoreError::Backend(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum DocumentStoreError {
    #[error("document store request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected status {status} for {method} {path}")]
    Status {
        method: &'static str,
        path: String,
        status: u16,
    },

    #[error("document store not configured: {0}")]
    NotConfigured(String),
}

/// Top-level error of the sync crate.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("authorization error: {0}")]
    Auth(#[from] AuthError),

    #[error("fetch of {kind} failed: {source}")]
    Fetch {
        kind: MetricKind,
        #[source]
        source: FitbitError,
    },

    #[error("secret store error: {0}")]
    SecretStore(#[from] SecretStoreError),

    #[error("document store error: {0}")]
    DocumentStore(#[from] DocumentStoreError),
}

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;
