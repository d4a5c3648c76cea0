//! Durable storage of the rotating refresh token.
//!
//! A [`SecretStore`] wraps a [`SecretBackend`] (Google Secret Manager in
//! production, an in-memory history for local runs and tests) and adds the
//! static fallback value read from configuration.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use fitbit_client::retry::RetryPolicy;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::Mutex;

use crate::error::SecretStoreError;

/// Versioned keyed storage. Versions are append-only.
#[async_trait]
pub trait SecretBackend: Send + Sync + 'static {
    /// Latest version of `name`, or `None` when the secret or its versions do not exist.
    async fn access_latest(&self, name: &str) -> Result<Option<String>, SecretStoreError>;

    /// Create the secret container. An already existing container is not an error.
    async fn create(&self, name: &str) -> Result<(), SecretStoreError>;

    /// Append `value` as the new latest version.
    async fn add_version(&self, name: &str, value: &str) -> Result<(), SecretStoreError>;
}

pub struct SecretStore {
    backend: Arc<dyn SecretBackend>,
    name: String,
    fallback: Option<SecretString>,
    retry: RetryPolicy,
}

impl SecretStore {
    pub fn new(
        backend: Arc<dyn SecretBackend>,
        name: impl Into<String>,
        fallback: Option<SecretString>,
    ) -> Self {
        Self {
            backend,
            name: name.into(),
            fallback: fallback.filter(|v| !v.expose_secret().trim().is_empty()),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Latest stored value, or the configured fallback when the backend is
    /// unavailable or holds nothing.
    pub async fn get(&self) -> Result<SecretString, SecretStoreError> {
        match self.backend.access_latest(&self.name).await {
            Ok(Some(value)) if !value.trim().is_empty() => {
                tracing::info!(secret = %self.name, "loaded latest secret version");
                return Ok(SecretString::new(value.into()));
            }
            Ok(_) => {
                tracing::warn!(secret = %self.name, "secret has no usable version; using fallback");
            }
            Err(e) => {
                tracing::warn!(secret = %self.name, error = %e, "secret backend read failed; using fallback");
            }
        }
        self.fallback
            .clone()
            .ok_or_else(|| SecretStoreError::Unavailable(self.name.clone()))
    }

    /// Append `value` as a new version, creating the secret first if needed.
    /// Every call adds a version, even when the value is unchanged.
    pub async fn set(&self, value: &SecretString) -> Result<(), SecretStoreError> {
        if let Err(e) = self.backend.create(&self.name).await {
            // adding the version below fails loudly if the secret really is missing
            tracing::debug!(secret = %self.name, error = %e, "secret create failed");
        }
        self.retry
            .retry_async(|| self.backend.add_version(&self.name, value.expose_secret()))
            .await?;
        tracing::info!(secret = %self.name, "stored new secret version");
        Ok(())
    }
}

/// Process-local backend keeping every version ever written.
#[derive(Default)]
pub struct InMemorySecretBackend {
    secrets: Mutex<HashMap<String, Vec<String>>>,
}

impl InMemorySecretBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend holding one secret with a single version.
    pub fn seeded(name: &str, value: &str) -> Self {
        let mut secrets = HashMap::new();
        secrets.insert(name.to_string(), vec![value.to_string()]);
        Self {
            secrets: Mutex::new(secrets),
        }
    }

    /// Full version history of `name`, oldest first.
    pub async fn versions(&self, name: &str) -> Vec<String> {
        self.secrets
            .lock()
            .await
            .get(name)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl SecretBackend for InMemorySecretBackend {
    async fn access_latest(&self, name: &str) -> Result<Option<String>, SecretStoreError> {
        let map = self.secrets.lock().await;
        Ok(map.get(name).and_then(|versions| versions.last().cloned()))
    }

    async fn create(&self, name: &str) -> Result<(), SecretStoreError> {
        let mut map = self.secrets.lock().await;
        map.entry(name.to_string()).or_default();
        Ok(())
    }

    async fn add_version(&self, name: &str, value: &str) -> Result<(), SecretStoreError> {
        let mut map = self.secrets.lock().await;
        let versions = map
            .get_mut(name)
            .ok_or_else(|| SecretStoreError::Backend(format!("secret {name} not found")))?;
        versions.push(value.to_string());
        Ok(())
    }
}
