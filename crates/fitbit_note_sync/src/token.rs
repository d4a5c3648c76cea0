//! Access-token acquisition and refresh-token rotation.

use std::sync::Arc;

use fitbit_client::{FitbitClient, TokenGrant};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::Mutex;

use crate::error::{AuthError, SyncError};
use crate::secret_store::SecretStore;

/// Holds the run-scoped access token. The token is never persisted; only
/// rotated refresh tokens reach the [`SecretStore`].
pub struct TokenLifecycle {
    client: Arc<dyn FitbitClient>,
    secrets: Arc<SecretStore>,
    // held across the exchange so concurrent callers share one refresh
    current: Mutex<Option<SecretString>>,
}

impl TokenLifecycle {
    pub fn new(client: Arc<dyn FitbitClient>, secrets: Arc<SecretStore>) -> Self {
        Self {
            client,
            secrets,
            current: Mutex::new(None),
        }
    }

    /// Cached access token for this run, obtained on first use.
    pub async fn access_token(&self) -> Result<SecretString, AuthError> {
        let mut current = self.current.lock().await;
        if let Some(token) = current.as_ref() {
            return Ok(token.clone());
        }
        let token = self.obtain_access_token().await?;
        *current = Some(token.clone());
        Ok(token)
    }

    /// Replace `stale` after a 401. When another caller already refreshed
    /// past `stale`, its token is returned without a second exchange.
    pub async fn reauthorize(&self, stale: &SecretString) -> Result<SecretString, AuthError> {
        let mut current = self.current.lock().await;
        if let Some(token) = current.as_ref() {
            if token.expose_secret() != stale.expose_secret() {
                return Ok(token.clone());
            }
        }
        let token = self.obtain_access_token().await?;
        *current = Some(token.clone());
        Ok(token)
    }

    /// Exchange the current refresh token for a new access token. A rotated
    /// refresh token is written to the secret store before returning.
    pub async fn obtain_access_token(&self) -> Result<SecretString, AuthError> {
        let refresh = match self.secrets.get().await {
            Ok(token) if !token.expose_secret().trim().is_empty() => token,
            Ok(_) => return Err(AuthError::NoRefreshToken),
            Err(e) => {
                tracing::error!(error = %e, "no refresh token available");
                return Err(AuthError::NoRefreshToken);
            }
        };

        let response = self
            .client
            .exchange_token(&TokenGrant::RefreshToken(refresh.clone()))
            .await
            .map_err(|e| {
                tracing::error!(error = %e, body = e.body().unwrap_or_default(), "token refresh failed");
                AuthError::from(e)
            })?;

        if let Some(rotated) = response.refresh_token.as_ref() {
            if rotated.expose_secret() != refresh.expose_secret() {
                match self.secrets.set(rotated).await {
                    Ok(()) => {
                        metrics::counter!("fitbit_refresh_token_rotations_total").increment(1);
                        tracing::info!("refresh token rotated and stored");
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "failed to store rotated refresh token");
                    }
                }
            }
        }

        tracing::info!("access token refreshed");
        Ok(response.access_token)
    }

    /// One-time exchange of an authorization code. Stores the issued refresh
    /// token and does nothing else.
    pub async fn bootstrap(
        &self,
        authorization_code: &SecretString,
        redirect_uri: &str,
    ) -> Result<(), SyncError> {
        let code = authorization_code.expose_secret();
        let shown: String = code.chars().take(10).collect();
        tracing::info!(code_prefix = %shown, "exchanging authorization code for a refresh token");

        let grant = TokenGrant::AuthorizationCode {
            code: authorization_code.clone(),
            redirect_uri: redirect_uri.to_string(),
        };
        let response = self.client.exchange_token(&grant).await.map_err(|e| {
            tracing::error!(error = %e, body = e.body().unwrap_or_default(), "authorization code exchange failed");
            AuthError::from(e)
        })?;
        let refresh = response
            .refresh_token
            .ok_or(AuthError::MissingRefreshToken)?;
        self.secrets.set(&refresh).await?;
        tracing::info!(secret = %self.secrets.name(), "initial refresh token stored");
        Ok(())
    }
}
