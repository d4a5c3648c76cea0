//! HTTP client implementation for the Fitbit Web API.
//!
//! This module provides a reqwest-based implementation of the [`FitbitClient`](crate::FitbitClient) trait.

use crate::config::ClientConfig;
use crate::{FitbitClient, FitbitError, MetricKind, TokenGrant, TokenResponse};
use async_trait::async_trait;
use chrono::NaiveDate;
use secrecy::{ExposeSecret, SecretString};

/// Client for the Fitbit Web API using reqwest.
#[derive(Clone, Debug)]
pub struct ReqwestFitbitClient {
    base_url: String,
    client_id: String,
    client_secret: SecretString,
    client: reqwest::Client,
}

impl ReqwestFitbitClient {
    /// Create a new client instance.
    ///
    /// # Arguments
    /// * `base_url` - API host (e.g. "https://api.fitbit.com"); also serves `/oauth2/token`
    /// * `client_id` - OAuth client identifier
    /// * `client_secret` - OAuth client secret
    pub fn new(base_url: &str, client_id: impl Into<String>, client_secret: SecretString) -> Self {
        let client = reqwest::Client::builder()
            .build()
            .expect("reqwest client build should not fail");
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client_id: client_id.into(),
            client_secret,
            client,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(
            &config.base_url,
            config.client_id.clone(),
            config.client_secret.clone(),
        )
    }

    fn token_url(&self) -> String {
        format!("{}/oauth2/token", self.base_url)
    }

    /// Extract error information from a failed response.
    async fn error_from_response(&self, resp: reqwest::Response) -> FitbitError {
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        let body_snippet: String = body.chars().take(512).collect();
        FitbitError::from_status(status, body_snippet)
    }
}

#[derive(serde::Deserialize)]
struct TokenPayload {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
    user_id: Option<String>,
}

#[async_trait]
impl FitbitClient for ReqwestFitbitClient {
    async fn exchange_token(&self, grant: &TokenGrant) -> Result<TokenResponse, FitbitError> {
        let mut form: Vec<(&str, &str)> = vec![("grant_type", grant.grant_type())];
        match grant {
            TokenGrant::RefreshToken(token) => {
                form.push(("refresh_token", token.expose_secret()));
            }
            TokenGrant::AuthorizationCode { code, redirect_uri } => {
                form.push(("client_id", self.client_id.as_str()));
                form.push(("redirect_uri", redirect_uri.as_str()));
                form.push(("code", code.expose_secret()));
            }
        }

        let resp = self
            .client
            .post(self.token_url())
            .basic_auth(&self.client_id, Some(self.client_secret.expose_secret()))
            .form(&form)
            .send()
            .await?;
        if !resp.status().is_success() {
            // 401 from the token endpoint is a rejected grant, not an expired access token
            let status = resp.status().as_u16();
            let body: String = resp
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(512)
                .collect();
            return Err(FitbitError::Status { status, body });
        }

        let payload: TokenPayload = resp.json().await?;
        let access_token = payload
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| FitbitError::Config("token response without access_token".into()))?;
        Ok(TokenResponse {
            access_token: SecretString::new(access_token.into()),
            refresh_token: payload
                .refresh_token
                .filter(|t| !t.is_empty())
                .map(|t| SecretString::new(t.into())),
            expires_in: payload.expires_in,
            user_id: payload.user_id,
        })
    }

    async fn get_metric(
        &self,
        kind: MetricKind,
        date: NaiveDate,
        access_token: &SecretString,
    ) -> Result<serde_json::Value, FitbitError> {
        let url = format!("{}{}", self.base_url, kind.path(date));
        let resp = self
            .client
            .get(&url)
            .bearer_auth(access_token.expose_secret())
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(self.error_from_response(resp).await);
        }
        Ok(resp.json().await?)
    }
}
