//! Google Secret Manager backend over the REST v1 API.

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::error::SecretStoreError;
use crate::secret_store::SecretBackend;

pub const DEFAULT_SECRET_MANAGER_URL: &str = "https://secretmanager.googleapis.com";
pub const DEFAULT_METADATA_URL: &str = "http://metadata.google.internal";

/// Source of the Google bearer token.
#[derive(Clone, Debug)]
pub enum GoogleAuth {
    Static(SecretString),
    /// Instance metadata server of the runtime's service account.
    MetadataServer { base_url: String },
}

#[derive(Deserialize)]
struct MetadataToken {
    access_token: String,
}

#[derive(Deserialize)]
struct AccessResponse {
    payload: Option<Payload>,
}

#[derive(Deserialize)]
struct Payload {
    data: Option<String>,
}

pub struct GcpSecretManager {
    base_url: String,
    project_id: String,
    auth: GoogleAuth,
    client: reqwest::Client,
    cached_token: Mutex<Option<SecretString>>,
}

impl GcpSecretManager {
    pub fn new(base_url: &str, project_id: impl Into<String>, auth: GoogleAuth) -> Self {
        let client = reqwest::Client::builder()
            .build()
            .expect("reqwest client build should not fail");
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            project_id: project_id.into(),
            auth,
            client,
            cached_token: Mutex::new(None),
        }
    }

    fn secret_url(&self, name: &str) -> String {
        format!(
            "{}/v1/projects/{}/secrets/{}",
            self.base_url, self.project_id, name
        )
    }

    async fn bearer(&self) -> Result<SecretString, SecretStoreError> {
        let metadata_url = match &self.auth {
            GoogleAuth::Static(token) => return Ok(token.clone()),
            GoogleAuth::MetadataServer { base_url } => base_url.trim_end_matches('/'),
        };
        let mut cached = self.cached_token.lock().await;
        if let Some(token) = cached.as_ref() {
            return Ok(token.clone());
        }
        let url = format!(
            "{metadata_url}/computeMetadata/v1/instance/service-accounts/default/token"
        );
        let resp = self
            .client
            .get(&url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(SecretStoreError::Backend(format!(
                "metadata token request returned {}",
                resp.status().as_u16()
            )));
        }
        let token: MetadataToken = resp.json().await?;
        let token = SecretString::new(token.access_token.into());
        *cached = Some(token.clone());
        Ok(token)
    }

    async fn error_from_response(resp: reqwest::Response, action: &str) -> SecretStoreError {
        let status = resp.status().as_u16();
        let body: String = resp
            .text()
            .await
            .unwrap_or_default()
            .chars()
            .take(256)
            .collect();
        SecretStoreError::Backend(format!("{action} returned {status}: {body}"))
    }
}

#[async_trait]
impl SecretBackend for GcpSecretManager {
    async fn access_latest(&self, name: &str) -> Result<Option<String>, SecretStoreError> {
        let token = self.bearer().await?;
        let url = format!("{}/versions/latest:access", self.secret_url(name));
        let resp = self
            .client
            .get(&url)
            .bearer_auth(token.expose_secret())
            .send()
            .await?;
        if resp.status().as_u16() == 404 {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(Self::error_from_response(resp, "access secret version").await);
        }
        let body: AccessResponse = resp.json().await?;
        let Some(data) = body.payload.and_then(|p| p.data) else {
            return Ok(None);
        };
        let bytes = STANDARD
            .decode(data.as_bytes())
            .map_err(|e| SecretStoreError::Backend(format!("invalid payload encoding: {e}")))?;
        let value = String::from_utf8(bytes)
            .map_err(|e| SecretStoreError::Backend(format!("payload is not UTF-8: {e}")))?;
        Ok(Some(value))
    }

    async fn create(&self, name: &str) -> Result<(), SecretStoreError> {
        let token = self.bearer().await?;
        let url = format!(
            "{}/v1/projects/{}/secrets",
            self.base_url, self.project_id
        );
        let resp = self
            .client
            .post(&url)
            .bearer_auth(token.expose_secret())
            .query(&[("secretId", name)])
            .json(&serde_json::json!({"replication": {"automatic": {}}}))
            .send()
            .await?;
        match resp.status().as_u16() {
            409 => Ok(()),
            s if (200..300).contains(&s) => {
                tracing::info!(secret = %name, "created secret");
                Ok(())
            }
            _ => Err(Self::error_from_response(resp, "create secret").await),
        }
    }

    async fn add_version(&self, name: &str, value: &str) -> Result<(), SecretStoreError> {
        let token = self.bearer().await?;
        let url = format!("{}:addVersion", self.secret_url(name));
        let resp = self
            .client
            .post(&url)
            .bearer_auth(token.expose_secret())
            .json(&serde_json::json!({"payload": {"data": STANDARD.encode(value.as_bytes())}}))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Self::error_from_response(resp, "add secret version").await);
        }
        Ok(())
    }
}
