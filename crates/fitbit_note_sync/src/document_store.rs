//! Remote store holding one text document per day.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::error::DocumentStoreError;

#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    /// Document body at `path`, or `None` when it does not exist yet.
    async fn get(&self, path: &str) -> Result<Option<String>, DocumentStoreError>;

    /// Create or overwrite the document at `path`.
    async fn put(&self, path: &str, body: &str) -> Result<(), DocumentStoreError>;
}

/// WebDAV server with HTTP Basic authentication.
#[derive(Clone, Debug)]
pub struct WebDavStore {
    base_url: String,
    username: String,
    password: SecretString,
    client: reqwest::Client,
}

impl WebDavStore {
    pub fn new(base_url: &str, username: impl Into<String>, password: SecretString) -> Self {
        let client = reqwest::Client::builder()
            .build()
            .expect("reqwest client build should not fail");
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            username: username.into(),
            password,
            client,
        }
    }

    fn url(&self, path: &str) -> Result<String, DocumentStoreError> {
        if self.base_url.is_empty() {
            return Err(DocumentStoreError::NotConfigured("WEBDAV_URL".into()));
        }
        Ok(format!("{}/{}", self.base_url, path.trim_start_matches('/')))
    }
}

#[async_trait]
impl DocumentStore for WebDavStore {
    async fn get(&self, path: &str) -> Result<Option<String>, DocumentStoreError> {
        let url = self.url(path)?;
        tracing::debug!(%url, user = %self.username, "webdav GET");
        let resp = self
            .client
            .get(&url)
            .basic_auth(&self.username, Some(self.password.expose_secret()))
            .send()
            .await?;
        match resp.status().as_u16() {
            200 => Ok(Some(resp.text().await?)),
            404 => Ok(None),
            status => Err(DocumentStoreError::Status {
                method: "GET",
                path: path.to_string(),
                status,
            }),
        }
    }

    async fn put(&self, path: &str, body: &str) -> Result<(), DocumentStoreError> {
        let url = self.url(path)?;
        tracing::debug!(%url, user = %self.username, bytes = body.len(), "webdav PUT");
        let resp = self
            .client
            .put(&url)
            .basic_auth(&self.username, Some(self.password.expose_secret()))
            .header(reqwest::header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(body.to_owned())
            .send()
            .await?;
        match resp.status().as_u16() {
            201 | 204 => Ok(()),
            status => {
                let text = resp.text().await.unwrap_or_default();
                let snippet: String = text.chars().take(256).collect();
                tracing::error!(%path, status, body = %snippet, "webdav PUT rejected");
                Err(DocumentStoreError::Status {
                    method: "PUT",
                    path: path.to_string(),
                    status,
                })
            }
        }
    }
}

/// Join the configured directory and a filename into a store path.
pub fn document_path(directory: &str, filename: &str) -> String {
    let dir = directory.trim_end_matches('/');
    if dir.is_empty() {
        filename.to_string()
    } else {
        format!("{dir}/{filename}")
    }
}
