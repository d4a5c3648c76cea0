use fitbit_client::config::ClientConfig;
use secrecy::SecretString;

use crate::error::SyncError;
use crate::gcp_secrets::{DEFAULT_METADATA_URL, DEFAULT_SECRET_MANAGER_URL};
use crate::template::{
    DEFAULT_FILENAME_TEMPLATE, DEFAULT_HEADING_TEMPLATE, FilenameTemplate, HeadingTemplate, Locale,
};

pub const DEFAULT_DAYS: u32 = 3;
pub const DEFAULT_PROJECT_ID: &str = "fibit2obsidian";
pub const DEFAULT_SECRET_NAME: &str = "fitbit-refresh-token";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SecretBackendKind {
    Gcp,
    Memory,
}

#[derive(Clone, Debug)]
pub struct SecretConfig {
    pub backend: SecretBackendKind,
    pub project_id: String,
    pub secret_name: String,
    pub base_url: String,
    pub access_token: Option<SecretString>,
    pub metadata_url: String,
}

#[derive(Clone, Debug)]
pub struct WebDavConfig {
    pub url: String,
    pub username: String,
    pub password: SecretString,
    pub path: String,
}

#[derive(Clone, Debug)]
pub struct SyncConfig {
    pub client: ClientConfig,
    pub fallback_refresh_token: Option<SecretString>,
    pub authorization_code: Option<SecretString>,
    pub webdav: WebDavConfig,
    pub heading: HeadingTemplate,
    pub filename: FilenameTemplate,
    pub locale: Locale,
    pub days: u32,
    pub secrets: SecretConfig,
}

impl SyncConfig {
    pub fn from_env() -> Result<Self, SyncError> {
        Self::from_env_with(|k| std::env::var(k).ok())
    }

    /// Read configuration through `get`. Missing document-store settings are
    /// logged and left empty; the affected dates then fail individually.
    pub fn from_env_with<F>(mut get: F) -> Result<Self, SyncError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let client = ClientConfig::from_env_with(&mut get)
            .map_err(|e| SyncError::Config(e.to_string()))?;

        let mut non_empty = |key: &str| get(key).filter(|v| !v.trim().is_empty());

        let fallback_refresh_token =
            non_empty("FITBIT_REFRESH_TOKEN").map(|v| SecretString::new(v.into()));
        let authorization_code = non_empty("FITBIT_AUTH_CODE").map(|v| SecretString::new(v.into()));

        let mut webdav_var = |key: &str| {
            non_empty(key).unwrap_or_else(|| {
                tracing::error!(variable = key, "environment variable is not set");
                String::new()
            })
        };
        let webdav = WebDavConfig {
            url: webdav_var("WEBDAV_URL"),
            username: webdav_var("WEBDAV_USERNAME"),
            password: SecretString::new(webdav_var("WEBDAV_PASSWORD").into()),
            path: webdav_var("WEBDAV_PATH"),
        };

        let heading = HeadingTemplate::parse(
            &non_empty("FITBIT_HEADING_TEMPLATE").unwrap_or_else(|| DEFAULT_HEADING_TEMPLATE.into()),
        )?;
        let filename = FilenameTemplate::parse(
            &non_empty("DAILY_NOTE_FILENAME_FORMAT")
                .unwrap_or_else(|| DEFAULT_FILENAME_TEMPLATE.into()),
        )?;
        let locale = match non_empty("SYNC_LOCALE") {
            Some(v) => Locale::parse(&v)?,
            None => Locale::default(),
        };
        let days = match non_empty("SYNC_DAYS") {
            Some(v) => v
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|d| (1..=31).contains(d))
                .ok_or_else(|| SyncError::Config(format!("SYNC_DAYS must be 1..=31, got {v}")))?,
            None => DEFAULT_DAYS,
        };

        let backend = match non_empty("SECRET_BACKEND").as_deref().map(str::trim) {
            None | Some("gcp") => SecretBackendKind::Gcp,
            Some("memory") => SecretBackendKind::Memory,
            Some(other) => {
                return Err(SyncError::Config(format!(
                    "SECRET_BACKEND must be gcp or memory, got {other}"
                )));
            }
        };
        let secrets = SecretConfig {
            backend,
            project_id: non_empty("GOOGLE_CLOUD_PROJECT").unwrap_or_else(|| DEFAULT_PROJECT_ID.into()),
            secret_name: non_empty("FITBIT_SECRET_NAME")
                .unwrap_or_else(|| DEFAULT_SECRET_NAME.into()),
            base_url: non_empty("SECRET_MANAGER_BASE_URL")
                .unwrap_or_else(|| DEFAULT_SECRET_MANAGER_URL.into()),
            access_token: non_empty("GCP_ACCESS_TOKEN").map(|v| SecretString::new(v.into())),
            metadata_url: non_empty("GCP_METADATA_URL")
                .unwrap_or_else(|| DEFAULT_METADATA_URL.into()),
        };

        tracing::info!(url = %webdav.url, path = %webdav.path, "document store settings");

        Ok(Self {
            client,
            fallback_refresh_token,
            authorization_code,
            webdav,
            heading,
            filename,
            locale,
            days,
            secrets,
        })
    }
}
