//! One sync run: bootstrap, or fetch/format/merge/write for a recent date window.

use std::sync::Arc;

use chrono::{NaiveDate, TimeDelta, Utc};
use fitbit_client::FitbitClient;
use fitbit_client::config::DEFAULT_REDIRECT_URI;
use fitbit_client::http_client::ReqwestFitbitClient;
use secrecy::SecretString;
use serde::Serialize;

use crate::config::{DEFAULT_DAYS, SecretBackendKind, SyncConfig};
use crate::document_store::{DocumentStore, WebDavStore, document_path};
use crate::error::SyncError;
use crate::fetcher::MetricsFetcher;
use crate::formatter::{LOCAL_OFFSET_SECS, MetricsFormatter};
use crate::gcp_secrets::{GcpSecretManager, GoogleAuth};
use crate::merger::{MergeOutcome, merge_with_outcome};
use crate::secret_store::{InMemorySecretBackend, SecretBackend, SecretStore};
use crate::template::{FilenameTemplate, HeadingTemplate, Locale};
use crate::token::TokenLifecycle;

/// Outcome for a single date.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DateResult {
    pub date: String,
    pub filename: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregate result of a run, serialized as the trigger's JSON response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_count: Option<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<DateResult>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub setup_completed: Option<bool>,
}

impl RunReport {
    /// Report for a fault that prevented the run from starting or finishing.
    pub fn fault(error: impl std::fmt::Display) -> Self {
        Self {
            success: false,
            sync_count: None,
            results: Vec::new(),
            message: "sync run failed".into(),
            error: Some(error.to_string()),
            setup_completed: None,
        }
    }
}

/// Run-shaping settings that are not collaborators.
#[derive(Clone, Debug)]
pub struct SyncSettings {
    pub heading: HeadingTemplate,
    pub filename: FilenameTemplate,
    pub locale: Locale,
    pub days: u32,
    pub directory: String,
    pub authorization_code: Option<SecretString>,
    pub redirect_uri: String,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            heading: HeadingTemplate::default(),
            filename: FilenameTemplate::default(),
            locale: Locale::default(),
            days: DEFAULT_DAYS,
            directory: String::new(),
            authorization_code: None,
            redirect_uri: DEFAULT_REDIRECT_URI.into(),
        }
    }
}

impl From<&SyncConfig> for SyncSettings {
    fn from(config: &SyncConfig) -> Self {
        Self {
            heading: config.heading.clone(),
            filename: config.filename.clone(),
            locale: config.locale,
            days: config.days,
            directory: config.webdav.path.clone(),
            authorization_code: config.authorization_code.clone(),
            redirect_uri: config.client.redirect_uri.clone(),
        }
    }
}

pub struct SyncOrchestrator {
    tokens: Arc<TokenLifecycle>,
    fetcher: MetricsFetcher,
    formatter: MetricsFormatter,
    documents: Arc<dyn DocumentStore>,
    settings: SyncSettings,
}

impl SyncOrchestrator {
    pub fn new(
        client: Arc<dyn FitbitClient>,
        secrets: Arc<SecretStore>,
        documents: Arc<dyn DocumentStore>,
        settings: SyncSettings,
    ) -> Self {
        let tokens = Arc::new(TokenLifecycle::new(client.clone(), secrets));
        let fetcher = MetricsFetcher::new(client, tokens.clone());
        let formatter = MetricsFormatter::new(settings.heading.clone(), settings.locale);
        Self {
            tokens,
            fetcher,
            formatter,
            documents,
            settings,
        }
    }

    /// Wire the production collaborators described by `config`.
    pub fn from_config(config: &SyncConfig) -> Self {
        let client: Arc<dyn FitbitClient> =
            Arc::new(ReqwestFitbitClient::from_config(&config.client));

        let backend: Arc<dyn SecretBackend> = match config.secrets.backend {
            SecretBackendKind::Gcp => {
                let auth = match &config.secrets.access_token {
                    Some(token) => GoogleAuth::Static(token.clone()),
                    None => GoogleAuth::MetadataServer {
                        base_url: config.secrets.metadata_url.clone(),
                    },
                };
                Arc::new(GcpSecretManager::new(
                    &config.secrets.base_url,
                    config.secrets.project_id.clone(),
                    auth,
                ))
            }
            SecretBackendKind::Memory => {
                tracing::warn!("using in-memory secret backend; rotated tokens are not persisted");
                Arc::new(InMemorySecretBackend::new())
            }
        };
        let secrets = Arc::new(SecretStore::new(
            backend,
            config.secrets.secret_name.clone(),
            config.fallback_refresh_token.clone(),
        ));
        let documents = Arc::new(WebDavStore::new(
            &config.webdav.url,
            config.webdav.username.clone(),
            config.webdav.password.clone(),
        ));

        Self::new(client, secrets, documents, SyncSettings::from(config))
    }

    /// Run for the current date at the fixed local offset.
    pub async fn run(&self) -> RunReport {
        let today = (Utc::now() + TimeDelta::seconds(i64::from(LOCAL_OFFSET_SECS))).date_naive();
        self.run_for(today).await
    }

    /// Bootstrap when an authorization code is configured, otherwise sync
    /// `today` and the preceding days of the window.
    pub async fn run_for(&self, today: NaiveDate) -> RunReport {
        if let Some(code) = self.settings.authorization_code.as_ref() {
            return self.bootstrap(code).await;
        }

        let days = self.settings.days;
        tracing::info!(%today, days, "starting sync of recent days");

        let mut results = Vec::with_capacity(days as usize);
        for offset in 0..days {
            let date = today - TimeDelta::days(i64::from(offset));
            let filename = self.settings.filename.render(date, self.settings.locale);
            let result = match self.sync_date(date, &filename).await {
                Ok(outcome) => {
                    tracing::info!(%date, %filename, ?outcome, "daily note saved");
                    metrics::counter!("fitbit_sync_dates_total", "outcome" => "success")
                        .increment(1);
                    DateResult {
                        date: date.to_string(),
                        filename,
                        success: true,
                        error: None,
                    }
                }
                Err(e) => {
                    tracing::error!(%date, %filename, error = %e, "date sync failed");
                    metrics::counter!("fitbit_sync_dates_total", "outcome" => "failure")
                        .increment(1);
                    DateResult {
                        date: date.to_string(),
                        filename,
                        success: false,
                        error: Some(e.to_string()),
                    }
                }
            };
            results.push(result);
        }

        let succeeded = results.iter().filter(|r| r.success).count();
        let success = succeeded == results.len();
        let message = if success {
            format!("synced {days} recent days")
        } else {
            format!("partial failure syncing {days} recent days")
        };
        tracing::info!(succeeded, total = results.len(), "{message}");

        RunReport {
            success,
            sync_count: Some(results.len()),
            results,
            message,
            error: None,
            setup_completed: None,
        }
    }

    async fn bootstrap(&self, code: &SecretString) -> RunReport {
        tracing::info!("authorization code configured; running initial setup only");
        match self
            .tokens
            .bootstrap(code, &self.settings.redirect_uri)
            .await
        {
            Ok(()) => RunReport {
                success: true,
                sync_count: None,
                results: Vec::new(),
                message: "initial setup completed; remove FITBIT_AUTH_CODE before the next deployment"
                    .into(),
                error: None,
                setup_completed: Some(true),
            },
            Err(e) => {
                tracing::error!(error = %e, "initial setup failed");
                RunReport {
                    success: false,
                    sync_count: None,
                    results: Vec::new(),
                    message: "initial setup failed".into(),
                    error: Some(e.to_string()),
                    setup_completed: Some(false),
                }
            }
        }
    }

    async fn sync_date(&self, date: NaiveDate, filename: &str) -> Result<MergeOutcome, SyncError> {
        let access_token = self.tokens.access_token().await?;
        let snapshot = self.fetcher.fetch_all(date, &access_token).await;
        let absent = snapshot.absent_kinds();
        if !absent.is_empty() {
            tracing::debug!(%date, ?absent, "formatting with absent metrics");
        }
        let section = self.formatter.format(&snapshot, date);

        let path = document_path(&self.settings.directory, filename);
        let existing = self.documents.get(&path).await?;
        let (text, outcome) = merge_with_outcome(
            existing.as_deref(),
            &section,
            self.formatter.heading().detection_prefix(),
            &self.settings.locale.creation_header(date),
        );
        self.documents.put(&path, &text).await?;
        Ok(outcome)
    }
}
