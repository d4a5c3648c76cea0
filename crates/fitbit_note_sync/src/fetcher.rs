//! Per-day metric fan-out with a single re-authorization on 401.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use fitbit_client::{FitbitClient, FitbitError, MetricKind};
use futures_util::future::join_all;
use secrecy::SecretString;

use crate::error::SyncError;
use crate::token::TokenLifecycle;

/// Raw payload per metric kind for one day; `None` marks a failed fetch.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MetricSnapshot {
    entries: BTreeMap<MetricKind, Option<serde_json::Value>>,
}

impl MetricSnapshot {
    /// Snapshot with every kind absent.
    pub fn empty() -> Self {
        Self {
            entries: MetricKind::ALL.iter().map(|k| (*k, None)).collect(),
        }
    }

    pub fn with(mut self, kind: MetricKind, payload: serde_json::Value) -> Self {
        self.insert(kind, Some(payload));
        self
    }

    pub fn insert(&mut self, kind: MetricKind, payload: Option<serde_json::Value>) {
        self.entries.insert(kind, payload);
    }

    pub fn get(&self, kind: MetricKind) -> Option<&serde_json::Value> {
        self.entries.get(&kind).and_then(|v| v.as_ref())
    }

    pub fn absent_kinds(&self) -> Vec<MetricKind> {
        MetricKind::ALL
            .into_iter()
            .filter(|k| self.get(*k).is_none())
            .collect()
    }
}

pub struct MetricsFetcher {
    client: Arc<dyn FitbitClient>,
    tokens: Arc<TokenLifecycle>,
}

impl MetricsFetcher {
    pub fn new(client: Arc<dyn FitbitClient>, tokens: Arc<TokenLifecycle>) -> Self {
        Self { client, tokens }
    }

    /// Fetch every metric kind for `date` concurrently. A failing kind is
    /// recorded as absent and never affects the others.
    pub async fn fetch_all(&self, date: NaiveDate, access_token: &SecretString) -> MetricSnapshot {
        let fetches = MetricKind::ALL
            .into_iter()
            .map(|kind| async move { (kind, self.fetch_one(kind, date, access_token).await) });

        let mut snapshot = MetricSnapshot::empty();
        for (kind, outcome) in join_all(fetches).await {
            match outcome {
                Ok(payload) => snapshot.insert(kind, Some(payload)),
                Err(e) => {
                    tracing::warn!(%date, %kind, error = %e, "metric fetch failed; recording as absent");
                    metrics::counter!("fitbit_metric_fetch_failures_total", "kind" => kind.as_str())
                        .increment(1);
                    snapshot.insert(kind, None);
                }
            }
        }
        snapshot
    }

    async fn fetch_one(
        &self,
        kind: MetricKind,
        date: NaiveDate,
        access_token: &SecretString,
    ) -> Result<serde_json::Value, SyncError> {
        match self.client.get_metric(kind, date, access_token).await {
            Ok(v) => Ok(v),
            Err(e) if e.is_unauthorized() => {
                tracing::info!(%date, %kind, "access token expired; re-authorizing once");
                let fresh = self.tokens.reauthorize(access_token).await?;
                self.client
                    .get_metric(kind, date, &fresh)
                    .await
                    .map_err(|source| fetch_error(kind, source))
            }
            Err(e) => Err(fetch_error(kind, e)),
        }
    }
}

fn fetch_error(kind: MetricKind, source: FitbitError) -> SyncError {
    SyncError::Fetch { kind, source }
}
