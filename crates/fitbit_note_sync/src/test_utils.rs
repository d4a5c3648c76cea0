//! Shared test doubles for the Fitbit API, the secret backend and the
//! document store.
#![cfg(test)]

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::NaiveDate;
use fitbit_client::{FitbitClient, FitbitError, MetricKind, TokenGrant, TokenResponse};
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use tokio::sync::Mutex;

use crate::document_store::DocumentStore;
use crate::error::{DocumentStoreError, SecretStoreError};
use crate::secret_store::SecretBackend;

/// Sleep payload with a nap and a flagged main sleep.
pub fn sample_sleep() -> serde_json::Value {
    json!({
        "sleep": [
            {
                "dateOfSleep": "2025-02-21",
                "isMainSleep": false,
                "minutesAsleep": 95,
                "timeInBed": 100,
                "startTime": "2025-02-21T04:00:00.000",
                "levels": {"summary": {}}
            },
            {
                "dateOfSleep": "2025-02-21",
                "isMainSleep": true,
                "minutesAsleep": 412,
                "timeInBed": 455,
                "startTime": "2025-02-20T14:05:00.000",
                "awakeCount": 2,
                "restlessCount": 14,
                "levels": {"summary": {
                    "deep": {"minutes": 71},
                    "light": {"minutes": 236},
                    "rem": {"minutes": 105},
                    "wake": {"minutes": 43}
                }}
            }
        ],
        "summary": {"stages": {"deep": 71, "light": 236, "rem": 105, "wake": 43}}
    })
}

pub fn default_payload(kind: MetricKind) -> serde_json::Value {
    match kind {
        MetricKind::Steps => json!({"activities-steps": [{"dateTime": "2025-02-21", "value": "8421"}]}),
        MetricKind::Distance => {
            json!({"activities-distance": [{"dateTime": "2025-02-21", "value": "6.1234"}]})
        }
        MetricKind::Calories => {
            json!({"activities-calories": [{"dateTime": "2025-02-21", "value": "2150"}]})
        }
        MetricKind::ActiveMinutes => {
            json!({"activities-minutesVeryActive": [{"dateTime": "2025-02-21", "value": "23"}]})
        }
        MetricKind::Sleep => sample_sleep(),
    }
}

struct ScriptState {
    next_token: u32,
    rotate: bool,
    expired: HashSet<String>,
    failing: HashMap<MetricKind, u16>,
    always_unauthorized: HashSet<MetricKind>,
    reject: Option<(u16, String)>,
    exchanges: u32,
    refresh_used: Vec<String>,
    codes: Vec<String>,
    calls: HashMap<MetricKind, u32>,
}

/// In-process Fitbit API. Each exchange issues `at-N` / `rt-N`.
pub struct ScriptedFitbit {
    state: Mutex<ScriptState>,
}

impl ScriptedFitbit {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ScriptState {
                next_token: 1,
                rotate: true,
                expired: HashSet::new(),
                failing: HashMap::new(),
                always_unauthorized: HashSet::new(),
                reject: None,
                exchanges: 0,
                refresh_used: Vec::new(),
                codes: Vec::new(),
                calls: HashMap::new(),
            }),
        }
    }

    /// Echo the presented refresh token instead of rotating it.
    pub fn without_rotation(mut self) -> Self {
        self.state.get_mut().rotate = false;
        self
    }

    pub async fn expire_token(&self, token: &str) {
        self.state.lock().await.expired.insert(token.to_string());
    }

    pub async fn fail_kind(&self, kind: MetricKind, status: u16) {
        self.state.lock().await.failing.insert(kind, status);
    }

    pub async fn always_unauthorized(&self, kind: MetricKind) {
        self.state.lock().await.always_unauthorized.insert(kind);
    }

    pub async fn reject_exchanges(&self, status: u16, body: &str) {
        self.state.lock().await.reject = Some((status, body.to_string()));
    }

    pub async fn exchanges(&self) -> u32 {
        self.state.lock().await.exchanges
    }

    pub async fn refresh_tokens_used(&self) -> Vec<String> {
        self.state.lock().await.refresh_used.clone()
    }

    pub async fn codes_used(&self) -> Vec<String> {
        self.state.lock().await.codes.clone()
    }

    pub async fn metric_calls(&self, kind: MetricKind) -> u32 {
        self.state.lock().await.calls.get(&kind).copied().unwrap_or(0)
    }
}

#[async_trait]
impl FitbitClient for ScriptedFitbit {
    async fn exchange_token(&self, grant: &TokenGrant) -> Result<TokenResponse, FitbitError> {
        let mut s = self.state.lock().await;
        s.exchanges += 1;
        if let Some((status, body)) = s.reject.clone() {
            return Err(FitbitError::Status { status, body });
        }
        let n = s.next_token;
        s.next_token += 1;
        let refresh = match grant {
            TokenGrant::RefreshToken(rt) => {
                let used = rt.expose_secret().to_string();
                s.refresh_used.push(used.clone());
                if s.rotate { format!("rt-{n}") } else { used }
            }
            TokenGrant::AuthorizationCode { code, .. } => {
                s.codes.push(code.expose_secret().to_string());
                format!("rt-{n}")
            }
        };
        Ok(TokenResponse {
            access_token: SecretString::new(format!("at-{n}").into()),
            refresh_token: Some(SecretString::new(refresh.into())),
            expires_in: Some(28800),
            user_id: Some("ABC123".into()),
        })
    }

    async fn get_metric(
        &self,
        kind: MetricKind,
        _date: NaiveDate,
        access_token: &SecretString,
    ) -> Result<serde_json::Value, FitbitError> {
        let mut s = self.state.lock().await;
        *s.calls.entry(kind).or_default() += 1;
        if s.always_unauthorized.contains(&kind) || s.expired.contains(access_token.expose_secret())
        {
            return Err(FitbitError::Unauthorized("expired_token".into()));
        }
        if let Some(status) = s.failing.get(&kind) {
            return Err(FitbitError::from_status(*status, "boom".into()));
        }
        Ok(default_payload(kind))
    }
}

/// Secret backend whose every call fails.
pub struct UnreachableSecrets;

#[async_trait]
impl SecretBackend for UnreachableSecrets {
    async fn access_latest(&self, _name: &str) -> Result<Option<String>, SecretStoreError> {
        Err(SecretStoreError::Backend("unreachable".into()))
    }

    async fn create(&self, _name: &str) -> Result<(), SecretStoreError> {
        Err(SecretStoreError::Backend("unreachable".into()))
    }

    async fn add_version(&self, _name: &str, _value: &str) -> Result<(), SecretStoreError> {
        Err(SecretStoreError::Backend("unreachable".into()))
    }
}

/// Document store kept in a map; writes to paths containing a configured
/// fragment fail with 507.
#[derive(Default)]
pub struct MemoryDocumentStore {
    docs: Mutex<HashMap<String, String>>,
    failing_puts: Mutex<Vec<String>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, path: &str, body: &str) {
        self.docs
            .lock()
            .await
            .insert(path.to_string(), body.to_string());
    }

    pub async fn fail_puts_containing(&self, fragment: &str) {
        self.failing_puts.lock().await.push(fragment.to_string());
    }

    pub async fn body(&self, path: &str) -> Option<String> {
        self.docs.lock().await.get(path).cloned()
    }

    pub async fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.docs.lock().await.keys().cloned().collect();
        paths.sort();
        paths
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, path: &str) -> Result<Option<String>, DocumentStoreError> {
        Ok(self.docs.lock().await.get(path).cloned())
    }

    async fn put(&self, path: &str, body: &str) -> Result<(), DocumentStoreError> {
        let failing = self.failing_puts.lock().await;
        if failing.iter().any(|f| path.contains(f.as_str())) {
            return Err(DocumentStoreError::Status {
                method: "PUT",
                path: path.to_string(),
                status: 507,
            });
        }
        self.docs
            .lock()
            .await
            .insert(path.to_string(), body.to_string());
        Ok(())
    }
}
