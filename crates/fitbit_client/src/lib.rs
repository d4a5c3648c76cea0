//! Minimal `FitbitClient` trait, payload models and a reqwest-based implementation.

use async_trait::async_trait;
use chrono::NaiveDate;
use secrecy::SecretString;
use serde::{Deserialize, Deserializer};
use thiserror::Error;

pub mod config;
pub mod http_client;
pub mod retry;

#[derive(Debug, Error)]
pub enum FitbitError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },
}

impl FitbitError {
    /// Build an error from a non-success status and a (truncated) response body.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 => FitbitError::Unauthorized(body),
            _ => FitbitError::Status { status, body },
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, FitbitError::Unauthorized(_))
    }

    /// HTTP status carried by the error, when the server produced one.
    pub fn status(&self) -> Option<u16> {
        match self {
            FitbitError::Unauthorized(_) => Some(401),
            FitbitError::Status { status, .. } => Some(*status),
            FitbitError::Http(e) => e.status().map(|s| s.as_u16()),
            FitbitError::Config(_) => None,
        }
    }

    /// Response body captured for diagnostics, if any.
    pub fn body(&self) -> Option<&str> {
        match self {
            FitbitError::Unauthorized(body) | FitbitError::Status { body, .. } => Some(body),
            _ => None,
        }
    }
}

/// The fixed set of metrics pulled for every day.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MetricKind {
    Steps,
    Distance,
    Calories,
    ActiveMinutes,
    Sleep,
}

impl MetricKind {
    pub const ALL: [MetricKind; 5] = [
        MetricKind::Steps,
        MetricKind::Distance,
        MetricKind::Calories,
        MetricKind::ActiveMinutes,
        MetricKind::Sleep,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Steps => "steps",
            MetricKind::Distance => "distance",
            MetricKind::Calories => "calories",
            MetricKind::ActiveMinutes => "active_minutes",
            MetricKind::Sleep => "sleep",
        }
    }

    /// Key of the time-series array in the response body. `None` for sleep,
    /// which returns a log object instead.
    pub fn series_key(&self) -> Option<&'static str> {
        match self {
            MetricKind::Steps => Some("activities-steps"),
            MetricKind::Distance => Some("activities-distance"),
            MetricKind::Calories => Some("activities-calories"),
            MetricKind::ActiveMinutes => Some("activities-minutesVeryActive"),
            MetricKind::Sleep => None,
        }
    }

    /// API path (relative to the API host) for this kind on `date`.
    pub fn path(&self, date: NaiveDate) -> String {
        let date = date.format("%Y-%m-%d");
        match self {
            MetricKind::Steps => format!("/1/user/-/activities/steps/date/{date}/1d.json"),
            MetricKind::Distance => format!("/1/user/-/activities/distance/date/{date}/1d.json"),
            MetricKind::Calories => format!("/1/user/-/activities/calories/date/{date}/1d.json"),
            MetricKind::ActiveMinutes => {
                format!("/1/user/-/activities/minutesVeryActive/date/{date}/1d.json")
            }
            MetricKind::Sleep => format!("/1/user/-/sleep/date/{date}.json"),
        }
    }

    /// Value of the first element of this kind's time series, if present and numeric.
    pub fn first_value(&self, payload: &serde_json::Value) -> Option<f64> {
        let key = self.series_key()?;
        let first = payload.get(key)?.as_array()?.first()?.clone();
        serde_json::from_value::<TimeSeriesPoint>(first).ok()?.value
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One element of an `activities-*` time series.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct TimeSeriesPoint {
    #[serde(rename = "dateTime", default)]
    pub date_time: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient_f64")]
    pub value: Option<f64>,
}

/// Body of the sleep-by-date endpoint.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct SleepDay {
    #[serde(default, deserialize_with = "deserialize_lenient_list")]
    pub sleep: Vec<SleepLog>,
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub summary: Option<SleepSummary>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SleepLog {
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub date_of_sleep: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub is_main_sleep: Option<bool>,
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub log_type: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient_u32")]
    pub minutes_asleep: Option<u32>,
    #[serde(default, deserialize_with = "deserialize_lenient_u32")]
    pub time_in_bed: Option<u32>,
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub start_time: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient_u32")]
    pub awake_count: Option<u32>,
    #[serde(default, deserialize_with = "deserialize_lenient_u32")]
    pub restless_count: Option<u32>,
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub levels: Option<SleepLevels>,
}

impl SleepLog {
    pub fn is_main(&self) -> bool {
        self.is_main_sleep.unwrap_or(false)
    }

    pub fn asleep_minutes(&self) -> u32 {
        self.minutes_asleep.unwrap_or(0)
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct SleepLevels {
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub summary: Option<StageSummary>,
}

/// Per-entry stage breakdown (`levels.summary`).
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct StageSummary {
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub deep: Option<StageMinutes>,
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub light: Option<StageMinutes>,
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub rem: Option<StageMinutes>,
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub wake: Option<StageMinutes>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct StageMinutes {
    #[serde(default, deserialize_with = "deserialize_lenient_u32")]
    pub minutes: Option<u32>,
}

/// Day-level aggregate outside the per-entry log.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SleepSummary {
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub stages: Option<SleepStages>,
    #[serde(default, deserialize_with = "deserialize_lenient_u32")]
    pub total_minutes_asleep: Option<u32>,
    #[serde(default, deserialize_with = "deserialize_lenient_u32")]
    pub total_time_in_bed: Option<u32>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct SleepStages {
    #[serde(default, deserialize_with = "deserialize_lenient_u32")]
    pub deep: Option<u32>,
    #[serde(default, deserialize_with = "deserialize_lenient_u32")]
    pub light: Option<u32>,
    #[serde(default, deserialize_with = "deserialize_lenient_u32")]
    pub rem: Option<u32>,
    #[serde(default, deserialize_with = "deserialize_lenient_u32")]
    pub wake: Option<u32>,
}

/// Accept a JSON number or a numeric string. Anything else (including
/// unparseable strings) becomes `None` rather than an error, so one odd field
/// does not discard the whole payload.
fn deserialize_lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<serde_json::Value> = Option::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite()))
}

fn deserialize_lenient_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = deserialize_lenient_f64(deserializer)?;
    Ok(value
        .filter(|v| *v >= 0.0 && *v <= u32::MAX as f64)
        .map(|v| v.trunc() as u32))
}

/// Decode `T` when the value has the expected shape; anything else becomes
/// `None` instead of failing the enclosing payload.
fn deserialize_lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: serde::de::DeserializeOwned,
{
    let value: Option<serde_json::Value> = Option::deserialize(deserializer)?;
    Ok(value.and_then(|v| serde_json::from_value(v).ok()))
}

/// `null` is an empty list; elements that do not decode are skipped.
fn deserialize_lenient_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: serde::de::DeserializeOwned,
{
    let values: Option<Vec<serde_json::Value>> = Option::deserialize(deserializer)?;
    Ok(values
        .unwrap_or_default()
        .into_iter()
        .filter_map(|v| serde_json::from_value(v).ok())
        .collect())
}

/// Grant presented at the token endpoint.
#[derive(Clone, Debug)]
pub enum TokenGrant {
    RefreshToken(SecretString),
    AuthorizationCode {
        code: SecretString,
        redirect_uri: String,
    },
}

impl TokenGrant {
    pub fn grant_type(&self) -> &'static str {
        match self {
            TokenGrant::RefreshToken(_) => "refresh_token",
            TokenGrant::AuthorizationCode { .. } => "authorization_code",
        }
    }
}

/// Successful token endpoint response.
#[derive(Clone, Debug)]
pub struct TokenResponse {
    pub access_token: SecretString,
    pub refresh_token: Option<SecretString>,
    pub expires_in: Option<u64>,
    pub user_id: Option<String>,
}

#[async_trait]
pub trait FitbitClient: Send + Sync + 'static {
    /// Exchange a grant for an access token (and possibly a rotated refresh token).
    async fn exchange_token(&self, grant: &TokenGrant) -> Result<TokenResponse, FitbitError>;

    /// Fetch the raw JSON payload of one metric kind for one day.
    async fn get_metric(
        &self,
        kind: MetricKind,
        date: NaiveDate,
        access_token: &SecretString,
    ) -> Result<serde_json::Value, FitbitError>;
}
