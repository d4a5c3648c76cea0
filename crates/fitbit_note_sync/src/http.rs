//! HTTP trigger for scheduled runs.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::debug_handler;
use axum::{
    Json, Router,
    extract::State,
    http::{Method, StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};

use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::orchestrator::{RunReport, SyncOrchestrator};

/// Starts one sync run per call.
#[async_trait]
pub trait SyncTrigger: Send + Sync {
    async fn trigger(&self) -> Result<RunReport, SyncError>;
}

/// Reads configuration from the process environment on every trigger, so a
/// changed environment takes effect without a restart.
pub struct EnvSyncTrigger;

#[async_trait]
impl SyncTrigger for EnvSyncTrigger {
    async fn trigger(&self) -> Result<RunReport, SyncError> {
        let config = SyncConfig::from_env()?;
        Ok(SyncOrchestrator::from_config(&config).run().await)
    }
}

pub struct AppState {
    pub trigger: Arc<dyn SyncTrigger>,
    pub metrics: PrometheusHandle,
}

#[debug_handler]
async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

#[debug_handler]
async fn metrics_endpoint(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let body = state.metrics.render();
    ([("content-type", "text/plain; version=0.0.4")], body)
}

#[debug_handler]
async fn sync(State(state): State<Arc<AppState>>) -> (StatusCode, Json<RunReport>) {
    let trigger = state.trigger.clone();
    // run detached so a panic inside the run is reported as a 500 where it
    // unwinds; release builds abort on panic instead
    match tokio::spawn(async move { trigger.trigger().await }).await {
        Ok(Ok(report)) => (StatusCode::OK, Json(report)),
        Ok(Err(e)) => {
            tracing::error!(error = %e, "sync run could not start");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(RunReport::fault(e)))
        }
        Err(e) => {
            tracing::error!(error = %e, "sync run task failed");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(RunReport::fault(e)))
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
        .max_age(Duration::from_secs(3600));

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/sync", get(sync).post(sync))
        .layer(cors)
        .with_state(state)
}
