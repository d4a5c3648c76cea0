use std::net::SocketAddr;
use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::signal;
use tracing::info;

use fitbit_note_sync::http::{AppState, EnvSyncTrigger, router};
use fitbit_note_sync::init_tracing;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let log_env = init_tracing();
    tracing::info!(%log_env, "fitbit_note_sync:http: log filter");

    let handle = PrometheusBuilder::new().install_recorder()?;
    let state = Arc::new(AppState {
        trigger: Arc::new(EnvSyncTrigger),
        metrics: handle,
    });
    let app = router(state);

    let addr: SocketAddr = std::env::var("ADDRESS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8080)));
    info!(%addr, "starting HTTP trigger");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("Failed to bind to address {addr}: {e}");
            std::process::exit(1);
        }
    };

    let server = axum::serve(listener, app.into_make_service());
    if let Err(e) = server
        .with_graceful_shutdown(async {
            if let Err(e) = signal::ctrl_c().await {
                tracing::error!("failed to install ctrl+c handler: {e}");
            }
        })
        .await
    {
        tracing::error!("Server error: {e}");
        std::process::exit(1);
    }

    Ok(())
}
