use fitbit_note_sync::{RunReport, SyncConfig, SyncOrchestrator, init_tracing};

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let log_env = init_tracing();
    tracing::info!(%log_env, "fitbit_note_sync: log filter");

    let config = match SyncConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "configuration error; run not started");
            println!("{}", serde_json::to_string_pretty(&RunReport::fault(e))?);
            std::process::exit(1);
        }
    };

    // partial failures are reported in the body, not the exit status
    let report = SyncOrchestrator::from_config(&config).run().await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
