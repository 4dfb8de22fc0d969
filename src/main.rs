use anyhow::Result;

mod config;
mod error;
mod events;
mod functions;
mod queues;
mod schema;
mod services;
mod state;
mod storage;

use config::Config;
use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env();
    let (state, triage_rx) = AppState::new(&config);

    tokio::spawn(functions::triage::run_triage_worker(
        state.clone(),
        triage_rx,
    ));
    tokio::spawn(functions::autoclose::run_auto_close(state.clone()));

    let app = functions::router(state);
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install ctrl-c handler");
    tracing::info!("shutting down");
}
