// main.rs

use anyhow::Context;
use riverwatch_backend::simulator::{default_units, simulator_task};
use riverwatch_backend::state::AppState;
use riverwatch_backend::{flag_enabled, serve, BIND_ENV, DEFAULT_BIND, SIMULATE_ENV};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const SIMULATOR_INTERVAL: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // --- Shared state ---
    let state = Arc::new(AppState::new());

    // --- Background tasks ---
    if flag_enabled(std::env::var(SIMULATE_ENV).ok().as_deref()) {
        let _sim = tokio::spawn(simulator_task(
            state.clone(),
            default_units(),
            SIMULATOR_INTERVAL,
        ));
    }

    // --- Webserver ---
    let addr = std::env::var(BIND_ENV).unwrap_or_else(|_| DEFAULT_BIND.to_string());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    serve(listener, state).await?;
    Ok(())
}
