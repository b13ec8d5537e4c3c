// lib.rs
//
// Telemetry feed server: readings come in over HTTP (or from the simulator)
// and go out to every dashboard over /ws.

pub mod ring_buffer;
pub mod simulator;
pub mod state;
pub mod web;

use crate::state::AppState;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

pub const BIND_ENV: &str = "RIVERWATCH_BIND";
pub const SIMULATE_ENV: &str = "RIVERWATCH_SIMULATE";
pub const DEFAULT_BIND: &str = "0.0.0.0:3000";

/// Serve the feed on an already-bound listener until the task is dropped.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> std::io::Result<()> {
    let addr: SocketAddr = listener.local_addr()?;
    info!(%addr, "feed server listening");
    axum::serve(listener, web::router(state)).await
}

/// `1`, `true`, `yes`, `on` (any case) enable a flag.
pub fn flag_enabled(value: Option<&str>) -> bool {
    value.is_some_and(|v| {
        matches!(
            v.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}
