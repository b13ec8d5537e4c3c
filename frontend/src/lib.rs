// frontend/src/lib.rs
//
// Dashboard-side telemetry feed: one managed websocket, fanned out to every
// card and chart that asks for it.

pub mod config;
pub mod error;
pub mod listeners;
pub mod manager;
pub mod projection;
pub mod reconnect;
pub mod scope;
pub mod transport;

#[cfg(not(target_arch = "wasm32"))]
pub mod native;
#[cfg(target_arch = "wasm32")]
pub mod web;

#[cfg(test)]
mod testing;

pub use config::{FeedConfig, ReconnectConfig};
pub use error::{FeedError, TransportError};
pub use listeners::{Channel, Listener, ListenerId};
pub use manager::{ConnectionManager, ConnectionState};
pub use projection::{RetainPolicy, UnitProjection, UnitView};
pub use scope::FeedScope;
pub use riverwatch_shared::{TelemetryRecord, Trend, UnitStatus};

use once_cell::sync::OnceCell;

static FEED: OnceCell<ConnectionManager> = OnceCell::new();

/// Make `manager` the application's feed. Installing the same manager again is
/// fine; installing a different one is refused.
pub fn install(manager: ConnectionManager) -> Result<(), FeedError> {
    let current = FEED.get_or_init(|| manager.clone());
    if current.same_as(&manager) {
        Ok(())
    } else {
        Err(FeedError::AlreadyInstalled)
    }
}

pub fn installed() -> Option<&'static ConnectionManager> {
    FEED.get()
}
