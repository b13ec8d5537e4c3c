// frontend/src/projection.rs
//
// Latest record for one unit, plus pass-through connection status and error.

use crate::error::FeedError;
use crate::listeners::{Listener, ListenerId};
use crate::manager::ConnectionManager;
use riverwatch_shared::TelemetryRecord;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

/// What happens to a unit's record when a frame for another unit arrives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RetainPolicy {
    /// Foreign frames clear the record, so it is only set while the most
    /// recent frame on the feed belongs to this unit.
    #[default]
    ClearOnForeign,
    /// Foreign frames are ignored; the last matching record stays.
    KeepLast,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnitView {
    pub record: Option<TelemetryRecord>,
    pub is_connected: bool,
    pub error: Option<FeedError>,
}

/// Filtered view over the manager's streams for one unit id.
///
/// Listeners are registered on construction and removed on drop. Watchers only
/// wake when the projected view actually changes. A deliberate close of the
/// manager clears the record and the error.
pub struct UnitProjection {
    unit_id: String,
    manager: ConnectionManager,
    handles: [ListenerId; 3],
    rx: watch::Receiver<UnitView>,
}

impl UnitProjection {
    pub fn new(manager: &ConnectionManager, unit_id: impl Into<String>) -> Self {
        Self::with_policy(manager, unit_id, RetainPolicy::default())
    }

    pub fn with_policy(
        manager: &ConnectionManager,
        unit_id: impl Into<String>,
        policy: RetainPolicy,
    ) -> Self {
        let unit_id = unit_id.into();
        let (tx, rx) = watch::channel(UnitView {
            record: None,
            is_connected: manager.is_connected(),
            error: manager.last_error(),
        });
        let tx = Arc::new(tx);

        let data = {
            let tx = tx.clone();
            let unit_id = unit_id.clone();
            manager.add_listener(Listener::data(move |record| {
                let next = if record.unit_id == unit_id {
                    Some(record)
                } else {
                    match policy {
                        RetainPolicy::KeepLast => return,
                        RetainPolicy::ClearOnForeign => None,
                    }
                };
                tx.send_if_modified(|view| {
                    if view.record.as_ref() == next {
                        return false;
                    }
                    view.record = next.cloned();
                    true
                });
            }))
        };

        let status = {
            let tx = tx.clone();
            let weak = manager.downgrade();
            manager.add_listener(Listener::status(move |up| {
                // status events can arrive out of order across threads; the
                // manager's current state is authoritative
                let (up, manual) = match weak.upgrade() {
                    Some(m) => (m.is_connected(), m.closed_manually()),
                    None => (up, false),
                };
                tx.send_if_modified(|view| {
                    let mut changed = view.is_connected != up;
                    view.is_connected = up;
                    if manual && (view.record.is_some() || view.error.is_some()) {
                        view.record = None;
                        view.error = None;
                        changed = true;
                    }
                    changed
                });
            }))
        };

        let error = {
            let tx = tx.clone();
            manager.add_listener(Listener::error(move |err| {
                tx.send_if_modified(|view| {
                    if view.error.as_ref() == err {
                        return false;
                    }
                    view.error = err.cloned();
                    true
                });
            }))
        };

        debug!(unit_id = %unit_id, ?policy, "unit projection attached");
        Self {
            unit_id,
            manager: manager.clone(),
            handles: [data, status, error],
            rx,
        }
    }

    pub fn unit_id(&self) -> &str {
        &self.unit_id
    }

    pub fn view(&self) -> UnitView {
        self.rx.borrow().clone()
    }

    pub fn record(&self) -> Option<TelemetryRecord> {
        self.rx.borrow().record.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.rx.borrow().is_connected
    }

    pub fn error(&self) -> Option<FeedError> {
        self.rx.borrow().error.clone()
    }

    /// Receiver for UI code that wants to await changes.
    pub fn watch(&self) -> watch::Receiver<UnitView> {
        self.rx.clone()
    }
}

impl Drop for UnitProjection {
    fn drop(&mut self) {
        for id in self.handles {
            self.manager.remove_listener(id);
        }
        debug!(unit_id = %self.unit_id, "unit projection detached");
    }
}
