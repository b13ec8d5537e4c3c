use crate::ring_buffer::RingBuffer;
use riverwatch_shared::TelemetryRecord;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::debug;

pub const RECENT_CAPACITY: usize = 1024;
const BROADCAST_CAPACITY: usize = 512;

#[derive(Clone)]
pub struct AppState {
    /// Recent readings across all units, newest last
    pub ring_buffer: Arc<Mutex<RingBuffer<TelemetryRecord>>>,

    /// Latest reading per unit id; replayed to every new dashboard
    pub latest: Arc<Mutex<HashMap<String, TelemetryRecord>>>,

    /// Telemetry stream → dashboards
    pub ws_tx: broadcast::Sender<TelemetryRecord>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            ring_buffer: Arc::new(Mutex::new(RingBuffer::new(RECENT_CAPACITY))),
            latest: Arc::new(Mutex::new(HashMap::new())),
            ws_tx: broadcast::channel(BROADCAST_CAPACITY).0,
        }
    }

    /// Remember `record` and fan it out to every connected dashboard.
    pub fn publish(&self, record: TelemetryRecord) {
        self.ring_buffer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(record.clone());
        self.latest
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(record.unit_id.clone(), record.clone());

        // no subscribers is fine
        let receivers = self.ws_tx.send(record).unwrap_or(0);
        debug!(receivers, "reading published");
    }

    /// Latest reading of every unit, ordered by unit id.
    pub fn snapshot(&self) -> Vec<TelemetryRecord> {
        let mut out: Vec<TelemetryRecord> = self
            .latest
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();
        out.sort_by(|a, b| a.unit_id.cmp(&b.unit_id));
        out
    }

    pub fn recent(&self, n: usize) -> Vec<TelemetryRecord> {
        self.ring_buffer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .recent(n)
            .into_iter()
            .cloned()
            .collect()
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use riverwatch_shared::decode_frame;

    #[test]
    fn publish_tracks_latest_per_unit() {
        let state = AppState::new();
        let mut rx = state.ws_tx.subscribe();

        state.publish(decode_frame(r#"{"unit_id":"b","hight":1.0}"#).unwrap());
        state.publish(decode_frame(r#"{"unit_id":"a","hight":2.0}"#).unwrap());
        state.publish(decode_frame(r#"{"unit_id":"b","hight":3.0}"#).unwrap());

        let snap = state.snapshot();
        assert_eq!(snap.len(), 2);
        assert_eq!((snap[0].unit_id.as_str(), snap[0].height), ("a", 2.0));
        assert_eq!((snap[1].unit_id.as_str(), snap[1].height), ("b", 3.0));

        assert_eq!(state.recent(2).iter().map(|r| r.height).collect::<Vec<_>>(), vec![3.0, 2.0]);
        assert_eq!(rx.try_recv().unwrap().unit_id, "b");
    }
}
