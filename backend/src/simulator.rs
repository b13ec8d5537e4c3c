// Fake gauges for local development when no field gateway is posting readings.

use crate::state::AppState;
use rand::RngExt;
use riverwatch_shared::{AlertLevels, TelemetryRecord, Trend};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const TREND_DEADBAND_M: f64 = 0.01;

pub struct SimulatedUnit {
    unit_id: String,
    display_name: String,
    height: f64,
    battery: f64,
    alert_levels: AlertLevels,
    normal_level_cm: f64,
}

impl SimulatedUnit {
    pub fn new(unit_id: &str, display_name: &str, height: f64) -> Self {
        Self {
            unit_id: unit_id.to_string(),
            display_name: display_name.to_string(),
            height,
            battery: 100.0,
            alert_levels: AlertLevels {
                normal: Some(1.0),
                warning: Some(2.0),
                high: Some(3.0),
                critical: Some(4.0),
            },
            normal_level_cm: 100.0,
        }
    }

    /// Advance one tick: random-walk the level, drain the battery a little.
    pub fn step(&mut self) -> TelemetryRecord {
        let mut rng = rand::rng();
        let before = self.height;
        self.height = (self.height + rng.random_range(-0.08..0.1)).clamp(0.0, 5.0);
        self.battery = (self.battery - rng.random_range(0.0..0.05)).max(0.0);

        let delta = self.height - before;
        let trend = if delta > TREND_DEADBAND_M {
            Trend::Up
        } else if delta < -TREND_DEADBAND_M {
            Trend::Down
        } else {
            Trend::Stable
        };

        TelemetryRecord {
            unit_id: self.unit_id.clone(),
            display_name: self.display_name.clone(),
            height: self.height,
            temperature: rng.random_range(8.0..24.0),
            battery: self.battery,
            signal: rng.random_range(55.0..100.0),
            sensor_online: true,
            status: self.alert_levels.classify(self.height),
            trend,
            normal_level: Some(self.normal_level_cm),
            alert_levels: Some(self.alert_levels),
        }
    }
}

pub fn default_units() -> Vec<SimulatedUnit> {
    vec![
        SimulatedUnit::new("rw-001", "North Bridge", 0.8),
        SimulatedUnit::new("rw-002", "Mill Weir", 1.6),
        SimulatedUnit::new("rw-003", "Harbour Gate", 2.4),
    ]
}

/// Publish one reading per unit every `interval`, forever.
pub async fn simulator_task(state: Arc<AppState>, mut units: Vec<SimulatedUnit>, interval: Duration) {
    info!(units = units.len(), interval_ms = interval.as_millis() as u64, "simulator running");
    let mut tick = tokio::time::interval(interval);
    loop {
        tick.tick().await;
        for unit in &mut units {
            let record = unit.step();
            state.publish(record);
        }
    }
}
