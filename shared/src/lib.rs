use serde::de::Deserializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum UnitStatus {
    #[default]
    Normal,
    Warning,
    High,
    Critical,
}

impl UnitStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitStatus::Normal => "normal",
            UnitStatus::Warning => "warning",
            UnitStatus::High => "high",
            UnitStatus::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" => Some(UnitStatus::Normal),
            "warning" => Some(UnitStatus::Warning),
            "high" => Some(UnitStatus::High),
            "critical" => Some(UnitStatus::Critical),
            _ => None,
        }
    }

    /// 0 for normal up to 3 for critical.
    pub fn severity(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    #[default]
    Stable,
}

impl Trend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trend::Up => "up",
            Trend::Down => "down",
            Trend::Stable => "stable",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "up" => Some(Trend::Up),
            "down" => Some(Trend::Down),
            "stable" => Some(Trend::Stable),
            _ => None,
        }
    }
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Alert thresholds in meters. Any level may be missing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertLevels {
    #[serde(default, deserialize_with = "lenient_number")]
    pub normal: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub warning: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub high: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub critical: Option<f64>,
}

impl AlertLevels {
    /// Highest threshold reached by `level_m`, checked from critical down.
    pub fn classify(&self, level_m: f64) -> UnitStatus {
        let reached = |t: Option<f64>| t.is_some_and(|t| level_m >= t);
        if reached(self.critical) {
            UnitStatus::Critical
        } else if reached(self.high) {
            UnitStatus::High
        } else if reached(self.warning) {
            UnitStatus::Warning
        } else {
            UnitStatus::Normal
        }
    }
}

/// One decoded measurement update for a single sensor unit.
///
/// Records are never merged: the next record for the same unit replaces this one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub unit_id: String,
    pub display_name: String,
    pub height: f64,
    pub temperature: f64,
    /// 0..=100
    pub battery: f64,
    /// 0..=100
    pub signal: f64,
    pub sensor_online: bool,
    pub status: UnitStatus,
    pub trend: Trend,
    /// cm
    pub normal_level: Option<f64>,
    pub alert_levels: Option<AlertLevels>,
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid telemetry JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("telemetry frame is not a JSON object")]
    NotAnObject,
    #[error("telemetry frame has no unit_id")]
    MissingUnitId,
}

// ----------------------------
// Wire frame
// ----------------------------

/// Inbound frame as sent by the feed server.
///
/// Every field is optional on the wire; `decode_frame` applies defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetryFrame {
    #[serde(default, deserialize_with = "lenient_id", skip_serializing_if = "Option::is_none")]
    pub unit_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    // the sensor firmware spells it "hight"
    #[serde(default, deserialize_with = "lenient_number", skip_serializing_if = "Option::is_none")]
    pub hight: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number", skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number", skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number", skip_serializing_if = "Option::is_none")]
    pub battery: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number", skip_serializing_if = "Option::is_none")]
    pub signal: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number", skip_serializing_if = "Option::is_none")]
    pub sensor_status: Option<f64>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub trend: Option<String>,
    #[serde(default, deserialize_with = "lenient_number", skip_serializing_if = "Option::is_none")]
    pub normal_level: Option<f64>,
    // older dashboards send the camelCase spelling
    #[serde(
        default,
        rename = "normalLevel",
        deserialize_with = "lenient_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub normal_level_camel: Option<f64>,
    #[serde(default, deserialize_with = "lenient_alert_levels", skip_serializing_if = "Option::is_none")]
    pub alert_levels: Option<AlertLevels>,
}

impl TelemetryFrame {
    pub fn into_record(self) -> Result<TelemetryRecord, DecodeError> {
        let unit_id = self.unit_id.ok_or(DecodeError::MissingUnitId)?;
        let status = self
            .status
            .as_deref()
            .and_then(UnitStatus::parse)
            .unwrap_or_default();
        let trend = self
            .trend
            .as_deref()
            .and_then(Trend::parse)
            .unwrap_or_default();

        Ok(TelemetryRecord {
            display_name: self.unit.unwrap_or_else(|| unit_id.clone()),
            unit_id,
            height: first_nonzero(self.hight, self.height).unwrap_or(0.0),
            temperature: self.temperature.unwrap_or(0.0),
            battery: percent(self.battery),
            signal: percent(self.signal),
            sensor_online: self.sensor_status.is_some_and(|v| v != 0.0),
            status,
            trend,
            normal_level: first_nonzero(self.normal_level, self.normal_level_camel),
            alert_levels: self.alert_levels,
        })
    }
}

impl From<&TelemetryRecord> for TelemetryFrame {
    fn from(r: &TelemetryRecord) -> Self {
        Self {
            unit_id: Some(r.unit_id.clone()),
            unit: (r.display_name != r.unit_id).then(|| r.display_name.clone()),
            hight: None,
            height: Some(r.height),
            temperature: Some(r.temperature),
            battery: Some(r.battery),
            signal: Some(r.signal),
            sensor_status: Some(if r.sensor_online { 1.0 } else { 0.0 }),
            status: Some(r.status.as_str().to_string()),
            trend: Some(r.trend.as_str().to_string()),
            normal_level: r.normal_level,
            normal_level_camel: None,
            alert_levels: r.alert_levels,
        }
    }
}

/// Decode one text frame into a record. Frames without a unit id are rejected.
pub fn decode_frame(text: &str) -> Result<TelemetryRecord, DecodeError> {
    let value: Value = serde_json::from_str(text)?;
    if !value.is_object() {
        return Err(DecodeError::NotAnObject);
    }
    TelemetryFrame::deserialize(value)?.into_record()
}

pub fn encode_frame(record: &TelemetryRecord) -> Result<String, serde_json::Error> {
    serde_json::to_string(&TelemetryFrame::from(record))
}

/// A zero in the preferred spelling counts as unset; gateways zero-fill fields they don't know.
fn first_nonzero(preferred: Option<f64>, fallback: Option<f64>) -> Option<f64> {
    preferred.filter(|v| *v != 0.0).or(fallback).or(preferred)
}

fn percent(v: Option<f64>) -> f64 {
    v.unwrap_or(0.0).clamp(0.0, 100.0)
}

// Upstream gateways are loose about types: numbers arrive as strings, ids as numbers.
fn number_from(v: &Value) -> Option<f64> {
    let n = match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    };
    n.filter(|n| n.is_finite())
}

fn lenient_number<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    let v = Option::<Value>::deserialize(d)?;
    Ok(v.as_ref().and_then(number_from))
}

fn lenient_text<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    let v = Option::<Value>::deserialize(d)?;
    Ok(match v {
        Some(Value::String(s)) if !s.is_empty() => Some(s),
        _ => None,
    })
}

fn lenient_id<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    let v = Option::<Value>::deserialize(d)?;
    Ok(match v {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn lenient_alert_levels<'de, D: Deserializer<'de>>(d: D) -> Result<Option<AlertLevels>, D::Error> {
    let v = Option::<Value>::deserialize(d)?;
    Ok(match v {
        Some(obj @ Value::Object(_)) => AlertLevels::deserialize(obj).ok(),
        _ => None,
    })
}
