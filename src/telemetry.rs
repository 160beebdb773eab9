use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::tracker::Observation;
use crate::types::{ClimateState, DeviceMeta, EquipmentStatus, EventType};

/// Flat event posted to the ingest endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryEvent {
    pub user_id: String,
    pub hvac_id: String,
    pub ha_entity_id: String,
    pub ts: String,
    pub current_temperature: Option<f64>,
    pub current_humidity: Option<f64>,
    pub target_temperature: Option<f64>,
    pub target_temp_high: Option<f64>,
    pub target_temp_low: Option<f64>,
    pub hvac_mode: Option<String>,
    pub hvac_status: Option<String>,
    pub fan_mode: Option<String>,
    pub equipment_status: EquipmentStatus,
    pub previous_status: EquipmentStatus,
    pub last_mode: Option<&'static str>,
    #[serde(rename = "isActive")]
    pub is_active: bool,
    pub event_type: EventType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime_seconds: Option<i64>,
    #[serde(rename = "cycle_start_ts", skip_serializing_if = "Option::is_none")]
    pub cycle_start: Option<String>,
    #[serde(rename = "cycle_end_ts", skip_serializing_if = "Option::is_none")]
    pub cycle_end: Option<String>,
    pub connected: bool,
    pub device_name: Option<String>,
    pub thermostat_manufacturer: Option<String>,
    pub thermostat_model: Option<String>,
    pub raw: Map<String, Value>,
}

fn iso(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, false)
}

/// Who is reporting; constant for one watcher.
#[derive(Debug, Clone, Default)]
pub struct Identity {
    pub user_id: String,
    pub hvac_id: String,
    pub device: DeviceMeta,
}

impl TelemetryEvent {
    pub fn build(
        identity: &Identity,
        climate: &ClimateState,
        obs: &Observation,
        now: DateTime<Utc>,
    ) -> Self {
        let completed = obs.completed.as_ref();
        Self {
            user_id: identity.user_id.clone(),
            hvac_id: identity.hvac_id.clone(),
            ha_entity_id: climate.entity_id.clone(),
            ts: iso(now),
            current_temperature: climate.attr_f64("current_temperature"),
            current_humidity: climate.attr_f64("current_humidity"),
            target_temperature: climate.attr_f64("temperature"),
            target_temp_high: climate.attr_f64("target_temp_high"),
            target_temp_low: climate.attr_f64("target_temp_low"),
            hvac_mode: climate
                .attr_str("hvac_mode")
                .map(str::to_string)
                .or_else(|| (!climate.state.is_empty()).then(|| climate.state.clone())),
            hvac_status: climate.hvac_action().map(str::to_string),
            fan_mode: climate.fan_mode().map(str::to_string),
            equipment_status: obs.equipment_status,
            previous_status: obs.previous_status,
            last_mode: obs.last_active_mode.map(|m| m.as_str()),
            is_active: obs.is_active,
            event_type: obs.event_type,
            runtime_seconds: completed.map(|c| c.runtime_seconds),
            cycle_start: completed.and_then(|c| c.start).map(iso),
            cycle_end: completed.map(|c| iso(c.end)),
            connected: climate.is_connected(),
            device_name: climate.name.clone(),
            thermostat_manufacturer: identity.device.manufacturer.clone(),
            thermostat_model: identity.device.model.clone(),
            raw: climate.attributes.clone(),
        }
    }

    pub fn is_cycle_end(&self) -> bool {
        self.runtime_seconds.is_some()
    }

    /// Body for the ingest endpoint; newer backends take an array.
    pub fn to_body(&self, batch: bool) -> Value {
        let obj = serde_json::to_value(self).unwrap_or(Value::Null);
        if batch { Value::Array(vec![obj]) } else { obj }
    }
}
