use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const STATE_UNKNOWN: &str = "unknown";
const STATE_UNAVAILABLE: &str = "unavailable";

/// Eight-state equipment classification of a climate entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EquipmentStatus {
    #[serde(rename = "Cooling_Fan")]
    CoolingFan,
    Cooling,
    #[serde(rename = "Heating_Fan")]
    HeatingFan,
    Heating,
    #[serde(rename = "AuxHeat_Fan")]
    AuxHeatFan,
    AuxHeat,
    #[serde(rename = "Fan_only")]
    FanOnly,
    #[default]
    Idle,
}

impl EquipmentStatus {
    pub const ALL: [EquipmentStatus; 8] = [
        EquipmentStatus::CoolingFan,
        EquipmentStatus::Cooling,
        EquipmentStatus::HeatingFan,
        EquipmentStatus::Heating,
        EquipmentStatus::AuxHeatFan,
        EquipmentStatus::AuxHeat,
        EquipmentStatus::FanOnly,
        EquipmentStatus::Idle,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EquipmentStatus::CoolingFan => "Cooling_Fan",
            EquipmentStatus::Cooling => "Cooling",
            EquipmentStatus::HeatingFan => "Heating_Fan",
            EquipmentStatus::Heating => "Heating",
            EquipmentStatus::AuxHeatFan => "AuxHeat_Fan",
            EquipmentStatus::AuxHeat => "AuxHeat",
            EquipmentStatus::FanOnly => "Fan_only",
            EquipmentStatus::Idle => "Idle",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == s)
    }

    pub fn is_idle(&self) -> bool {
        *self == EquipmentStatus::Idle
    }

    /// Coarse mode for a non-idle status.
    pub fn active_mode(&self) -> Option<ActiveMode> {
        match self {
            EquipmentStatus::Heating
            | EquipmentStatus::HeatingFan
            | EquipmentStatus::AuxHeat
            | EquipmentStatus::AuxHeatFan => Some(ActiveMode::Heating),
            EquipmentStatus::Cooling | EquipmentStatus::CoolingFan => Some(ActiveMode::Cooling),
            EquipmentStatus::FanOnly => Some(ActiveMode::FanOnly),
            EquipmentStatus::Idle => None,
        }
    }
}

impl fmt::Display for EquipmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActiveMode {
    Heating,
    Cooling,
    FanOnly,
}

impl ActiveMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActiveMode::Heating => "heating",
            ActiveMode::Cooling => "cooling",
            ActiveMode::FanOnly => "fanonly",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "Mode_Change")]
    ModeChange,
    #[serde(rename = "Telemetry_Update")]
    TelemetryUpdate,
}

/// Snapshot of a host climate entity as delivered by a state-change event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClimateState {
    pub entity_id: String,
    pub state: String,
    pub name: Option<String>,
    pub attributes: Map<String, Value>,
}

impl ClimateState {
    pub fn new(entity_id: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            state: state.into(),
            ..Default::default()
        }
    }

    pub fn with_attr(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn attr(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key).filter(|v| !v.is_null())
    }

    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attr(key).and_then(|v| v.as_str())
    }

    pub fn attr_f64(&self, key: &str) -> Option<f64> {
        self.attr(key).and_then(|v| v.as_f64())
    }

    pub fn hvac_action(&self) -> Option<&str> {
        self.attr_str("hvac_action")
    }

    pub fn fan_mode(&self) -> Option<&str> {
        self.attr_str("fan_mode")
    }

    /// False when the host reports the entity as unknown or unavailable.
    pub fn is_connected(&self) -> bool {
        self.state != STATE_UNKNOWN && self.state != STATE_UNAVAILABLE
    }
}

/// Hardware identity from the host's device registry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceMeta {
    pub manufacturer: Option<String>,
    pub model: Option<String>,
}

/// Filter usage figures reported by the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FilterStatus {
    pub percent_used: Option<f64>,
    pub minutes_today: Option<f64>,
    pub minutes_total: Option<f64>,
}
