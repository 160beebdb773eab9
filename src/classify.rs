use crate::types::{ClimateState, EquipmentStatus};

/// Raw `hvac_action` values treated as moving air.
pub const ACTIVE_ACTIONS: &[&str] = &["heating", "cooling", "fan"];

/// Fan modes that move air even while the action is idle.
pub const FAN_ACTIVE_MODES: &[&str] = &["on", "on_high", "circulate"];

const AUX_MARKERS: &[&str] = &["emergency", "aux"];

fn fold(s: Option<&str>) -> Option<String> {
    s.map(|v| v.trim().to_lowercase())
}

fn fan_explicitly_on(fan_mode: Option<&str>) -> bool {
    fold(fan_mode).is_some_and(|fm| FAN_ACTIVE_MODES.contains(&fm.as_str()))
}

fn aux_signaled(state: &ClimateState) -> bool {
    ["preset_mode", "hvac_mode"].iter().any(|key| {
        fold(state.attr_str(key))
            .is_some_and(|v| AUX_MARKERS.iter().any(|marker| v.contains(marker)))
    })
}

/// Map a climate state to one of the eight equipment labels. First match wins.
pub fn classify(state: &ClimateState) -> EquipmentStatus {
    let action = fold(state.hvac_action());
    let action = action.as_deref();
    let fan_on = fan_explicitly_on(state.fan_mode());
    let heating = action == Some("heating");
    let cooling = action == Some("cooling");

    if heating && aux_signaled(state) {
        return if fan_on {
            EquipmentStatus::AuxHeatFan
        } else {
            EquipmentStatus::AuxHeat
        };
    }
    if cooling {
        return if fan_on {
            EquipmentStatus::CoolingFan
        } else {
            EquipmentStatus::Cooling
        };
    }
    if heating {
        return if fan_on {
            EquipmentStatus::HeatingFan
        } else {
            EquipmentStatus::Heating
        };
    }
    if action == Some("fan") || fan_on {
        return EquipmentStatus::FanOnly;
    }
    EquipmentStatus::Idle
}

/// Backward-compatible activity flag carried as `isActive`.
pub fn is_active(state: &ClimateState) -> bool {
    let action = fold(state.hvac_action());
    let action = action.as_deref();
    if action.is_some_and(|a| ACTIVE_ACTIONS.contains(&a)) {
        return true;
    }
    matches!(action, None | Some("idle")) && fan_explicitly_on(state.fan_mode())
}
