use sfp_bridge::{ClimateState, EquipmentStatus, classify, is_active};

fn climate(action: Option<&str>, fan_mode: Option<&str>) -> ClimateState {
    let mut state = ClimateState::new("climate.test", "heat_cool");
    if let Some(action) = action {
        state = state.with_attr("hvac_action", action);
    }
    if let Some(fan_mode) = fan_mode {
        state = state.with_attr("fan_mode", fan_mode);
    }
    state
}

#[test]
fn action_and_fan_combinations() {
    let cases = [
        (Some("cooling"), Some("on"), EquipmentStatus::CoolingFan, true),
        (Some("cooling"), Some("auto"), EquipmentStatus::Cooling, true),
        (Some("heating"), Some("circulate"), EquipmentStatus::HeatingFan, true),
        (Some("heating"), None, EquipmentStatus::Heating, true),
        (Some("fan"), Some("auto"), EquipmentStatus::FanOnly, true),
        (Some("idle"), Some("on_high"), EquipmentStatus::FanOnly, true),
        (None, Some("on"), EquipmentStatus::FanOnly, true),
        (Some("idle"), Some("auto"), EquipmentStatus::Idle, false),
        (Some("off"), None, EquipmentStatus::Idle, false),
        (None, None, EquipmentStatus::Idle, false),
    ];
    for (action, fan_mode, status, active) in cases {
        let state = climate(action, fan_mode);
        assert_eq!(classify(&state), status, "{action:?}/{fan_mode:?}");
        assert_eq!(is_active(&state), active, "{action:?}/{fan_mode:?}");
    }
}

#[test]
fn aux_heat_needs_heating_action() {
    let aux = climate(Some("heating"), Some("auto")).with_attr("preset_mode", "Emergency Heat");
    assert_eq!(classify(&aux), EquipmentStatus::AuxHeat);

    let aux_fan = climate(Some("heating"), Some("on")).with_attr("hvac_mode", "aux_heat");
    assert_eq!(classify(&aux_fan), EquipmentStatus::AuxHeatFan);

    let idle_aux = climate(Some("idle"), None).with_attr("preset_mode", "aux");
    assert_eq!(classify(&idle_aux), EquipmentStatus::Idle);
}

#[test]
fn drying_counts_as_idle_and_inactive() {
    let state = climate(Some("drying"), Some("auto"));
    assert_eq!(classify(&state), EquipmentStatus::Idle);
    assert!(!is_active(&state));
}

#[test]
fn labels_match_wire_names() {
    let labels: Vec<&str> = EquipmentStatus::ALL.iter().map(|s| s.as_str()).collect();
    assert_eq!(
        labels,
        [
            "Cooling_Fan",
            "Cooling",
            "Heating_Fan",
            "Heating",
            "AuxHeat_Fan",
            "AuxHeat",
            "Fan_only",
            "Idle"
        ]
    );
    assert_eq!(EquipmentStatus::parse("Fan_only"), Some(EquipmentStatus::FanOnly));
    assert_eq!(EquipmentStatus::parse("fan_only"), None);
}
