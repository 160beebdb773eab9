#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use sfp_bridge::{
    ClimateState, ConfigEntries, DeviceMeta, EntryConfig, SfpClient, StateEvents, StateRegistry,
    StateSender, SubscriptionToken,
};
use wiremock::MockServer;

pub const ENTITY: &str = "climate.hallway";

pub fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

pub fn client() -> SfpClient {
    SfpClient::builder().build().expect("client should build")
}

/// Linked entry pointing at the mock server, with an hour-valid token.
pub fn linked_config(server: &MockServer) -> EntryConfig {
    EntryConfig {
        user_id: "user-1".into(),
        hvac_id: "hvac-9".into(),
        climate_entity_id: Some(ENTITY.into()),
        api_base: server.uri(),
        access_token: Some("tok-a".into()),
        refresh_token: Some("refresh-1".into()),
        expires_at: Some(unix_now() + 3600),
        ..Default::default()
    }
}

pub fn heating() -> ClimateState {
    ClimateState::new(ENTITY, "heat")
        .with_attr("hvac_action", "heating")
        .with_attr("current_temperature", 68.5)
        .with_attr("temperature", 70)
        .with_name("Hallway")
}

pub fn idle() -> ClimateState {
    ClimateState::new(ENTITY, "heat")
        .with_attr("hvac_action", "idle")
        .with_attr("fan_mode", "auto")
        .with_attr("current_temperature", 70.1)
        .with_name("Hallway")
}

#[derive(Default)]
pub struct RecordingEntries {
    pub updates: Mutex<Vec<(String, EntryConfig)>>,
}

impl RecordingEntries {
    pub fn last(&self) -> Option<EntryConfig> {
        self.updates.lock().unwrap().last().map(|(_, c)| c.clone())
    }
}

impl ConfigEntries for RecordingEntries {
    fn update_entry(&self, entry_id: &str, config: &EntryConfig) {
        self.updates
            .lock()
            .unwrap()
            .push((entry_id.to_string(), config.clone()));
    }
}

#[derive(Default)]
pub struct MockHost {
    pub states: Mutex<HashMap<String, ClimateState>>,
    pub names: Mutex<Vec<(String, String)>>,
    pub subscribers: Mutex<Vec<(SubscriptionToken, String, StateSender)>>,
}

impl MockHost {
    pub fn with_entity(state: ClimateState, name: &str) -> Arc<Self> {
        let host = Self::default();
        host.names
            .lock()
            .unwrap()
            .push((state.entity_id.clone(), name.to_string()));
        host.states
            .lock()
            .unwrap()
            .insert(state.entity_id.clone(), state);
        Arc::new(host)
    }

    /// Update the registry and notify subscribers, like a host state write.
    pub fn set_state(&self, state: ClimateState) {
        for (_, entity_id, tx) in self.subscribers.lock().unwrap().iter() {
            if *entity_id == state.entity_id {
                let _ = tx.send(state.clone());
            }
        }
        self.states
            .lock()
            .unwrap()
            .insert(state.entity_id.clone(), state);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().unwrap().len()
    }
}

impl StateRegistry for MockHost {
    fn state(&self, entity_id: &str) -> Option<ClimateState> {
        self.states.lock().unwrap().get(entity_id).cloned()
    }

    fn climate_entities(&self) -> Vec<(String, String)> {
        self.names.lock().unwrap().clone()
    }

    fn device_meta(&self, _entity_id: &str) -> Option<DeviceMeta> {
        Some(DeviceMeta {
            manufacturer: Some("Ecobee".into()),
            model: Some("Premium".into()),
        })
    }
}

impl StateEvents for MockHost {
    fn subscribe(&self, entity_id: &str, handler: StateSender) -> SubscriptionToken {
        let token = SubscriptionToken::new();
        self.subscribers
            .lock()
            .unwrap()
            .push((token, entity_id.to_string(), handler));
        token
    }

    fn unsubscribe(&self, token: SubscriptionToken) {
        self.subscribers.lock().unwrap().retain(|(t, _, _)| *t != token);
    }
}
