//! Replay one heating cycle against a real backend.
//!
//! usage: replay_cycle <entry.json> [run-seconds]

use std::collections::HashMap;
use std::env;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sfp_bridge::{
    ClimateState, ConfigEntries, DeviceMeta, EntryConfig, HostContext, Integration, SfpClient,
    StateEvents, StateRegistry, StateSender, SubscriptionToken, migrate_entry,
};

const ENTITY: &str = "climate.demo";

#[derive(Default)]
struct DemoHost {
    states: Mutex<HashMap<String, ClimateState>>,
    subscribers: Mutex<Vec<(SubscriptionToken, StateSender)>>,
}

impl DemoHost {
    fn set(&self, state: ClimateState) {
        for (_, tx) in self.subscribers.lock().unwrap().iter() {
            let _ = tx.send(state.clone());
        }
        self.states.lock().unwrap().insert(state.entity_id.clone(), state);
    }
}

impl StateRegistry for DemoHost {
    fn state(&self, entity_id: &str) -> Option<ClimateState> {
        self.states.lock().unwrap().get(entity_id).cloned()
    }

    fn climate_entities(&self) -> Vec<(String, String)> {
        vec![(ENTITY.to_string(), "Demo thermostat".to_string())]
    }

    fn device_meta(&self, _entity_id: &str) -> Option<DeviceMeta> {
        Some(DeviceMeta {
            manufacturer: Some("Demo".into()),
            model: Some("Replay".into()),
        })
    }
}

impl StateEvents for DemoHost {
    fn subscribe(&self, _entity_id: &str, handler: StateSender) -> SubscriptionToken {
        let token = SubscriptionToken::new();
        self.subscribers.lock().unwrap().push((token, handler));
        token
    }

    fn unsubscribe(&self, token: SubscriptionToken) {
        self.subscribers.lock().unwrap().retain(|(t, _)| *t != token);
    }
}

struct PrintEntries;

impl ConfigEntries for PrintEntries {
    fn update_entry(&self, entry_id: &str, config: &EntryConfig) {
        println!("[{entry_id}] tokens updated, expires_at={:?}", config.expires_at);
    }
}

fn thermostat(action: &str) -> ClimateState {
    ClimateState::new(ENTITY, "heat")
        .with_attr("hvac_action", action)
        .with_attr("fan_mode", "auto")
        .with_attr("current_temperature", 68.0)
        .with_attr("temperature", 70.0)
        .with_name("Demo thermostat")
}

#[tokio::main]
async fn main() -> sfp_bridge::Result<()> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().collect();
    let path = args.get(1).expect("usage: replay_cycle <entry.json> [run-seconds]");
    let run_secs: u64 = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(10);

    let raw: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(path)?)?;
    let version = raw.get("version").and_then(|v| v.as_u64()).unwrap_or(1) as u32;
    let data = raw.get("data").cloned().unwrap_or(raw);
    let mut config = EntryConfig::from_value(migrate_entry(version, data)?)?;
    config.climate_entity_id = Some(ENTITY.to_string());

    let host = Arc::new(DemoHost::default());
    host.set(thermostat("idle"));

    let context = HostContext {
        registry: host.clone(),
        events: host.clone(),
        entries: Arc::new(PrintEntries),
        store: None,
    };
    let integration = Integration::setup("demo", config, SfpClient::builder().build()?, context);

    println!("Starting heating cycle for {run_secs}s...");
    host.set(thermostat("heating"));
    tokio::time::sleep(Duration::from_secs(run_secs)).await;
    host.set(thermostat("idle"));
    tokio::time::sleep(Duration::from_secs(2)).await;

    for sensor in integration.sensors() {
        println!(
            "{}: {} {}{}",
            sensor.description.name,
            sensor.value.map_or_else(|| "-".to_string(), |v| format!("{v:.1}")),
            sensor.description.unit,
            if sensor.available { "" } else { " (unavailable)" },
        );
    }

    integration.unload().await;
    Ok(())
}
