//! Interfaces the host platform provides to the bridge.
//!
//! The host owns the entity registry, state-change dispatch and config-entry
//! persistence. The bridge only calls through these traits.

use std::fs;
use std::path::{Path, PathBuf};

use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::Result;
use crate::config::EntryConfig;
use crate::tracker::PersistedRunState;
use crate::types::{ClimateState, DeviceMeta};

/// Delivery side of a state-change subscription. The host sends each new
/// state of the subscribed entity, in arrival order.
pub type StateSender = mpsc::UnboundedSender<ClimateState>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionToken(Uuid);

impl SubscriptionToken {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionToken {
    fn default() -> Self {
        Self::new()
    }
}

pub trait StateRegistry: Send + Sync {
    fn state(&self, entity_id: &str) -> Option<ClimateState>;

    /// Climate entities as `(entity_id, display name)`.
    fn climate_entities(&self) -> Vec<(String, String)>;

    fn device_meta(&self, entity_id: &str) -> Option<DeviceMeta>;
}

pub trait StateEvents: Send + Sync {
    fn subscribe(&self, entity_id: &str, handler: StateSender) -> SubscriptionToken;

    fn unsubscribe(&self, token: SubscriptionToken);
}

/// Persists the mutated config record (token refreshes, option changes).
pub trait ConfigEntries: Send + Sync {
    fn update_entry(&self, entry_id: &str, config: &EntryConfig);
}

/// Small per-instance blob used for restart recovery of the run state.
pub trait RunStateStore: Send + Sync {
    fn load(&self) -> Result<Option<PersistedRunState>>;

    fn save(&self, state: &PersistedRunState) -> Result<()>;
}

/// [`RunStateStore`] writing one JSON file per configured instance.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<dir>/smartfilterpro.<entry_id>.json`
    pub fn for_entry(dir: impl AsRef<Path>, entry_id: &str) -> Self {
        Self::new(dir.as_ref().join(format!("{}.{entry_id}.json", crate::config::DOMAIN)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RunStateStore for JsonFileStore {
    fn load(&self) -> Result<Option<PersistedRunState>> {
        let text = match fs::read_to_string(&self.path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&text)?))
    }

    fn save(&self, state: &PersistedRunState) -> Result<()> {
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec(state)?)?;
        fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), "run state saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EquipmentStatus;
    use chrono::{TimeZone, Utc};

    #[test]
    fn file_store_round_trip_and_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::for_entry(dir.path(), "abc");
        assert!(store.path().ends_with("smartfilterpro.abc.json"));
        assert!(store.load().unwrap().is_none());

        let state = PersistedRunState {
            active_since: Some(Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap()),
            is_active: true,
            last_equipment_status: EquipmentStatus::Heating,
            ..Default::default()
        };
        store.save(&state).unwrap();
        assert_eq!(store.load().unwrap(), Some(state));
    }

    #[test]
    fn file_store_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("s.json"));
        std::fs::write(store.path(), "{{nope").unwrap();
        assert!(store.load().is_err());
    }

    #[test]
    fn subscription_tokens_are_unique() {
        assert_ne!(SubscriptionToken::new(), SubscriptionToken::new());
    }
}
