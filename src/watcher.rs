//! Telemetry watcher for one climate entity.
//!
//! Each state change is classified, fed through the cycle tracker, persisted
//! and (unless debounced) posted. Nothing here returns an error to the host:
//! failed posts are logged at the call site.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, warn};

use crate::Result;
use crate::auth::Auth;
use crate::client::SfpClient;
use crate::host::RunStateStore;
use crate::telemetry::{Identity, TelemetryEvent};
use crate::tracker::CycleTracker;
use crate::types::{ClimateState, DeviceMeta};

pub struct TelemetryWatcher {
    client: SfpClient,
    auth: Arc<Auth>,
    identity: Identity,
    entity_id: String,
    tracker: CycleTracker,
    store: Option<Arc<dyn RunStateStore>>,
}

impl TelemetryWatcher {
    pub fn new(
        client: SfpClient,
        auth: Arc<Auth>,
        entity_id: impl Into<String>,
        device: DeviceMeta,
    ) -> Self {
        let cfg = auth.config();
        Self {
            client,
            identity: Identity {
                user_id: cfg.user_id.clone(),
                hvac_id: cfg.hvac_id.clone(),
                device,
            },
            auth,
            entity_id: entity_id.into(),
            tracker: CycleTracker::new(),
            store: None,
        }
    }

    /// Attach run-state storage and resume a recent unfinished cycle from it.
    pub fn with_store(mut self, store: Arc<dyn RunStateStore>, now: DateTime<Utc>) -> Self {
        match store.load() {
            Ok(Some(persisted)) => self.tracker = CycleTracker::restore(&persisted, now),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "could not load persisted run state"),
        }
        self.store = Some(store);
        self
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn tracker(&self) -> &CycleTracker {
        &self.tracker
    }

    fn persist(&self) {
        if let Some(store) = &self.store
            && let Err(e) = store.save(&self.tracker.snapshot())
        {
            warn!(error = %e, "could not persist run state");
        }
    }

    /// Seed from the entity's current state and send an initial update.
    pub async fn prime(&mut self, current: Option<&ClimateState>) -> Option<TelemetryEvent> {
        let current = current?;
        let now = Utc::now();
        self.tracker.prime(current, now);
        self.handle_state_at(current, now).await
    }

    pub async fn handle_state(&mut self, climate: &ClimateState) -> Option<TelemetryEvent> {
        self.handle_state_at(climate, Utc::now()).await
    }

    /// Returns the event when one was dispatched (whether or not the post
    /// succeeded); `None` for foreign entities and debounced updates.
    pub async fn handle_state_at(
        &mut self,
        climate: &ClimateState,
        now: DateTime<Utc>,
    ) -> Option<TelemetryEvent> {
        if climate.entity_id != self.entity_id {
            return None;
        }
        let obs = self.tracker.observe(climate, now);
        self.persist();

        if !self.tracker.should_post(&obs, now) {
            debug!(status = %obs.equipment_status, "duplicate telemetry suppressed");
            return None;
        }
        let event = TelemetryEvent::build(&self.identity, climate, &obs, now);
        self.tracker.record_post(obs.equipment_status, now);
        let _ = self.post(&event).await;
        Some(event)
    }

    /// Manual "send now": current readings, no cycle bookkeeping, no debounce.
    pub async fn send_now(&self, climate: &ClimateState) -> Result<TelemetryEvent> {
        let obs = self.tracker.peek(climate);
        let event = TelemetryEvent::build(&self.identity, climate, &obs, Utc::now());
        self.post(&event).await?;
        Ok(event)
    }

    /// Post with one forced-refresh retry on an authorization failure.
    pub async fn post(&self, event: &TelemetryEvent) -> Result<()> {
        let cfg = self.auth.config();
        let url = cfg.telemetry_url();
        let body = event.to_body(cfg.ingest_batch);
        debug!(url = %url, event_type = ?event.event_type, status = %event.equipment_status, "posting telemetry");

        let token = self.auth.telemetry_token().await;
        match self.client.post_telemetry(&url, token.as_deref(), &body).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_unauthorized() => {
                warn!(url = %url, "telemetry unauthorized; refreshing and retrying once");
                let token = self.auth.force_telemetry_refresh().await;
                match self.client.post_telemetry(&url, token.as_deref(), &body).await {
                    Ok(()) => {
                        debug!("telemetry retry accepted");
                        Ok(())
                    }
                    Err(e) => {
                        error!(url = %url, error = %e, body = %body, "telemetry retry failed");
                        Err(e)
                    }
                }
            }
            Err(e) => {
                error!(url = %url, error = %e, body = %body, "telemetry post failed");
                Err(e)
            }
        }
    }

    /// Flush run state before the watcher goes away.
    pub fn shutdown(&self) {
        self.persist();
        debug!(entity_id = %self.entity_id, "telemetry watcher stopped");
    }
}
