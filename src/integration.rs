//! Per-entry lifecycle: wires the watcher, status poller and reset action to
//! the host, exposes the two host actions, and tears everything down again.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::auth::Auth;
use crate::client::SfpClient;
use crate::config::EntryConfig;
use crate::host::{ConfigEntries, RunStateStore, StateEvents, StateRegistry, SubscriptionToken};
use crate::poller::{POLL_INTERVAL, SensorReading, StatusPoller};
use crate::reset::ResetCommand;
use crate::scheduler::PeriodicHandle;
use crate::telemetry::TelemetryEvent;
use crate::types::ClimateState;
use crate::watcher::TelemetryWatcher;
use crate::{Error, Result};

pub const SERVICE_SEND_NOW: &str = "send_now";
pub const SERVICE_RESET_FILTER: &str = "reset_filter";

/// Host facilities an entry needs at runtime.
#[derive(Clone)]
pub struct HostContext {
    pub registry: Arc<dyn StateRegistry>,
    pub events: Arc<dyn StateEvents>,
    pub entries: Arc<dyn ConfigEntries>,
    pub store: Option<Arc<dyn RunStateStore>>,
}

enum WatcherCommand {
    SendNow(ClimateState, oneshot::Sender<Result<TelemetryEvent>>),
    Shutdown,
}

struct WatcherTask {
    entity_id: String,
    subscription: SubscriptionToken,
    commands: mpsc::UnboundedSender<WatcherCommand>,
    task: JoinHandle<()>,
}

pub struct Integration {
    entry_id: String,
    host: HostContext,
    auth: Arc<Auth>,
    poller: Arc<StatusPoller>,
    poll_handle: PeriodicHandle,
    reset: ResetCommand,
    watcher: Option<WatcherTask>,
}

impl Integration {
    /// Set up one config entry. Invalid configuration disables telemetry
    /// but the rest of the entry still loads.
    pub fn setup(
        entry_id: impl Into<String>,
        config: EntryConfig,
        client: SfpClient,
        host: HostContext,
    ) -> Self {
        let entry_id = entry_id.into();
        let auth = Arc::new(Auth::new(
            client.clone(),
            entry_id.clone(),
            config.clone(),
            host.entries.clone(),
        ));

        let poller = Arc::new(StatusPoller::new(client.clone(), auth.clone()));
        let poll_handle = poller.schedule(POLL_INTERVAL);
        let reset = ResetCommand::new(client.clone(), auth.clone()).with_refresh(poll_handle.trigger());

        let watcher = match (config.validate(), config.climate_entity_id.as_deref()) {
            (Err(e), _) => {
                error!(entry_id = %entry_id, error = %e, "telemetry disabled: invalid configuration");
                None
            }
            (Ok(()), None) => {
                info!(entry_id = %entry_id, "telemetry disabled: no climate entity selected");
                None
            }
            (Ok(()), Some(entity_id)) => Some(spawn_watcher(&host, client, auth.clone(), entity_id)),
        };

        debug!(entry_id = %entry_id, telemetry = watcher.is_some(), "entry set up");
        Self {
            entry_id,
            host,
            auth,
            poller,
            poll_handle,
            reset,
            watcher,
        }
    }

    pub fn entry_id(&self) -> &str {
        &self.entry_id
    }

    pub fn auth(&self) -> &Arc<Auth> {
        &self.auth
    }

    pub fn poller(&self) -> &Arc<StatusPoller> {
        &self.poller
    }

    pub fn sensors(&self) -> Vec<SensorReading> {
        self.poller.sensors()
    }

    pub fn telemetry_enabled(&self) -> bool {
        self.watcher.is_some()
    }

    /// Dispatch a host action by name.
    pub async fn call_service(&self, service: &str) -> Result<()> {
        match service {
            SERVICE_SEND_NOW => self.send_now().await.map(|_| ()),
            SERVICE_RESET_FILTER => self.reset_filter().await,
            other => Err(Error::Protocol(format!("unknown service: {other}"))),
        }
    }

    /// Post the entity's current readings immediately. `Ok(None)` when
    /// telemetry is disabled or the entity has no state yet.
    pub async fn send_now(&self) -> Result<Option<TelemetryEvent>> {
        let Some(watcher) = &self.watcher else {
            warn!(entry_id = %self.entry_id, "send_now ignored: telemetry disabled");
            return Ok(None);
        };
        let Some(state) = self.host.registry.state(&watcher.entity_id) else {
            warn!(entity_id = %watcher.entity_id, "send_now ignored: entity has no state");
            return Ok(None);
        };
        let (reply, response) = oneshot::channel();
        watcher
            .commands
            .send(WatcherCommand::SendNow(state, reply))
            .map_err(|_| Error::Closed)?;
        response.await.map_err(|_| Error::Closed)?.map(Some)
    }

    pub async fn reset_filter(&self) -> Result<()> {
        self.reset.press().await
    }

    /// Push edited options into the running entry. Telemetry identity and
    /// entity selection only change on the next setup.
    pub fn apply_options(&self, config: EntryConfig) {
        self.auth.replace_config(config);
        self.poll_handle.trigger_now();
    }

    /// Unsubscribe, stop polling and let any in-flight post finish before
    /// run state is flushed.
    pub async fn unload(self) {
        self.poll_handle.cancel();
        if let Some(watcher) = self.watcher {
            self.host.events.unsubscribe(watcher.subscription);
            let _ = watcher.commands.send(WatcherCommand::Shutdown);
            if let Err(e) = watcher.task.await {
                warn!(error = %e, "telemetry task ended abnormally");
            }
        }
        debug!(entry_id = %self.entry_id, "entry unloaded");
    }
}

fn spawn_watcher(
    host: &HostContext,
    client: SfpClient,
    auth: Arc<Auth>,
    entity_id: &str,
) -> WatcherTask {
    let device = host.registry.device_meta(entity_id).unwrap_or_default();
    let mut watcher = TelemetryWatcher::new(client, auth, entity_id, device);
    if let Some(store) = &host.store {
        watcher = watcher.with_store(store.clone(), Utc::now());
    }

    let (state_tx, mut states) = mpsc::unbounded_channel();
    let subscription = host.events.subscribe(entity_id, state_tx);
    let current = host.registry.state(entity_id);
    let (commands, mut command_rx) = mpsc::unbounded_channel();

    let task = tokio::spawn(async move {
        watcher.prime(current.as_ref()).await;
        loop {
            // States queued before a command are handled first.
            tokio::select! {
                biased;
                Some(state) = states.recv() => {
                    watcher.handle_state(&state).await;
                }
                Some(command) = command_rx.recv() => match command {
                    WatcherCommand::SendNow(state, reply) => {
                        let _ = reply.send(watcher.send_now(&state).await);
                    }
                    WatcherCommand::Shutdown => {
                        while let Ok(state) = states.try_recv() {
                            watcher.handle_state(&state).await;
                        }
                        break;
                    }
                },
                else => break,
            }
        }
        watcher.shutdown();
    });

    WatcherTask {
        entity_id: entity_id.to_string(),
        subscription,
        commands,
        task,
    }
}
