mod auth;
mod classify;
mod client;
mod config;
mod error;
mod flow;
mod host;
mod integration;
mod poller;
mod protocol;
mod reset;
mod scheduler;
mod telemetry;
mod tracker;
mod types;
mod watcher;

pub use auth::{Auth, PRIMARY_SKEW_SECS, SECONDARY_SKEW_SECS, is_fresh};
pub use classify::{classify, is_active};
pub use client::{SfpClient, SfpClientBuilder};
pub use config::*;
pub use error::{Error, Result};
pub use flow::{ConfigFlow, FlowResult, FormErrors, LinkInput, LoginInput, OptionsFlow};
pub use host::{
    ConfigEntries, JsonFileStore, RunStateStore, StateEvents, StateRegistry, StateSender,
    SubscriptionToken,
};
pub use integration::{HostContext, Integration, SERVICE_RESET_FILTER, SERVICE_SEND_NOW};
pub use poller::{
    POLL_INTERVAL, SENSORS, SensorDescription, SensorReading, StatusField, StatusPoller,
    parse_status,
};
pub use protocol::{HvacChoice, LoginResponse, TokenGrant};
pub use reset::{FOLLOWUP_DELAY, ResetCommand};
pub use scheduler::{PeriodicHandle, RefreshTrigger, schedule_periodic};
pub use telemetry::{Identity, TelemetryEvent};
pub use tracker::{
    CompletedCycle, CycleTracker, DEBOUNCE_MILLIS, MAX_RUNTIME_SECS, Observation,
    PersistedRunState, RESTORE_WINDOW_SECS, RunState, clamp_runtime,
};
pub use types::*;
pub use watcher::TelemetryWatcher;
