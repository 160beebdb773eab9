//! Cycle tracking and run-duration accounting.
//!
//! A cycle starts when the activity flag flips true and ends when it flips
//! back. Only those two boundaries produce `Mode_Change` events; every other
//! update is a `Telemetry_Update`.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::classify::{classify, is_active};
use crate::types::{ActiveMode, ClimateState, EquipmentStatus, EventType};

/// Runtime ceiling for a single cycle.
pub const MAX_RUNTIME_SECS: i64 = 86_400;

/// A persisted cycle start older than this is not resumed.
pub const RESTORE_WINDOW_SECS: i64 = 3_600;

/// Identical `Telemetry_Update`s closer together than this are collapsed.
pub const DEBOUNCE_MILLIS: i64 = 3_000;

pub const RUN_STATE_VERSION: u32 = 1;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunState {
    pub active_since: Option<DateTime<Utc>>,
    pub last_action: Option<String>,
    pub is_active: bool,
    pub last_active_mode: Option<ActiveMode>,
    pub last_equipment_status: EquipmentStatus,
    pub last_post_time: Option<DateTime<Utc>>,
    pub last_post_status: Option<EquipmentStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedRunState {
    pub version: u32,
    #[serde(default)]
    pub active_since: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub last_equipment_status: EquipmentStatus,
    #[serde(default)]
    pub last_active_mode: Option<ActiveMode>,
}

impl Default for PersistedRunState {
    fn default() -> Self {
        Self {
            version: RUN_STATE_VERSION,
            active_since: None,
            is_active: false,
            last_equipment_status: EquipmentStatus::Idle,
            last_active_mode: None,
        }
    }
}

/// Boundaries and clamped duration of a finished cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletedCycle {
    pub start: Option<DateTime<Utc>>,
    pub end: DateTime<Utc>,
    pub runtime_seconds: i64,
}

/// Result of feeding one state update to the tracker.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub event_type: EventType,
    pub equipment_status: EquipmentStatus,
    pub previous_status: EquipmentStatus,
    pub is_active: bool,
    pub last_active_mode: Option<ActiveMode>,
    pub completed: Option<CompletedCycle>,
}

/// `end - start` in whole seconds, clamped to `[0, MAX_RUNTIME_SECS]`.
pub fn clamp_runtime(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    let secs = (end - start).num_seconds();
    if secs < 0 {
        warn!(delta = secs, start = %start, end = %end, "negative cycle runtime, clamping to 0");
        0
    } else if secs > MAX_RUNTIME_SECS {
        warn!(delta = secs, start = %start, end = %end, "cycle runtime exceeds 24h, clamping");
        MAX_RUNTIME_SECS
    } else {
        secs
    }
}

#[derive(Debug, Clone, Default)]
pub struct CycleTracker {
    state: RunState,
}

impl CycleTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from storage. A cycle start outside the recency window (or in
    /// the future) is dropped and the tracker starts inactive.
    pub fn restore(persisted: &PersistedRunState, now: DateTime<Utc>) -> Self {
        let mut state = RunState {
            last_equipment_status: persisted.last_equipment_status,
            last_active_mode: persisted.last_active_mode,
            ..Default::default()
        };

        match persisted.active_since {
            Some(since) if persisted.is_active => {
                let age = now - since;
                if age >= TimeDelta::zero() && age <= TimeDelta::seconds(RESTORE_WINDOW_SECS) {
                    debug!(active_since = %since, "resuming persisted cycle");
                    state.active_since = Some(since);
                    state.is_active = true;
                } else {
                    debug!(active_since = %since, "discarding stale persisted cycle");
                }
            }
            _ => {}
        }
        Self { state }
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn is_cycle_active(&self) -> bool {
        self.state.is_active
    }

    /// Seed from the entity's state at startup without emitting a boundary.
    /// A cycle already running is assumed to have started now.
    pub fn prime(&mut self, climate: &ClimateState, now: DateTime<Utc>) {
        if !self.state.is_active && is_active(climate) {
            self.state.is_active = true;
            self.state.active_since = Some(now);
            self.state.last_equipment_status = classify(climate);
        }
        self.state.last_action = climate.hvac_action().map(str::to_string);
    }

    pub fn observe(&mut self, climate: &ClimateState, now: DateTime<Utc>) -> Observation {
        let status = classify(climate);
        let active = is_active(climate);
        let previous_status = self.state.last_equipment_status;

        let (event_type, completed) = match (self.state.is_active, active) {
            (false, true) => {
                self.state.active_since = Some(now);
                debug!(
                    action = climate.hvac_action(),
                    fan_mode = climate.fan_mode(),
                    status = %status,
                    "cycle start"
                );
                (EventType::ModeChange, None)
            }
            (true, false) => {
                let start = self.state.active_since.take();
                let runtime_seconds = start.map(|s| clamp_runtime(s, now)).unwrap_or(0);
                debug!(runtime_seconds, status = %status, "cycle end");
                let cycle = CompletedCycle {
                    start,
                    end: now,
                    runtime_seconds,
                };
                (EventType::ModeChange, Some(cycle))
            }
            _ => (EventType::TelemetryUpdate, None),
        };

        if let Some(mode) = status.active_mode() {
            self.state.last_active_mode = Some(mode);
        }
        self.state.last_action = climate.hvac_action().map(str::to_string);
        self.state.is_active = active;
        self.state.last_equipment_status = status;

        Observation {
            event_type,
            equipment_status: status,
            previous_status,
            is_active: active,
            last_active_mode: self.state.last_active_mode,
            completed,
        }
    }

    /// Describe `climate` without advancing the tracker (manual sends).
    pub fn peek(&self, climate: &ClimateState) -> Observation {
        let status = classify(climate);
        Observation {
            event_type: EventType::TelemetryUpdate,
            equipment_status: status,
            previous_status: self.state.last_equipment_status,
            is_active: is_active(climate),
            last_active_mode: status.active_mode().or(self.state.last_active_mode),
            completed: None,
        }
    }

    /// `Mode_Change` always posts; a `Telemetry_Update` repeating the last
    /// posted status within the debounce window does not.
    pub fn should_post(&self, obs: &Observation, now: DateTime<Utc>) -> bool {
        if obs.event_type == EventType::ModeChange {
            return true;
        }
        let repeat = self.state.last_post_status == Some(obs.equipment_status);
        let recent = self
            .state
            .last_post_time
            .is_some_and(|t| now - t < TimeDelta::milliseconds(DEBOUNCE_MILLIS));
        !(repeat && recent)
    }

    pub fn record_post(&mut self, status: EquipmentStatus, now: DateTime<Utc>) {
        self.state.last_post_time = Some(now);
        self.state.last_post_status = Some(status);
    }

    pub fn snapshot(&self) -> PersistedRunState {
        PersistedRunState {
            version: RUN_STATE_VERSION,
            active_since: self.state.active_since,
            is_active: self.state.is_active,
            last_equipment_status: self.state.last_equipment_status,
            last_active_mode: self.state.last_active_mode,
        }
    }
}
