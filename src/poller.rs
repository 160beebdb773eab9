//! Pull-based filter usage status.
//!
//! Polls on a fixed interval and on demand. A failed poll keeps the last
//! snapshot but marks the poller unavailable until the next success; there
//! is no internal retry.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, error};

use crate::Result;
use crate::auth::Auth;
use crate::client::SfpClient;
use crate::protocol::{pick_number, status_body};
use crate::scheduler::{PeriodicHandle, schedule_periodic};
use crate::types::FilterStatus;

pub const POLL_INTERVAL: Duration = Duration::from_secs(20 * 60);

/// Primary key first; the rest are names the backend has used since.
pub const PERCENT_KEYS: &[&str] = &[
    "percentage used",
    "percentage_used",
    "percent_used",
    "filter_percent_used",
];
pub const TODAY_KEYS: &[&str] = &[
    "2.0.1_Daily Active Time Sum",
    "todays_minutes",
    "minutes_today",
    "daily_active_minutes",
];
pub const TOTAL_KEYS: &[&str] = &[
    "1.0.1_Minutes active",
    "total_minutes",
    "minutes_total",
    "minutes_active",
];

fn round_1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

pub fn parse_status(body: &Value) -> FilterStatus {
    FilterStatus {
        percent_used: pick_number(body, PERCENT_KEYS).map(round_1),
        minutes_today: pick_number(body, TODAY_KEYS),
        minutes_total: pick_number(body, TOTAL_KEYS),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusField {
    PercentUsed,
    MinutesToday,
    MinutesTotal,
}

impl StatusField {
    pub fn value(&self, status: &FilterStatus) -> Option<f64> {
        match self {
            StatusField::PercentUsed => status.percent_used,
            StatusField::MinutesToday => status.minutes_today,
            StatusField::MinutesTotal => status.minutes_total,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorDescription {
    pub unique_id: &'static str,
    pub name: &'static str,
    pub unit: &'static str,
    pub field: StatusField,
}

pub const SENSORS: [SensorDescription; 3] = [
    SensorDescription {
        unique_id: "smartfilterpro_percentage_used",
        name: "SmartFilterPro Percentage Used",
        unit: "%",
        field: StatusField::PercentUsed,
    },
    SensorDescription {
        unique_id: "smartfilterpro_todays_usage",
        name: "SmartFilterPro Today's Usage",
        unit: "min",
        field: StatusField::MinutesToday,
    },
    SensorDescription {
        unique_id: "smartfilterpro_total_minutes",
        name: "SmartFilterPro Total Minutes",
        unit: "min",
        field: StatusField::MinutesTotal,
    },
];

#[derive(Debug, Clone, PartialEq)]
pub struct SensorReading {
    pub description: SensorDescription,
    pub value: Option<f64>,
    pub available: bool,
}

pub struct StatusPoller {
    client: SfpClient,
    auth: Arc<Auth>,
    latest: Mutex<Option<FilterStatus>>,
    available: AtomicBool,
}

impl StatusPoller {
    pub fn new(client: SfpClient, auth: Arc<Auth>) -> Self {
        Self {
            client,
            auth,
            latest: Mutex::new(None),
            available: AtomicBool::new(false),
        }
    }

    /// One poll. The error is returned to the caller after being logged.
    pub async fn refresh(&self) -> Result<FilterStatus> {
        let token = self.auth.ensure_valid().await;
        let cfg = self.auth.config();
        let url = cfg.status_url();
        let body = status_body(&cfg.user_id, &cfg.hvac_id, cfg.hvac_uid());

        match self.client.fetch_status(&url, token.as_deref(), &body).await {
            Ok(data) => {
                let status = parse_status(&data);
                debug!(
                    percent_used = status.percent_used,
                    minutes_today = status.minutes_today,
                    minutes_total = status.minutes_total,
                    "status refreshed"
                );
                *self.latest.lock().unwrap_or_else(PoisonError::into_inner) = Some(status);
                self.available.store(true, Ordering::SeqCst);
                Ok(status)
            }
            Err(e) => {
                error!(url = %url, error = %e, "status fetch failed");
                self.available.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    pub fn latest(&self) -> Option<FilterStatus> {
        *self.latest.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    pub fn sensors(&self) -> Vec<SensorReading> {
        let latest = self.latest();
        let available = self.is_available();
        SENSORS
            .iter()
            .map(|d| SensorReading {
                description: *d,
                value: latest.as_ref().and_then(|s| d.field.value(s)),
                available,
            })
            .collect()
    }

    /// Poll now and then every `interval` until the handle is cancelled.
    pub fn schedule(self: &Arc<Self>, interval: Duration) -> PeriodicHandle {
        let poller = Arc::clone(self);
        schedule_periodic(interval, move || {
            let poller = Arc::clone(&poller);
            async move {
                let _ = poller.refresh().await;
            }
        })
    }
}
