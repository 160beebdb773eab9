//! Per-instance configuration record.
//!
//! The host persists this as a flat key/value map; it is created when the
//! setup flow finishes and rewritten whenever a token is refreshed.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, Result};

pub const DOMAIN: &str = "smartfilterpro";
pub const CONFIG_VERSION: u32 = 2;

pub const DEFAULT_API_BASE: &str =
    "https://smartfilterpro-scaling.bubbleapps.io/version-test/api/1.1/wf/";
pub const DEFAULT_LOGIN_PATH: &str = "ha_password_login";
pub const DEFAULT_POST_PATH: &str = "ha_telemetry";
pub const DEFAULT_RESOLVER_PATH: &str = "ha_resolve_thermostat_obj";
pub const DEFAULT_RESET_PATH: &str = "ha_reset_filter";
pub const DEFAULT_REFRESH_PATH: &str = "ha_refresh_token";
pub const DEFAULT_INGEST_TOKEN_PATH: &str = "ha_issue_ingest_token";
pub const DEFAULT_STATUS_PATH: &str = "ha_filter_status";
pub const DEFAULT_DATA_OBJ_BASE: &str =
    "https://smartfilterpro.com/version-test/api/1.1/obj/thermostats";

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}
fn default_login_path() -> String {
    DEFAULT_LOGIN_PATH.to_string()
}
fn default_post_path() -> String {
    DEFAULT_POST_PATH.to_string()
}
fn default_resolver_path() -> String {
    DEFAULT_RESOLVER_PATH.to_string()
}
fn default_reset_path() -> String {
    DEFAULT_RESET_PATH.to_string()
}
fn default_refresh_path() -> String {
    DEFAULT_REFRESH_PATH.to_string()
}
fn default_ingest_token_path() -> String {
    DEFAULT_INGEST_TOKEN_PATH.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryConfig {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub hvac_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hvac_uid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub climate_entity_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_login_path")]
    pub login_path: String,
    #[serde(default = "default_post_path")]
    pub post_path: String,
    #[serde(default = "default_resolver_path")]
    pub resolver_path: String,
    #[serde(default = "default_reset_path")]
    pub reset_path: String,
    #[serde(default = "default_refresh_path")]
    pub refresh_path: String,
    #[serde(default = "default_ingest_token_path")]
    pub ingest_token_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_obj_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingest_url: Option<String>,
    #[serde(default)]
    pub ingest_batch: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingest_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingest_expires_at: Option<i64>,
}

impl Default for EntryConfig {
    fn default() -> Self {
        Self {
            user_id: String::new(),
            hvac_id: String::new(),
            hvac_uid: None,
            climate_entity_id: None,
            email: None,
            api_base: default_api_base(),
            login_path: default_login_path(),
            post_path: default_post_path(),
            resolver_path: default_resolver_path(),
            reset_path: default_reset_path(),
            refresh_path: default_refresh_path(),
            ingest_token_path: default_ingest_token_path(),
            status_url: None,
            data_obj_url: None,
            ingest_url: None,
            ingest_batch: false,
            access_token: None,
            refresh_token: None,
            expires_at: None,
            ingest_token: None,
            ingest_expires_at: None,
        }
    }
}

/// Join a base URL and a path with exactly one slash. Absolute paths win.
pub fn join_url(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    format!("{}/{}", base.trim_end_matches('/'), path.trim_matches('/'))
}

impl EntryConfig {
    pub fn from_value(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// First missing field that telemetry cannot work without.
    pub fn validate(&self) -> Result<()> {
        if self.api_base.trim().is_empty() {
            return Err(Error::MissingConfig("api_base"));
        }
        if self.post_path.trim().is_empty() {
            return Err(Error::MissingConfig("post_path"));
        }
        if self.user_id.trim().is_empty() {
            return Err(Error::MissingConfig("user_id"));
        }
        if self.hvac_id.trim().is_empty() {
            return Err(Error::MissingConfig("hvac_id"));
        }
        Ok(())
    }

    /// Canonical HVAC identifier sent in request bodies.
    pub fn hvac_uid(&self) -> &str {
        self.hvac_uid.as_deref().unwrap_or(&self.hvac_id)
    }

    pub fn url(&self, path: &str) -> String {
        join_url(&self.api_base, path)
    }

    pub fn telemetry_url(&self) -> String {
        match &self.ingest_url {
            Some(ingest) => ingest.clone(),
            None => self.url(&self.post_path),
        }
    }

    pub fn uses_ingest_backend(&self) -> bool {
        self.ingest_url.is_some()
    }

    pub fn status_url(&self) -> String {
        match &self.status_url {
            Some(url) if !url.trim().is_empty() => self.url(url.trim()),
            _ => self.url(DEFAULT_STATUS_PATH),
        }
    }

    pub fn title(&self) -> String {
        let hvac = if self.hvac_id.is_empty() { "default" } else { &self.hvac_id };
        format!("SmartFilterPro ({hvac})")
    }
}

/// Bring a stored record up to [`CONFIG_VERSION`].
pub fn migrate_entry(version: u32, mut data: Value) -> Result<Value> {
    match version {
        0 | 1 => {
            if let Value::Object(map) = &mut data
                && !map.contains_key("climate_entity_id")
                && let Some(entity) = map.remove("entity_id")
            {
                map.insert("climate_entity_id".to_string(), entity);
            }
            Ok(data)
        }
        CONFIG_VERSION => Ok(data),
        other => Err(Error::UnsupportedVersion(other)),
    }
}
