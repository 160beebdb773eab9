//! Interactive setup and options flows.
//!
//! Password path: `user` → `hvac` (only when ambiguous) → `climate`.
//! OAuth path: `oauth_linked` → `link` → `select_entity`.
//! Every step returns either another form or the finished entry.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, error};

use crate::Error;
use crate::client::SfpClient;
use crate::config::{
    DEFAULT_API_BASE, DEFAULT_DATA_OBJ_BASE, DEFAULT_LOGIN_PATH, DEFAULT_POST_PATH,
    DEFAULT_REFRESH_PATH, DEFAULT_RESET_PATH, DEFAULT_RESOLVER_PATH, EntryConfig, join_url,
};
use crate::host::{ConfigEntries, StateRegistry};
use crate::protocol::{HvacChoice, TokenGrant, identity_body, normalize_hvac_id};

pub type FormErrors = BTreeMap<&'static str, &'static str>;

#[derive(Debug, Clone, PartialEq)]
pub enum FlowResult {
    Form {
        step_id: &'static str,
        errors: FormErrors,
        /// `(value, label)` pairs when the step is a selection.
        choices: Vec<(String, String)>,
        defaults: BTreeMap<&'static str, String>,
    },
    CreateEntry {
        title: String,
        data: EntryConfig,
    },
}

impl FlowResult {
    fn form(step_id: &'static str) -> Self {
        FlowResult::Form {
            step_id,
            errors: FormErrors::new(),
            choices: Vec::new(),
            defaults: BTreeMap::new(),
        }
    }

    fn form_with_error(step_id: &'static str, field: &'static str, code: &'static str) -> Self {
        let mut errors = FormErrors::new();
        errors.insert(field, code);
        FlowResult::Form {
            step_id,
            errors,
            choices: Vec::new(),
            defaults: BTreeMap::new(),
        }
    }

    fn selection(step_id: &'static str, choices: Vec<(String, String)>) -> Self {
        FlowResult::Form {
            step_id,
            errors: FormErrors::new(),
            choices,
            defaults: BTreeMap::new(),
        }
    }

    pub fn step_id(&self) -> Option<&'static str> {
        match self {
            FlowResult::Form { step_id, .. } => Some(*step_id),
            FlowResult::CreateEntry { .. } => None,
        }
    }
}

/// Fields of the password login form. Empty paths fall back to defaults.
#[derive(Debug, Clone, Default)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
    pub api_base: Option<String>,
    pub login_path: Option<String>,
    pub post_path: Option<String>,
    pub resolver_path: Option<String>,
    pub reset_path: Option<String>,
    pub refresh_path: Option<String>,
    pub status_url: Option<String>,
}

impl LoginInput {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            ..Default::default()
        }
    }
}

/// Fields of the post-OAuth linking form.
#[derive(Debug, Clone, Default)]
pub struct LinkInput {
    pub user_id: String,
    pub hvac_id: String,
    pub api_base: Option<String>,
    pub post_path: Option<String>,
    pub resolver_path: Option<String>,
    pub reset_path: Option<String>,
}

fn path_or(value: Option<&str>, default: &str) -> String {
    match value.map(|v| v.trim().trim_matches('/')) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => default.to_string(),
    }
}

fn base_or_default(value: Option<&str>) -> String {
    match value.map(|v| v.trim().trim_end_matches('/')) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => DEFAULT_API_BASE.trim_end_matches('/').to_string(),
    }
}

pub struct ConfigFlow {
    client: SfpClient,
    registry: Arc<dyn StateRegistry>,
    pending: Option<EntryConfig>,
    hvac_choices: Vec<HvacChoice>,
}

impl ConfigFlow {
    pub fn new(client: SfpClient, registry: Arc<dyn StateRegistry>) -> Self {
        Self {
            client,
            registry,
            pending: None,
            hvac_choices: Vec::new(),
        }
    }

    /// Config record accumulated so far.
    pub fn pending(&self) -> Option<&EntryConfig> {
        self.pending.as_ref()
    }

    pub async fn step_user(&mut self, input: Option<LoginInput>) -> FlowResult {
        let Some(input) = input else {
            return FlowResult::form("user");
        };

        let mut cfg = EntryConfig {
            email: Some(input.email.trim().to_string()),
            api_base: base_or_default(input.api_base.as_deref()),
            login_path: path_or(input.login_path.as_deref(), DEFAULT_LOGIN_PATH),
            post_path: path_or(input.post_path.as_deref(), DEFAULT_POST_PATH),
            resolver_path: path_or(input.resolver_path.as_deref(), DEFAULT_RESOLVER_PATH),
            reset_path: path_or(input.reset_path.as_deref(), DEFAULT_RESET_PATH),
            refresh_path: path_or(input.refresh_path.as_deref(), DEFAULT_REFRESH_PATH),
            status_url: input
                .status_url
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            ..Default::default()
        };

        let login_url = cfg.url(&cfg.login_path);
        let login = match self.client.login(&login_url, input.email.trim(), &input.password).await {
            Ok(login) => login,
            Err(e @ (Error::Protocol(_) | Error::Json(_))) => {
                error!(url = %login_url, error = %e, "login response unusable");
                return FlowResult::form_with_error("user", "base", "unknown");
            }
            Err(e) => {
                error!(url = %login_url, error = %e, "login failed");
                return FlowResult::form_with_error("user", "base", "cannot_connect");
            }
        };

        cfg.user_id = login.user_id;
        cfg.access_token = Some(login.grant.access_token);
        cfg.refresh_token = login.grant.refresh_token;
        cfg.expires_at = login.grant.expires_at;
        self.pending = Some(cfg);

        if login.hvac_id.is_some() {
            return self.resolve_and_prepare(login.hvac_id).await;
        }
        if let [only] = login.choices.as_slice() {
            let id = only.id.clone();
            return self.resolve_and_prepare(Some(id)).await;
        }
        if login.choices.is_empty() {
            // Backend can infer the HVAC from the token.
            return self.resolve_and_prepare(None).await;
        }

        self.hvac_choices = login.choices;
        self.hvac_form()
    }

    fn hvac_form(&self) -> FlowResult {
        let choices = self
            .hvac_choices
            .iter()
            .map(|c| (c.id.clone(), c.label.clone()))
            .collect();
        FlowResult::selection("hvac", choices)
    }

    pub async fn step_hvac(&mut self, hvac_id: Option<String>) -> FlowResult {
        let Some(raw) = hvac_id else {
            return self.hvac_form();
        };
        let hvac_id = normalize_hvac_id(&serde_json::Value::String(raw));
        let known = hvac_id
            .as_ref()
            .is_some_and(|id| self.hvac_choices.is_empty() || self.hvac_choices.iter().any(|c| &c.id == id));
        if !known {
            return FlowResult::form_with_error("hvac", "hvac_id", "invalid_hvac");
        }
        self.resolve_and_prepare(hvac_id).await
    }

    /// Optional resolver linkage; failures here never block setup.
    async fn resolve_and_prepare(&mut self, hvac_id: Option<String>) -> FlowResult {
        let Some(mut cfg) = self.pending.take() else {
            return FlowResult::form("user");
        };

        if let Some(id) = &hvac_id {
            let url = cfg.url(&cfg.resolver_path);
            let token = cfg.access_token.clone();
            let body = identity_body(&cfg.user_id, id);
            match self.client.resolve(&url, token.as_deref(), &body).await {
                Ok(Some(obj_id)) => cfg.data_obj_url = Some(join_url(DEFAULT_DATA_OBJ_BASE, &obj_id)),
                Ok(None) => {}
                Err(e) => debug!(error = %e, "resolver skipped (non-fatal)"),
            }
        }

        cfg.hvac_id = hvac_id.clone().unwrap_or_default();
        cfg.hvac_uid = hvac_id;
        self.pending = Some(cfg);
        self.step_climate(None)
    }

    /// Pick the climate entity to watch. With no climate entities the entry
    /// is created without one.
    pub fn step_climate(&mut self, entity_id: Option<String>) -> FlowResult {
        let Some(pending) = self.pending.as_ref() else {
            return FlowResult::form("user");
        };
        let entities = self.registry.climate_entities();
        if entities.is_empty() {
            let data = pending.clone();
            return FlowResult::CreateEntry {
                title: data.title(),
                data,
            };
        }
        let Some(entity_id) = entity_id else {
            return FlowResult::selection("climate", entities);
        };
        if !entities.iter().any(|(id, _)| *id == entity_id) {
            return FlowResult::form_with_error("climate", "climate_entity_id", "invalid_entity");
        }
        let mut data = pending.clone();
        data.climate_entity_id = Some(entity_id);
        FlowResult::CreateEntry {
            title: data.title(),
            data,
        }
    }

    /// Entry point after the host finished the OAuth code exchange.
    pub async fn step_oauth_linked(&mut self, grant: TokenGrant, userinfo_url: Option<&str>) -> FlowResult {
        let mut defaults = BTreeMap::new();
        if let Some(url) = userinfo_url {
            match self.client.userinfo(url, &grant.access_token).await {
                Ok(Some(uid)) => {
                    defaults.insert("user_id", uid);
                }
                Ok(None) => {}
                Err(e) => debug!(error = %e, "userinfo fetch failed (optional)"),
            }
        }
        self.pending = Some(EntryConfig {
            access_token: Some(grant.access_token),
            refresh_token: grant.refresh_token,
            expires_at: grant.expires_at,
            ..Default::default()
        });
        FlowResult::Form {
            step_id: "link",
            errors: FormErrors::new(),
            choices: Vec::new(),
            defaults,
        }
    }

    /// Bind user/HVAC ids after OAuth. Here the resolver must yield an object id.
    pub async fn step_link(&mut self, input: LinkInput) -> FlowResult {
        let Some(mut cfg) = self.pending.clone() else {
            return FlowResult::form("user");
        };

        let user_id = input.user_id.trim().to_string();
        let hvac_id = input.hvac_id.trim().to_string();
        let mut errors = FormErrors::new();
        if user_id.is_empty() {
            errors.insert("user_id", "required");
        }
        if hvac_id.is_empty() {
            errors.insert("hvac_id", "required");
        }
        if !errors.is_empty() {
            return FlowResult::Form {
                step_id: "link",
                errors,
                choices: Vec::new(),
                defaults: BTreeMap::new(),
            };
        }

        cfg.user_id = user_id;
        cfg.hvac_uid = Some(hvac_id.clone());
        cfg.hvac_id = hvac_id;
        cfg.api_base = base_or_default(input.api_base.as_deref());
        cfg.post_path = path_or(input.post_path.as_deref(), DEFAULT_POST_PATH);
        cfg.resolver_path = path_or(input.resolver_path.as_deref(), DEFAULT_RESOLVER_PATH);
        cfg.reset_path = path_or(input.reset_path.as_deref(), DEFAULT_RESET_PATH);

        let url = cfg.url(&cfg.resolver_path);
        let token = cfg.access_token.clone();
        let body = identity_body(&cfg.user_id, &cfg.hvac_id);
        match self.client.resolve(&url, token.as_deref(), &body).await {
            Ok(Some(obj_id)) => {
                cfg.data_obj_url = Some(join_url(DEFAULT_DATA_OBJ_BASE, &obj_id));
            }
            Ok(None) => {
                error!(url = %url, "resolver response missing obj_id");
                return FlowResult::form_with_error("link", "base", "not_found");
            }
            Err(e) => {
                error!(url = %url, error = %e, "resolver call failed");
                return FlowResult::form_with_error("link", "base", "cannot_connect");
            }
        }

        self.pending = Some(cfg);
        self.step_select_entity(None)
    }

    /// OAuth path entity choice; unlike `climate`, an entity is required.
    pub fn step_select_entity(&mut self, entity_id: Option<String>) -> FlowResult {
        let Some(pending) = self.pending.as_ref() else {
            return FlowResult::form("user");
        };
        let entities = self.registry.climate_entities();
        if entities.is_empty() {
            return FlowResult::form_with_error("select_entity", "base", "no_climate");
        }
        let Some(entity_id) = entity_id else {
            return FlowResult::selection("select_entity", entities);
        };
        if !entities.iter().any(|(id, _)| *id == entity_id) {
            return FlowResult::form_with_error("select_entity", "climate_entity_id", "invalid_entity");
        }
        let mut data = pending.clone();
        data.climate_entity_id = Some(entity_id);
        FlowResult::CreateEntry {
            title: "SmartFilterPro".to_string(),
            data,
        }
    }
}

/// Rebind an existing entry to a different climate entity.
pub struct OptionsFlow {
    entry_id: String,
    config: EntryConfig,
    registry: Arc<dyn StateRegistry>,
    entries: Arc<dyn ConfigEntries>,
}

impl OptionsFlow {
    pub fn new(
        entry_id: impl Into<String>,
        config: EntryConfig,
        registry: Arc<dyn StateRegistry>,
        entries: Arc<dyn ConfigEntries>,
    ) -> Self {
        Self {
            entry_id: entry_id.into(),
            config,
            registry,
            entries,
        }
    }

    pub fn step_init(&mut self, entity_id: Option<String>) -> FlowResult {
        let entities = self.registry.climate_entities();
        let Some(entity_id) = entity_id else {
            let mut defaults = BTreeMap::new();
            if let Some(current) = &self.config.climate_entity_id {
                defaults.insert("climate_entity_id", current.clone());
            }
            return FlowResult::Form {
                step_id: "init",
                errors: FormErrors::new(),
                choices: entities,
                defaults,
            };
        };
        if !entities.is_empty() && !entities.iter().any(|(id, _)| *id == entity_id) {
            return FlowResult::form_with_error("init", "climate_entity_id", "invalid_entity");
        }
        self.config.climate_entity_id = Some(entity_id);
        self.entries.update_entry(&self.entry_id, &self.config);
        FlowResult::CreateEntry {
            title: String::new(),
            data: self.config.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_fall_back_to_defaults() {
        assert_eq!(path_or(None, "x"), "x");
        assert_eq!(path_or(Some("  "), "x"), "x");
        assert_eq!(path_or(Some("/custom/"), "x"), "custom");
        assert_eq!(base_or_default(Some("https://a.b/wf/")), "https://a.b/wf");
        assert!(!base_or_default(None).ends_with('/'));
    }
}
