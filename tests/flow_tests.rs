mod common;

use std::sync::Arc;

use common::*;
use serde_json::json;
use sfp_bridge::{ConfigFlow, FlowResult, LinkInput, LoginInput, OptionsFlow, TokenGrant};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn login_input(server: &MockServer) -> LoginInput {
    LoginInput {
        api_base: Some(format!("{}/", server.uri())),
        ..LoginInput::new(" owner@example.com ", "hunter2")
    }
}

fn error_code(result: &FlowResult, field: &str) -> Option<&'static str> {
    match result {
        FlowResult::Form { errors, .. } => errors.get(field).copied(),
        FlowResult::CreateEntry { .. } => None,
    }
}

#[tokio::test]
async fn password_login_with_several_hvacs_asks_for_one() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/ha_password_login"))
        .and(body_partial_json(json!({"email": "owner@example.com", "password": "hunter2"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": {
                "access_token": "tok-a",
                "refresh_token": "refresh-1",
                "expires_in": 3600,
                "user_id": "user-1",
                "hvacs": [
                    {"id": "h-up", "name": "Upstairs"},
                    {"id": "h-down", "name": "Downstairs"}
                ]
            }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/ha_resolve_thermostat_obj"))
        .and(body_partial_json(json!({"user_id": "user-1", "hvac_id": "h-down"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"obj_id": "obj-77"})))
        .expect(1)
        .mount(&server)
        .await;

    let host = MockHost::with_entity(heating(), "Hallway");
    let mut flow = ConfigFlow::new(client(), host.clone());

    let form = flow.step_user(Some(login_input(&server))).await;
    let FlowResult::Form { step_id, choices, .. } = &form else {
        panic!("expected hvac form, got {form:?}");
    };
    assert_eq!(*step_id, "hvac");
    assert_eq!(choices.len(), 2);
    assert_eq!(choices[0], ("h-up".to_string(), "Upstairs (h-up)".to_string()));

    let bad = flow.step_hvac(Some("h-attic".into())).await;
    assert_eq!(error_code(&bad, "hvac_id"), Some("invalid_hvac"));

    let climate = flow.step_hvac(Some("h-down".into())).await;
    assert_eq!(climate.step_id(), Some("climate"));

    let done = flow.step_climate(Some(ENTITY.into()));
    let FlowResult::CreateEntry { title, data } = done else {
        panic!("expected entry");
    };
    assert_eq!(title, "SmartFilterPro (h-down)");
    assert_eq!(data.user_id, "user-1");
    assert_eq!(data.hvac_id, "h-down");
    assert_eq!(data.email.as_deref(), Some("owner@example.com"));
    assert_eq!(data.access_token.as_deref(), Some("tok-a"));
    assert!(data.expires_at.is_some());
    assert_eq!(data.climate_entity_id.as_deref(), Some(ENTITY));
    assert_eq!(data.api_base, server.uri());
    assert!(data.data_obj_url.as_deref().unwrap().ends_with("/obj-77"));
}

#[tokio::test]
async fn single_hvac_skips_selection_and_resolver_failure_is_ignored() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/ha_password_login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token": "tok-a",
            "uid": "user-1",
            "hvac_id": "['h-only']"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/ha_resolve_thermostat_obj"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let host = MockHost::with_entity(idle(), "Hallway");
    let mut flow = ConfigFlow::new(client(), host);
    let form = flow.step_user(Some(login_input(&server))).await;
    assert_eq!(form.step_id(), Some("climate"));

    let pending = flow.pending().expect("pending entry");
    assert_eq!(pending.hvac_id, "h-only");
    assert_eq!(pending.data_obj_url, None);
}

#[tokio::test]
async fn login_rejection_reports_cannot_connect() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/ha_password_login"))
        .respond_with(ResponseTemplate::new(403).set_body_string("bad credentials"))
        .mount(&server)
        .await;

    let mut flow = ConfigFlow::new(client(), Arc::new(MockHost::default()));
    let form = flow.step_user(Some(login_input(&server))).await;
    assert_eq!(form.step_id(), Some("user"));
    assert_eq!(error_code(&form, "base"), Some("cannot_connect"));
}

#[tokio::test]
async fn login_without_token_reports_unknown() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/ha_password_login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"user_id": "user-1"})))
        .mount(&server)
        .await;

    let mut flow = ConfigFlow::new(client(), Arc::new(MockHost::default()));
    let form = flow.step_user(Some(login_input(&server))).await;
    assert_eq!(error_code(&form, "base"), Some("unknown"));
}

#[tokio::test]
async fn no_climate_entities_creates_entry_without_one() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/ha_password_login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "tok-a",
            "user_id": "user-1",
            "hvac_id": "h-1"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/ha_resolve_thermostat_obj"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let mut flow = ConfigFlow::new(client(), Arc::new(MockHost::default()));
    let done = flow.step_user(Some(login_input(&server))).await;
    let FlowResult::CreateEntry { data, .. } = done else {
        panic!("expected entry");
    };
    assert_eq!(data.climate_entity_id, None);
}

fn oauth_grant() -> TokenGrant {
    TokenGrant {
        access_token: "oauth-tok".into(),
        refresh_token: Some("oauth-refresh".into()),
        expires_at: Some(unix_now() + 3600),
    }
}

#[tokio::test]
async fn oauth_link_requires_resolver_object() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/oauth/userinfo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"sub": "user-42"})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/ha_resolve_thermostat_obj"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"response": {}})))
        .mount(&server)
        .await;

    let host = MockHost::with_entity(idle(), "Hallway");
    let mut flow = ConfigFlow::new(client(), host);
    let userinfo = format!("{}/oauth/userinfo", server.uri());
    let form = flow.step_oauth_linked(oauth_grant(), Some(&userinfo)).await;
    let FlowResult::Form { step_id, defaults, .. } = &form else {
        panic!("expected link form");
    };
    assert_eq!(*step_id, "link");
    assert_eq!(defaults.get("user_id").map(String::as_str), Some("user-42"));

    let missing = flow.step_link(LinkInput::default()).await;
    assert_eq!(error_code(&missing, "user_id"), Some("required"));
    assert_eq!(error_code(&missing, "hvac_id"), Some("required"));

    let not_found = flow
        .step_link(LinkInput {
            user_id: "user-42".into(),
            hvac_id: "h-1".into(),
            api_base: Some(server.uri()),
            ..Default::default()
        })
        .await;
    assert_eq!(error_code(&not_found, "base"), Some("not_found"));
}

#[tokio::test]
async fn oauth_link_then_entity_selection_creates_entry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/ha_resolve_thermostat_obj"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"response": {"obj_id": "obj-1"}})))
        .expect(1)
        .mount(&server)
        .await;

    let host = MockHost::with_entity(idle(), "Hallway");
    let mut flow = ConfigFlow::new(client(), host);
    flow.step_oauth_linked(oauth_grant(), None).await;

    let select = flow
        .step_link(LinkInput {
            user_id: "user-42".into(),
            hvac_id: "h-1".into(),
            api_base: Some(server.uri()),
            ..Default::default()
        })
        .await;
    assert_eq!(select.step_id(), Some("select_entity"));

    let FlowResult::CreateEntry { data, .. } = flow.step_select_entity(Some(ENTITY.into())) else {
        panic!("expected entry");
    };
    assert_eq!(data.user_id, "user-42");
    assert_eq!(data.hvac_uid.as_deref(), Some("h-1"));
    assert_eq!(data.access_token.as_deref(), Some("oauth-tok"));
    assert_eq!(data.refresh_token.as_deref(), Some("oauth-refresh"));
    assert_eq!(data.climate_entity_id.as_deref(), Some(ENTITY));
}

#[tokio::test]
async fn oauth_select_entity_requires_a_climate_entity() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/ha_resolve_thermostat_obj"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"obj_id": "obj-1"})))
        .mount(&server)
        .await;

    let mut flow = ConfigFlow::new(client(), Arc::new(MockHost::default()));
    flow.step_oauth_linked(oauth_grant(), None).await;
    let result = flow
        .step_link(LinkInput {
            user_id: "user-42".into(),
            hvac_id: "h-1".into(),
            api_base: Some(server.uri()),
            ..Default::default()
        })
        .await;
    assert_eq!(error_code(&result, "base"), Some("no_climate"));
}

#[test]
fn options_flow_rebinds_entity_and_persists() {
    let host = MockHost::with_entity(idle(), "Hallway");
    host.names
        .lock()
        .unwrap()
        .push(("climate.attic".into(), "Attic".into()));
    let entries = Arc::new(RecordingEntries::default());
    let cfg = sfp_bridge::EntryConfig {
        user_id: "user-1".into(),
        hvac_id: "h-1".into(),
        climate_entity_id: Some(ENTITY.into()),
        ..Default::default()
    };
    let mut options = OptionsFlow::new("entry-1", cfg, host, entries.clone());

    let FlowResult::Form { defaults, choices, .. } = options.step_init(None) else {
        panic!("expected form");
    };
    assert_eq!(defaults.get("climate_entity_id").map(String::as_str), Some(ENTITY));
    assert_eq!(choices.len(), 2);

    let bad = options.step_init(Some("climate.garage".into()));
    assert_eq!(error_code(&bad, "climate_entity_id"), Some("invalid_entity"));

    let done = options.step_init(Some("climate.attic".into()));
    assert!(matches!(done, FlowResult::CreateEntry { .. }));
    let (entry_id, saved) = entries.updates.lock().unwrap().last().cloned().unwrap();
    assert_eq!(entry_id, "entry-1");
    assert_eq!(saved.climate_entity_id.as_deref(), Some("climate.attic"));
    assert_eq!(saved.user_id, "user-1");
}
