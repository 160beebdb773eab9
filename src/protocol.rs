use serde_json::{Map, Value, json};

/// Longest body excerpt written to logs or error messages.
pub const EXCERPT_LEN: usize = 500;

/// Alternate key names the backend has used for login fields.
pub const ACCESS_TOKEN_KEYS: &[&str] = &["access_token", "token", "id_token"];
pub const REFRESH_TOKEN_KEYS: &[&str] = &["refresh_token", "rtoken"];
pub const USER_ID_KEYS: &[&str] = &["user_id", "uid"];
pub const HVAC_ID_KEYS: &[&str] = &["hvac_id", "primary_hvac_id"];
const HVAC_OBJECT_ID_KEYS: &[&str] = &["id", "uid", "hvac_uid", "hvac_id"];
const INGEST_TOKEN_KEYS: &[&str] = &["ingest_token", "token", "access_token"];
const INGEST_EXPIRY_KEYS: &[&str] = &["ingest_expires_at", "expires_at"];

pub fn excerpt(text: &str) -> &str {
    match text.char_indices().nth(EXCERPT_LEN) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// The backend wraps most bodies as `{"response": {...}}`.
pub fn unwrap_response(data: &Value) -> &Value {
    match data.get("response") {
        Some(inner) if inner.is_object() => inner,
        _ => data,
    }
}

pub fn parse_body(text: &str) -> Option<Value> {
    if text.trim().is_empty() {
        return Some(Value::Object(Map::new()));
    }
    serde_json::from_str(text).ok()
}

/// First present, non-null value among `keys`.
pub fn pick<'a>(obj: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| obj.get(*k).filter(|v| !v.is_null()))
}

pub fn pick_str(obj: &Value, keys: &[&str]) -> Option<String> {
    match pick(obj, keys)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Numbers and numeric strings both count.
pub fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn pick_number(obj: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter()
        .find_map(|k| obj.get(*k).and_then(as_number))
}

fn pick_epoch(obj: &Value, keys: &[&str]) -> Option<i64> {
    pick_number(obj, keys).map(|v| v as i64)
}

/// Detect an HTTP 2xx whose JSON body still encodes an auth failure.
pub fn is_soft_unauthorized(text: &str) -> bool {
    let Ok(data) = serde_json::from_str::<Value>(text) else {
        return false;
    };
    let body = unwrap_response(&data);
    has_invalid_token(body) || body.get("body").is_some_and(has_invalid_token)
}

fn has_invalid_token(x: &Value) -> bool {
    if !x.is_object() {
        return false;
    }
    let status = x
        .get("status")
        .and_then(as_number)
        .or_else(|| x.get("status_code").and_then(as_number));
    if status == Some(401.0) {
        return true;
    }
    let err = x.get("error").map(value_text).unwrap_or_default().to_lowercase();
    let msg = x.get("message").map(value_text).unwrap_or_default().to_lowercase();
    err.contains("invalid_token") || (msg.contains("access token") && msg.contains("invalid"))
}

fn value_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// HVAC ids sometimes arrive as lists or stringified lists.
pub fn normalize_hvac_id(val: &Value) -> Option<String> {
    match val {
        Value::Null => None,
        Value::Array(items) => items.first().and_then(normalize_hvac_id),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => normalize_hvac_str(s),
        _ => None,
    }
}

fn normalize_hvac_str(s: &str) -> Option<String> {
    let s = s.trim();
    if s.starts_with('[') && s.ends_with(']') {
        let candidate = if s.contains('\'') && !s.contains('"') {
            s.replace('\'', "\"")
        } else {
            s.to_string()
        };
        if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(&candidate) {
            return items.first().and_then(normalize_hvac_id);
        }
        let stripped = s.trim_matches(|c| c == '[' || c == ']').trim();
        let stripped = stripped.trim_matches(|c| c == '\'' || c == '"');
        return (!stripped.is_empty()).then(|| stripped.to_string());
    }
    (!s.is_empty()).then(|| s.to_string())
}

/// Access/refresh pair returned by the login, refresh and OAuth endpoints.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<i64>,
}

/// Parse a token body; `expires_in` is converted relative to `now`.
pub fn parse_token_grant(body: &Value, now: i64) -> Option<TokenGrant> {
    let access_token = pick_str(body, ACCESS_TOKEN_KEYS)?;
    let expires_at = pick_epoch(body, &["expires_at"])
        .or_else(|| pick_epoch(body, &["expires_in"]).map(|secs| now + secs));
    Some(TokenGrant {
        access_token,
        refresh_token: pick_str(body, REFRESH_TOKEN_KEYS),
        expires_at,
    })
}

pub fn parse_ingest_grant(body: &Value, now: i64) -> Option<TokenGrant> {
    let access_token = pick_str(body, INGEST_TOKEN_KEYS)?;
    let expires_at = pick_epoch(body, INGEST_EXPIRY_KEYS)
        .or_else(|| pick_epoch(body, &["expires_in"]).map(|secs| now + secs))?;
    Some(TokenGrant {
        access_token,
        refresh_token: None,
        expires_at: Some(expires_at),
    })
}

/// A selectable HVAC offered after login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HvacChoice {
    pub id: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoginResponse {
    pub grant: TokenGrant,
    pub user_id: String,
    pub hvac_id: Option<String>,
    pub choices: Vec<HvacChoice>,
}

pub fn parse_login_response(body: &Value, now: i64) -> Option<LoginResponse> {
    let grant = parse_token_grant(body, now)?;
    let user_id = pick_str(body, USER_ID_KEYS)?;
    let hvac_id = pick(body, HVAC_ID_KEYS).and_then(normalize_hvac_id);

    let mut choices: Vec<HvacChoice> = Vec::new();
    if let Some(Value::Array(hvacs)) = body.get("hvacs") {
        for item in hvacs.iter().filter(|v| v.is_object()) {
            let Some(id) = pick_str(item, HVAC_OBJECT_ID_KEYS) else {
                continue;
            };
            let name = pick_str(item, &["name"]).unwrap_or_else(|| id.clone());
            choices.push(HvacChoice {
                label: format!("{name} ({id})"),
                id,
            });
        }
    }
    if let Some(Value::Array(ids)) = body.get("hvac_ids") {
        for id in ids.iter().filter_map(normalize_hvac_id) {
            if !choices.iter().any(|c| c.id == id) {
                choices.push(HvacChoice { label: id.clone(), id });
            }
        }
    }

    Some(LoginResponse {
        grant,
        user_id,
        hvac_id,
        choices,
    })
}

pub fn login_body(email: &str, password: &str) -> Value {
    json!({ "email": email, "password": password })
}

pub fn refresh_body(refresh_token: &str) -> Value {
    json!({ "refresh_token": refresh_token })
}

pub fn identity_body(user_id: &str, hvac_id: &str) -> Value {
    json!({ "user_id": user_id, "hvac_id": hvac_id })
}

pub fn status_body(user_id: &str, hvac_id: &str, hvac_uid: &str) -> Value {
    json!({ "user_id": user_id, "hvac_id": hvac_id, "hvac_uid": hvac_uid })
}

/// Object id from a resolver reply, top level or under `response`.
pub fn parse_resolver_obj_id(data: &Value) -> Option<String> {
    pick_str(data, &["obj_id"]).or_else(|| pick_str(unwrap_response(data), &["obj_id"]))
}
