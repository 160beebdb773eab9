use std::time::Duration;

use reqwest::header::{ACCEPT, CACHE_CONTROL};
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::protocol::{
    LoginResponse, TokenGrant, excerpt, is_soft_unauthorized, login_body, parse_body,
    parse_ingest_grant, parse_login_response, parse_resolver_obj_id, parse_token_grant,
    refresh_body, unwrap_response,
};
use crate::{Error, Result};

const DEFAULT_TIMEOUT_SECS: u64 = 20;
const DEFAULT_USER_AGENT: &str = concat!("sfp-bridge/", env!("CARGO_PKG_VERSION"));

pub struct SfpClientBuilder {
    timeout: Duration,
    user_agent: String,
}

impl Default for SfpClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SfpClientBuilder {
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = ua.into();
        self
    }

    pub fn build(self) -> Result<SfpClient> {
        let http = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(self.user_agent)
            .build()?;
        Ok(SfpClient { http })
    }
}

/// HTTP transport for every backend endpoint. URLs are passed in fully formed.
#[derive(Clone)]
pub struct SfpClient {
    http: reqwest::Client,
}

fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

impl SfpClient {
    pub fn builder() -> SfpClientBuilder {
        SfpClientBuilder::new()
    }

    async fn post_raw(&self, url: &str, token: Option<&str>, body: &Value) -> Result<(u16, String)> {
        let mut req = self
            .http
            .post(url)
            .header(ACCEPT, "application/json")
            .header(CACHE_CONTROL, "no-cache")
            .json(body);
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        let resp = req.send().await?;
        let status = resp.status().as_u16();
        let text = resp.text().await?;
        Ok((status, text))
    }

    /// POST and decode a JSON object, unwrapping the `response` envelope.
    async fn post_json(&self, url: &str, token: Option<&str>, body: &Value) -> Result<Value> {
        let (status, text) = self.post_raw(url, token, body).await?;
        if status == 401 {
            return Err(Error::Unauthorized);
        }
        if status >= 400 {
            return Err(Error::Status {
                status,
                body: excerpt(&text).to_string(),
            });
        }
        let data = parse_body(&text)
            .ok_or_else(|| Error::Protocol(format!("non-JSON body: {}", excerpt(&text))))?;
        Ok(unwrap_response(&data).clone())
    }

    pub async fn login(&self, url: &str, email: &str, password: &str) -> Result<LoginResponse> {
        debug!(url = %url, "password login");
        let body = self.post_json(url, None, &login_body(email, password)).await?;
        parse_login_response(&body, unix_now()).ok_or_else(|| {
            Error::Protocol("login response missing access_token/user_id".to_string())
        })
    }

    /// Exchange a refresh token. A missing new refresh token keeps the old one.
    pub async fn refresh(&self, url: &str, refresh_token: &str) -> Result<TokenGrant> {
        debug!(url = %url, "refreshing access token");
        let body = self.post_json(url, None, &refresh_body(refresh_token)).await?;
        let mut grant = parse_token_grant(&body, unix_now())
            .filter(|g| g.expires_at.is_some())
            .ok_or_else(|| {
                Error::Protocol("refresh response missing access_token/expires_at".to_string())
            })?;
        if grant.refresh_token.is_none() {
            grant.refresh_token = Some(refresh_token.to_string());
        }
        Ok(grant)
    }

    /// Mint a short-lived ingest token by presenting the primary token.
    pub async fn issue_ingest_token(
        &self,
        url: &str,
        primary_token: &str,
        identity: &Value,
    ) -> Result<TokenGrant> {
        debug!(url = %url, "issuing ingest token");
        let body = self.post_json(url, Some(primary_token), identity).await?;
        parse_ingest_grant(&body, unix_now()).ok_or_else(|| {
            Error::Protocol("ingest token response missing token/expiry".to_string())
        })
    }

    /// Resolve the backend object id for a device.
    pub async fn resolve(&self, url: &str, token: Option<&str>, identity: &Value) -> Result<Option<String>> {
        let (status, text) = self.post_raw(url, token, identity).await?;
        if status >= 400 {
            error!(url = %url, status, body = excerpt(&text), "resolver failed");
            return Err(Error::Status {
                status,
                body: excerpt(&text).to_string(),
            });
        }
        let data = parse_body(&text)
            .ok_or_else(|| Error::Protocol(format!("resolver non-JSON: {}", excerpt(&text))))?;
        Ok(parse_resolver_obj_id(&data))
    }

    /// Post one telemetry body. Hard and soft 401s map to [`Error::Unauthorized`].
    pub async fn post_telemetry(&self, url: &str, token: Option<&str>, body: &Value) -> Result<()> {
        let (status, text) = self.post_raw(url, token, body).await?;
        if status == 401 || is_soft_unauthorized(&text) {
            warn!(url = %url, status, soft = status != 401, "telemetry unauthorized");
            return Err(Error::Unauthorized);
        }
        if status >= 400 {
            return Err(Error::Status {
                status,
                body: excerpt(&text).to_string(),
            });
        }
        debug!(status, body = excerpt(&text), "telemetry accepted");
        Ok(())
    }

    pub async fn fetch_status(&self, url: &str, token: Option<&str>, body: &Value) -> Result<Value> {
        let data = self.post_json(url, token, body).await?;
        if !data.is_object() {
            return Err(Error::Protocol(format!("unexpected status shape: {data}")));
        }
        Ok(data)
    }

    pub async fn reset(&self, url: &str, token: Option<&str>, identity: &Value) -> Result<()> {
        let (status, text) = self.post_raw(url, token, identity).await?;
        if status >= 400 {
            return Err(Error::Status {
                status,
                body: excerpt(&text).to_string(),
            });
        }
        debug!(body = excerpt(&text), "reset accepted");
        Ok(())
    }

    /// Optional OAuth userinfo lookup used to prefill the user id.
    pub async fn userinfo(&self, url: &str, token: &str) -> Result<Option<String>> {
        let resp = self.http.get(url).bearer_auth(token).send().await?;
        if !resp.status().is_success() {
            return Ok(None);
        }
        let info: Value = resp.json().await?;
        Ok(crate::protocol::pick_str(&info, &["user_id", "sub"]))
    }
}
