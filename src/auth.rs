//! Token bookkeeping for the primary backend and the secondary ingest backend.
//!
//! Tokens are checked before every outbound call and refreshed on demand.
//! A failed refresh keeps the previous token; callers carry on with it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tracing::{debug, error, warn};

use crate::client::SfpClient;
use crate::config::EntryConfig;
use crate::host::ConfigEntries;
use crate::protocol::{TokenGrant, identity_body};
use crate::{Error, Result};

/// Primary tokens are refreshed this long before they expire.
pub const PRIMARY_SKEW_SECS: i64 = 300;

/// Ingest tokens are short-lived; smaller margin.
pub const SECONDARY_SKEW_SECS: i64 = 60;

/// A token with no expiry is treated as long-lived.
pub fn is_fresh(expires_at: Option<i64>, now: i64, skew: i64) -> bool {
    match expires_at {
        None => true,
        Some(exp) => now < exp - skew,
    }
}

fn unix_now() -> i64 {
    Utc::now().timestamp()
}

pub struct Auth {
    client: SfpClient,
    entry_id: String,
    config: Mutex<EntryConfig>,
    entries: Arc<dyn ConfigEntries>,
}

impl Auth {
    pub fn new(
        client: SfpClient,
        entry_id: impl Into<String>,
        config: EntryConfig,
        entries: Arc<dyn ConfigEntries>,
    ) -> Self {
        Self {
            client,
            entry_id: entry_id.into(),
            config: Mutex::new(config),
            entries,
        }
    }

    fn lock(&self) -> MutexGuard<'_, EntryConfig> {
        self.config.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the current config record, tokens included.
    pub fn config(&self) -> EntryConfig {
        self.lock().clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.lock().access_token.clone()
    }

    pub fn ingest_token(&self) -> Option<String> {
        self.lock().ingest_token.clone()
    }

    /// Return the primary token, refreshing first if it is near expiry.
    pub async fn ensure_valid(&self) -> Option<String> {
        let expires_at = self.lock().expires_at;
        if !is_fresh(expires_at, unix_now(), PRIMARY_SKEW_SECS) {
            if let Err(e) = self.refresh().await {
                error!(error = %e, "access token refresh failed; using existing token");
            }
        }
        let token = self.access_token();
        match &token {
            Some(t) => debug!(len = t.len(), "using access token"),
            None => warn!("no access token available; request will be unauthenticated"),
        }
        token
    }

    /// Refresh the primary token unconditionally.
    pub async fn refresh(&self) -> Result<()> {
        let (url, refresh_token) = {
            let cfg = self.lock();
            (cfg.url(&cfg.refresh_path), cfg.refresh_token.clone())
        };
        let Some(refresh_token) = refresh_token else {
            warn!("no refresh token; cannot refresh");
            return Err(Error::MissingConfig("refresh_token"));
        };
        let grant = self.client.refresh(&url, &refresh_token).await?;
        self.apply_primary(grant);
        Ok(())
    }

    fn apply_primary(&self, grant: TokenGrant) {
        let snapshot = {
            let mut cfg = self.lock();
            cfg.access_token = Some(grant.access_token);
            if grant.refresh_token.is_some() {
                cfg.refresh_token = grant.refresh_token;
            }
            cfg.expires_at = grant.expires_at;
            cfg.clone()
        };
        debug!(expires_at = snapshot.expires_at, "access token refreshed");
        self.entries.update_entry(&self.entry_id, &snapshot);
    }

    /// Return the ingest token, minting a new one when missing or stale.
    pub async fn ensure_ingest_token(&self) -> Option<String> {
        let (token, expires_at) = {
            let cfg = self.lock();
            (cfg.ingest_token.clone(), cfg.ingest_expires_at)
        };
        if token.is_some() && is_fresh(expires_at, unix_now(), SECONDARY_SKEW_SECS) {
            return token;
        }
        if let Err(e) = self.issue_ingest_token().await {
            error!(error = %e, "ingest token issuance failed; using existing token");
        }
        self.ingest_token()
    }

    /// Mint an ingest token with a validated primary token.
    pub async fn issue_ingest_token(&self) -> Result<()> {
        let primary = self
            .ensure_valid()
            .await
            .ok_or(Error::MissingConfig("access_token"))?;
        let (url, identity) = {
            let cfg = self.lock();
            (cfg.url(&cfg.ingest_token_path), identity_body(&cfg.user_id, cfg.hvac_uid()))
        };
        let grant = self.client.issue_ingest_token(&url, &primary, &identity).await?;
        let snapshot = {
            let mut cfg = self.lock();
            cfg.ingest_token = Some(grant.access_token);
            cfg.ingest_expires_at = grant.expires_at;
            cfg.clone()
        };
        debug!(expires_at = snapshot.ingest_expires_at, "ingest token issued");
        self.entries.update_entry(&self.entry_id, &snapshot);
        Ok(())
    }

    /// Token for the telemetry endpoint, from whichever domain serves it.
    pub async fn telemetry_token(&self) -> Option<String> {
        let ingest = self.lock().uses_ingest_backend();
        if ingest {
            self.ensure_ingest_token().await
        } else {
            self.ensure_valid().await
        }
    }

    /// Forced refresh after a rejected telemetry post.
    pub async fn force_telemetry_refresh(&self) -> Option<String> {
        let ingest = self.lock().uses_ingest_backend();
        if ingest {
            if let Err(e) = self.issue_ingest_token().await {
                error!(error = %e, "forced ingest token refresh failed");
            }
            self.ingest_token()
        } else {
            if let Err(e) = self.refresh().await {
                error!(error = %e, "forced access token refresh failed");
            }
            self.access_token()
        }
    }

    /// Replace the whole record, e.g. after an options change.
    pub fn replace_config(&self, config: EntryConfig) {
        *self.lock() = config;
    }
}
