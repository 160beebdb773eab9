use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error};

use crate::auth::Auth;
use crate::client::SfpClient;
use crate::protocol::identity_body;
use crate::scheduler::RefreshTrigger;
use crate::{Error, Result};

/// Second status refresh after a reset, for the backend to settle.
pub const FOLLOWUP_DELAY: Duration = Duration::from_secs(3);

/// "Reset filter usage" action.
pub struct ResetCommand {
    client: SfpClient,
    auth: Arc<Auth>,
    refresh: Option<RefreshTrigger>,
    followup_delay: Duration,
}

impl ResetCommand {
    pub fn new(client: SfpClient, auth: Arc<Auth>) -> Self {
        Self {
            client,
            auth,
            refresh: None,
            followup_delay: FOLLOWUP_DELAY,
        }
    }

    /// Status poller to kick after a successful reset.
    pub fn with_refresh(mut self, trigger: RefreshTrigger) -> Self {
        self.refresh = Some(trigger);
        self
    }

    pub fn with_followup_delay(mut self, delay: Duration) -> Self {
        self.followup_delay = delay;
        self
    }

    /// Post the reset. On success the poller refreshes now and once more
    /// after the follow-up delay. The reset call itself is not retried.
    pub async fn press(&self) -> Result<()> {
        let cfg = self.auth.config();
        if cfg.api_base.trim().is_empty() {
            error!("reset aborted: missing api_base");
            return Err(Error::MissingConfig("api_base"));
        }
        if cfg.user_id.is_empty() || cfg.hvac_id.is_empty() {
            error!("reset aborted: missing user_id/hvac_id");
            return Err(Error::MissingConfig("user_id/hvac_id"));
        }

        let token = self.auth.ensure_valid().await;
        let url = cfg.url(&cfg.reset_path);
        let body = identity_body(&cfg.user_id, &cfg.hvac_id);

        if let Err(e) = self.client.reset(&url, token.as_deref(), &body).await {
            error!(url = %url, error = %e, "reset request failed");
            return Err(e);
        }
        debug!("reset accepted; refreshing status");

        if let Some(trigger) = &self.refresh {
            trigger.trigger_now();
            let trigger = trigger.clone();
            let delay = self.followup_delay;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                trigger.trigger_now();
            });
        }
        Ok(())
    }
}
