//! Remote invalidation push toward partner apps. Best-effort and fire-and-forget: the
//! registry logs a failed notification and moves on to the next app.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::PartnerAppConfig;

use super::types::SessionId;

pub trait InvalidationNotifier: Send + Sync {
    fn notify(&self, partner_app: &str, session_id: &SessionId) -> anyhow::Result<()>;
}

/// Drops every notification. For authorities without partner-side listeners.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

impl InvalidationNotifier for NullNotifier {
    fn notify(&self, _partner_app: &str, _session_id: &SessionId) -> anyhow::Result<()> { Ok(()) }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvalidationPayload {
    pub session_id: SessionId,
}

/// POSTs `{"session_id": ..}` to each partner app's configured invalidation URL on a
/// spawned task. Apps without a URL are reported as delivery failures.
pub struct HttpInvalidationNotifier {
    client: reqwest::Client,
    endpoints: HashMap<String, String>,
}

impl HttpInvalidationNotifier {
    pub fn new(apps: &[PartnerAppConfig], timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let endpoints = apps
            .iter()
            .filter_map(|a| a.invalidation_url.as_ref().map(|u| (a.id.clone(), u.clone())))
            .collect();
        Ok(Self { client, endpoints })
    }

    pub fn endpoint(&self, partner_app: &str) -> Option<&str> {
        self.endpoints.get(partner_app).map(|s| s.as_str())
    }
}

impl InvalidationNotifier for HttpInvalidationNotifier {
    fn notify(&self, partner_app: &str, session_id: &SessionId) -> anyhow::Result<()> {
        let url = self
            .endpoint(partner_app)
            .ok_or_else(|| anyhow!("no invalidation endpoint for partner app '{}'", partner_app))?
            .to_string();
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| anyhow!("no runtime to push invalidation: {}", e))?;
        let client = self.client.clone();
        let body = InvalidationPayload { session_id: session_id.clone() };
        let app = partner_app.to_string();
        handle.spawn(async move {
            match client.post(&url).json(&body).send().await {
                Ok(resp) if resp.status().is_success() => {
                    debug!(target: "ssoward::registry", partner_app = %app, session_id = %body.session_id, "invalidation delivered");
                }
                Ok(resp) => {
                    warn!(target: "ssoward::registry", partner_app = %app, status = %resp.status(), "invalidation rejected");
                }
                Err(e) => {
                    warn!(target: "ssoward::registry", partner_app = %app, "invalidation push failed: {}", e);
                }
            }
        });
        Ok(())
    }
}
