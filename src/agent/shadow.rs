//! Partner-app side view of one global session.
//!
//! The shadow never mutates global state itself; it asks the authority. Its own mutex is
//! never held across an authority call, since the authority may call back into the agent
//! (remote invalidation) while serving the request.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::debug;

use crate::error::{SsoError, SsoResult};
use crate::session::{DestroyReason, GlobalSession, SessionId, SsoAuthority};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShadowState {
    Unbound,
    Bound(SessionId),
    Destroyed,
}

impl ShadowState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShadowState::Unbound => "unbound",
            ShadowState::Bound(_) => "bound",
            ShadowState::Destroyed => "destroyed",
        }
    }
}

struct Inner {
    state: ShadowState,
    /// A ticket is being redeemed for this shadow.
    binding: bool,
    last_activity: DateTime<Utc>,
}

pub struct LocalSessionShadow {
    local_id: String,
    partner_app: String,
    authority: Arc<dyn SsoAuthority>,
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for LocalSessionShadow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSessionShadow")
            .field("local_id", &self.local_id)
            .field("partner_app", &self.partner_app)
            .field("state", &self.inner.lock().state)
            .finish()
    }
}

impl LocalSessionShadow {
    pub fn new(local_id: impl Into<String>, partner_app: impl Into<String>, authority: Arc<dyn SsoAuthority>) -> Self {
        Self {
            local_id: local_id.into(),
            partner_app: partner_app.into(),
            authority,
            inner: Mutex::new(Inner { state: ShadowState::Unbound, binding: false, last_activity: Utc::now() }),
        }
    }

    pub fn local_id(&self) -> &str { &self.local_id }
    pub fn partner_app(&self) -> &str { &self.partner_app }
    pub fn state(&self) -> ShadowState { self.inner.lock().state.clone() }

    pub fn session_id(&self) -> Option<SessionId> {
        match &self.inner.lock().state {
            ShadowState::Bound(id) => Some(id.clone()),
            _ => None,
        }
    }

    /// Redeem `ticket` at the authority and bind to the returned session. Only valid on an
    /// unbound shadow with no other redemption in flight.
    pub fn adopt_ticket(&self, ticket: &str) -> SsoResult<GlobalSession> {
        {
            let mut inner = self.inner.lock();
            if inner.state != ShadowState::Unbound {
                return Err(SsoError::InvalidShadowState { state: inner.state.as_str() });
            }
            if inner.binding {
                return Err(SsoError::InvalidShadowState { state: "binding" });
            }
            inner.binding = true;
        }

        let validated = self.authority.validate_ticket(ticket, &self.partner_app);

        let mut inner = self.inner.lock();
        inner.binding = false;
        let session = validated?;
        if inner.state != ShadowState::Unbound {
            // Local session ended while the ticket was being redeemed.
            let state = inner.state.as_str();
            drop(inner);
            let _ = self.authority.unbind_partner_app(&session.id, &self.partner_app);
            return Err(SsoError::InvalidShadowState { state });
        }
        inner.state = ShadowState::Bound(session.id.clone());
        inner.last_activity = Utc::now();
        debug!(target: "ssoward::agent", local_id = %self.local_id, session_id = %session.id, "shadow bound");
        Ok(session)
    }

    /// Container session ended. Asks the authority to destroy the global session once;
    /// later calls and calls on an unbound shadow make no remote request. Returns whether
    /// a destroy was requested.
    pub fn on_local_session_ended(&self) -> SsoResult<bool> {
        let prev = std::mem::replace(&mut self.inner.lock().state, ShadowState::Destroyed);
        let ShadowState::Bound(id) = prev else {
            return Ok(false);
        };
        debug!(target: "ssoward::agent", local_id = %self.local_id, session_id = %id, "local session ended");
        match self.authority.destroy_session(&id, DestroyReason::LocalLogout) {
            Ok(()) | Err(SsoError::SessionNotFound) | Err(SsoError::SessionExpired) => Ok(true),
            Err(e) => Err(e),
        }
    }

    /// The authority destroyed the global session. Local only.
    pub fn on_remote_invalidated(&self) -> bool {
        let mut inner = self.inner.lock();
        if matches!(inner.state, ShadowState::Bound(_)) {
            inner.state = ShadowState::Destroyed;
            true
        } else {
            false
        }
    }

    /// Check the shadow without contacting the authority for liveness. A shadow idle for
    /// `max_idle` is destroyed and the partner app is unbound from the global session.
    pub fn validate_local(&self, max_idle: Duration) -> SsoResult<SessionId> {
        self.validate_local_at(max_idle, Utc::now())
    }

    pub fn validate_local_at(&self, max_idle: Duration, now: DateTime<Utc>) -> SsoResult<SessionId> {
        let mut inner = self.inner.lock();
        let id = match &inner.state {
            ShadowState::Bound(id) => id.clone(),
            ShadowState::Destroyed => return Err(SsoError::SessionNotFound),
            ShadowState::Unbound => return Err(SsoError::InvalidShadowState { state: "unbound" }),
        };
        if crate::session::elapsed_since(now, inner.last_activity) < max_idle {
            return Ok(id);
        }
        inner.state = ShadowState::Destroyed;
        drop(inner);
        debug!(target: "ssoward::agent", local_id = %self.local_id, session_id = %id, "local idle timeout");
        let _ = self.authority.unbind_partner_app(&id, &self.partner_app);
        Err(SsoError::SessionExpired)
    }

    pub fn mark_activity(&self) {
        self.inner.lock().last_activity = Utc::now();
    }

    /// Refresh the global session's idle clock. A global session that is gone takes the
    /// shadow with it.
    pub fn keep_alive(&self) -> SsoResult<()> {
        let id = match self.state() {
            ShadowState::Bound(id) => id,
            other => return Err(SsoError::InvalidShadowState { state: other.as_str() }),
        };
        match self.authority.touch(&id) {
            Ok(()) => {
                self.mark_activity();
                Ok(())
            }
            Err(e @ (SsoError::SessionNotFound | SsoError::SessionExpired)) => {
                let mut inner = self.inner.lock();
                if inner.state == ShadowState::Bound(id) {
                    inner.state = ShadowState::Destroyed;
                }
                Err(e)
            }
            Err(e) => Err(e),
        }
    }
}
