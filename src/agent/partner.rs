use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::error::{SsoError, SsoResult};
use crate::session::{GlobalSession, SessionId, SsoAuthority};

use super::shadow::{LocalSessionShadow, ShadowState};

/// Per partner app bookkeeping of local container sessions and the global sessions they
/// shadow. Hooks mirror a servlet-style container: session created, session destroyed.
pub struct PartnerAgent {
    partner_app: String,
    authority: Arc<dyn SsoAuthority>,
    max_local_idle: Duration,
    sessions: RwLock<HashMap<String, Arc<LocalSessionShadow>>>,
    by_global: RwLock<HashMap<SessionId, HashSet<String>>>,
}

impl PartnerAgent {
    pub fn new(partner_app: impl Into<String>, authority: Arc<dyn SsoAuthority>, max_local_idle: Duration) -> Self {
        Self {
            partner_app: partner_app.into(),
            authority,
            max_local_idle,
            sessions: RwLock::new(HashMap::new()),
            by_global: RwLock::new(HashMap::new()),
        }
    }

    pub fn partner_app(&self) -> &str { &self.partner_app }
    pub fn local_sessions(&self) -> usize { self.sessions.read().len() }

    pub fn shadow(&self, local_id: &str) -> Option<Arc<LocalSessionShadow>> {
        self.sessions.read().get(local_id).cloned()
    }

    /// Container created a local session. Returns the existing shadow if already known.
    pub fn session_created(&self, local_id: &str) -> Arc<LocalSessionShadow> {
        self.shadow_for(local_id).0
    }

    /// Existing or new shadow for `local_id`, and whether this call created it.
    fn shadow_for(&self, local_id: &str) -> (Arc<LocalSessionShadow>, bool) {
        let mut sessions = self.sessions.write();
        if let Some(shadow) = sessions.get(local_id) {
            return (shadow.clone(), false);
        }
        let shadow = Arc::new(LocalSessionShadow::new(local_id, self.partner_app.clone(), self.authority.clone()));
        sessions.insert(local_id.to_string(), shadow.clone());
        (shadow, true)
    }

    /// Container destroyed a local session (logout or container timeout).
    pub fn session_destroyed(&self, local_id: &str) -> SsoResult<bool> {
        let Some(shadow) = self.sessions.write().remove(local_id) else {
            return Ok(false);
        };
        if let Some(id) = shadow.session_id() {
            self.unindex(&id, local_id);
        }
        shadow.on_local_session_ended()
    }

    /// Bind `local_id` to the global session named by `ticket`.
    pub fn adopt_ticket(&self, local_id: &str, ticket: &str) -> SsoResult<GlobalSession> {
        let (shadow, created) = self.shadow_for(local_id);
        let session = match shadow.adopt_ticket(ticket) {
            Ok(session) => session,
            Err(e) => {
                // A shadow made only for this redemption must not outlive it.
                if created && shadow.state() == ShadowState::Unbound {
                    let mut sessions = self.sessions.write();
                    if sessions.get(local_id).is_some_and(|s| Arc::ptr_eq(s, &shadow)) {
                        sessions.remove(local_id);
                    }
                }
                return Err(e);
            }
        };
        self.by_global.write().entry(session.id.clone()).or_default().insert(local_id.to_string());
        // An invalidation delivered before the index entry existed found nothing to do.
        if !self.authority.is_session_active(&session.id) {
            shadow.on_remote_invalidated();
            self.unindex(&session.id, local_id);
            self.sessions.write().remove(local_id);
            return Err(SsoError::SessionNotFound);
        }
        info!(target: "ssoward::agent", partner_app = %self.partner_app, local_id, session_id = %session.id, "local session bound");
        Ok(session)
    }

    /// Per-request check: local idle timeout only, no authority round trip.
    pub fn authenticate_request(&self, local_id: &str) -> SsoResult<SessionId> {
        let shadow = self.shadow(local_id).ok_or(SsoError::SessionNotFound)?;
        match shadow.validate_local(self.max_local_idle) {
            Ok(id) => {
                shadow.mark_activity();
                Ok(id)
            }
            Err(e) => {
                if shadow.state() == ShadowState::Destroyed {
                    self.forget(&shadow);
                }
                Err(e)
            }
        }
    }

    pub fn keep_alive(&self, local_id: &str) -> SsoResult<()> {
        let shadow = self.shadow(local_id).ok_or(SsoError::SessionNotFound)?;
        let out = shadow.keep_alive();
        if shadow.state() == ShadowState::Destroyed {
            self.forget(&shadow);
        }
        out
    }

    /// The authority destroyed `session_id`. Returns the number of local sessions dropped.
    pub fn on_remote_invalidated(&self, session_id: &SessionId) -> usize {
        let Some(locals) = self.by_global.write().remove(session_id) else {
            return 0;
        };
        let mut dropped = 0usize;
        let mut sessions = self.sessions.write();
        for local_id in locals {
            if let Some(shadow) = sessions.remove(&local_id) {
                if shadow.on_remote_invalidated() {
                    dropped += 1;
                }
            }
        }
        debug!(target: "ssoward::agent", partner_app = %self.partner_app, session_id = %session_id, dropped, "remote invalidation");
        dropped
    }

    /// Destroy every shadow idle past the local timeout, independent of the authority's
    /// own idle clock.
    pub fn sweep_idle(&self) -> usize {
        let shadows: Vec<Arc<LocalSessionShadow>> = self.sessions.read().values().cloned().collect();
        let mut swept = 0usize;
        for shadow in shadows {
            if let Err(SsoError::SessionExpired) = shadow.validate_local(self.max_local_idle) {
                self.forget(&shadow);
                swept += 1;
            }
        }
        swept
    }

    fn forget(&self, shadow: &LocalSessionShadow) {
        self.sessions.write().remove(shadow.local_id());
        let mut index = self.by_global.write();
        index.retain(|_, locals| {
            locals.remove(shadow.local_id());
            !locals.is_empty()
        });
    }

    fn unindex(&self, id: &SessionId, local_id: &str) {
        let mut index = self.by_global.write();
        if let Some(locals) = index.get_mut(id) {
            locals.remove(local_id);
            if locals.is_empty() {
                index.remove(id);
            }
        }
    }
}
